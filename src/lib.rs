//! # pdf2po
//!
//! Extract purchase orders from PDF documents with a Vision Language Model
//! and submit them to the Fortnox warehouse API.
//!
//! ## Why this crate?
//!
//! Supplier order confirmations arrive as PDFs in every layout imaginable.
//! Instead of per-supplier templates, this crate rasterises page 1 and lets
//! a VLM read it the way a person would, returning a typed
//! [`PurchaseOrder`] plus a self-reported confidence. A human reviews the
//! result before it is sent to the accounting system.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF upload
//!  │
//!  ├─ 1. Queue    ProcessingQueue: one extraction at a time, in upload order
//!  ├─ 2. Render   page 1 at 300 DPI via pdfium (spawn_blocking)
//!  ├─ 3. Encode   PNG → base64 ImageData
//!  ├─ 4. VLM      one bounded call with the extraction prompt
//!  ├─ 5. Parse    fence cleanup + ExtractedData JSON
//!  ├─ 6. Review   update_order / select
//!  └─ 7. Export   FortnoxClient: sequential submission, per-item outcome
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2po::{
//!     ExtractionConfig, FortnoxClient, FortnoxConfig, PdfDocument, ProcessingQueue,
//!     VisionExtractor,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / EDGEQUAKE_LLM_PROVIDER
//!     let config = ExtractionConfig::default();
//!     let extractor = VisionExtractor::from_config(&config).await?;
//!     let queue = ProcessingQueue::new(Arc::new(extractor));
//!
//!     queue.enqueue([PdfDocument::from_path("order.pdf".as_ref()).await?]);
//!     queue.wait_idle().await;
//!
//!     let fortnox = FortnoxClient::new(FortnoxConfig::from_env())?;
//!     let summary = queue.export_all(&fortnox, None).await;
//!     eprintln!("{} exported, {} failed", summary.succeeded, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2po` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2po = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod credentials;
pub mod error;
pub mod extract;
pub mod fortnox;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod queue;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ExtractionConfig, ExtractionConfigBuilder, FortnoxConfig, FortnoxCredentials, ServerConfig,
};
pub use credentials::{ApiKeys, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{ErrorKind, Pdf2PoError};
pub use extract::{OrderExtractor, VisionExtractor};
pub use fortnox::{
    complete_authorization, FortnoxClient, OAuthCallback, OrderSubmitter, SubmitResponse,
    TokenRequest, TokenResponse,
};
pub use model::{ExtractedData, PurchaseOrder, PurchaseOrderRow};
pub use pipeline::input::PdfDocument;
pub use progress::{NoopProgressCallback, ProgressCallback, QueueProgressCallback};
pub use queue::{ExportSummary, ProcessingQueue, QueueCounts, QueueItem, QueueStatus};
pub use server::AppState;
