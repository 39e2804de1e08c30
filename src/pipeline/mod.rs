//! Pipeline stages for PDF-to-purchase-order extraction.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and the rasteriser or model can be swapped
//! without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ parse
//! (bytes)   (pdfium)   (base64)   (VLM)   (JSON)
//! ```
//!
//! 1. [`input`]  : validate the upload and stage it in a scratch directory
//! 2. [`render`] : rasterise page 1 at 300 DPI; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`encode`] : base64-wrap the PNG for the multimodal request body
//! 4. [`llm`]    : one bounded vision-model call; the only stage with
//!    network I/O
//! 5. [`parse`]  : clean up the answer and decode `ExtractedData`

pub mod encode;
pub mod input;
pub mod llm;
pub mod parse;
pub mod render;
