//! Extraction client: one PDF in, one [`ExtractedData`] out.
//!
//! ## Flow
//!
//! ```text
//! validate ─▶ stage in scratch dir ─▶ rasterise page 1 ─▶ encode ─▶ model ─▶ parse
//! ```
//!
//! Every step after validation runs inside a [`ScratchSpace`]. The scratch
//! space is released on both the success and the failure path before the
//! result is handed back, so no staged PDF or rendered page outlives the
//! call. There are no retries: one call, one outcome.

use crate::config::ExtractionConfig;
use crate::error::Pdf2PoError;
use crate::model::ExtractedData;
use crate::pipeline::encode::encode_page_file;
use crate::pipeline::input::{validate_pdf, PdfDocument, ScratchSpace};
use crate::pipeline::llm::{LlmVisionModel, VisionModel};
use crate::pipeline::parse::parse_extraction;
use crate::pipeline::render::{render_first_page, PdfiumRasterizer, Rasterizer};
use crate::prompts::extraction_system_prompt;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Turns a PDF into structured purchase-order data.
///
/// The processing queue and the HTTP backend depend on this trait rather
/// than on [`VisionExtractor`], so either can run against a stand-in.
#[async_trait]
pub trait OrderExtractor: Send + Sync {
    async fn extract(&self, doc: &PdfDocument) -> Result<ExtractedData, Pdf2PoError>;
}

/// Production extractor: pdfium rasteriser plus a vision model.
pub struct VisionExtractor {
    rasterizer: Arc<dyn Rasterizer>,
    model: Arc<dyn VisionModel>,
    system_prompt: Option<String>,
}

impl VisionExtractor {
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        model: Arc<dyn VisionModel>,
        system_prompt: Option<String>,
    ) -> Self {
        Self {
            rasterizer,
            model,
            system_prompt,
        }
    }

    /// Wire up pdfium and the configured provider.
    pub async fn from_config(config: &ExtractionConfig) -> Result<Self, Pdf2PoError> {
        let model = LlmVisionModel::from_config(config).await?;
        info!("Vision model: {}", config.model_or_default());
        Ok(Self::new(
            Arc::new(PdfiumRasterizer::new(config)),
            Arc::new(model),
            config.system_prompt.clone(),
        ))
    }

    fn system_prompt(&self) -> String {
        match &self.system_prompt {
            Some(p) => p.clone(),
            None => {
                let today = chrono::Local::now().format("%Y-%m-%d").to_string();
                extraction_system_prompt(&today)
            }
        }
    }

    async fn run(&self, doc: &PdfDocument, scratch: &ScratchSpace) -> Result<ExtractedData, Pdf2PoError> {
        let pdf_path = scratch.stage_pdf(doc).await?;
        let image_path = scratch.image_path();

        render_first_page(Arc::clone(&self.rasterizer), pdf_path, image_path.clone()).await?;
        let image = encode_page_file(&image_path).await?;

        let raw = self.model.complete(&self.system_prompt(), image).await?;
        parse_extraction(&raw)
    }
}

#[async_trait]
impl OrderExtractor for VisionExtractor {
    async fn extract(&self, doc: &PdfDocument) -> Result<ExtractedData, Pdf2PoError> {
        let start = Instant::now();
        validate_pdf(doc)?;

        let scratch = ScratchSpace::new()?;
        let result = self.run(doc, &scratch).await;
        scratch.release();

        match &result {
            Ok(data) => info!(
                "Extracted '{}' in {:?} (confidence {:.2})",
                doc.file_name,
                start.elapsed(),
                data.confidence
            ),
            Err(e) => warn!("Extraction of '{}' failed: {}", doc.file_name, e),
        }
        result
    }
}
