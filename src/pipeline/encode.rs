//! Image encoding: rendered PNG file → base64 `ImageData`.
//!
//! Vision APIs accept images as base64 data embedded in the JSON request.
//! The page is already PNG on disk (lossless keeps digits crisp), so this
//! stage only reads and wraps it. `detail: "high"` asks GPT-4-class models
//! for the full tile budget so small print in order rows survives.

use crate::error::Pdf2PoError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::path::Path;
use tracing::debug;

/// Encode PNG bytes for the vision API.
pub fn encode_png(png: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(png);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, "image/png").with_detail("high")
}

/// Read the rendered page from disk and encode it.
pub async fn encode_page_file(path: &Path) -> Result<ImageData, Pdf2PoError> {
    let png = tokio::fs::read(path).await.map_err(|e| {
        Pdf2PoError::RasterisationFailed {
            detail: format!("rendered image '{}' unreadable: {e}", path.display()),
        }
    })?;
    Ok(encode_png(&png))
}
