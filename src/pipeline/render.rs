//! PDF rasterisation: render page 1 of a document to a PNG file.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is CPU-bound. [`render_first_page`] moves the work onto Tokio's
//! blocking pool so the queue worker and HTTP handlers keep running.
//!
//! The [`Rasterizer`] trait is the seam to the conversion collaborator;
//! [`PdfiumRasterizer`] is the production implementation.

use crate::config::ExtractionConfig;
use crate::error::Pdf2PoError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Converts the first page of a PDF into a raster image.
///
/// Implementations are blocking; callers go through [`render_first_page`].
pub trait Rasterizer: Send + Sync {
    /// Render page 1 of `pdf` and write it as PNG to `out`.
    fn render_first_page(&self, pdf: &Path, out: &Path) -> Result<(), Pdf2PoError>;
}

/// Render on the blocking pool.
pub async fn render_first_page(
    rasterizer: Arc<dyn Rasterizer>,
    pdf: PathBuf,
    out: PathBuf,
) -> Result<(), Pdf2PoError> {
    tokio::task::spawn_blocking(move || rasterizer.render_first_page(&pdf, &out))
        .await
        .map_err(|e| Pdf2PoError::Internal(format!("Render task panicked: {}", e)))?
}

/// pdfium-backed rasteriser.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    dpi: u32,
    max_pixels: u32,
    lib_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            lib_path: config.pdfium_lib_path.clone(),
        }
    }

    /// Bind pdfium, preferring the configured directory.
    fn bind(&self) -> Result<Pdfium, Pdf2PoError> {
        let bindings = match &self.lib_path {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
                    .or_else(|_| Pdfium::bind_to_system_library())
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| Pdf2PoError::PdfiumBindingFailed(format!("{:?}", e)))?;

        Ok(Pdfium::new(bindings))
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn render_first_page(&self, pdf: &Path, out: &Path) -> Result<(), Pdf2PoError> {
        let pdfium = self.bind()?;

        let document = pdfium.load_pdf_from_file(pdf, None).map_err(|e| {
            let err_str = format!("{:?}", e);
            let detail = if err_str.contains("Password") || err_str.contains("password") {
                "PDF is encrypted and requires a password".to_string()
            } else {
                format!("PDF is corrupt or unreadable: {err_str}")
            };
            Pdf2PoError::RasterisationFailed { detail }
        })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages, rendering page 1", pages.len());
        if pages.len() == 0 {
            return Err(Pdf2PoError::EmptyDocument);
        }

        let page = pages
            .get(0)
            .map_err(|e| Pdf2PoError::RasterisationFailed {
                detail: format!("{:?}", e),
            })?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(scale_for_dpi(self.dpi))
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| Pdf2PoError::RasterisationFailed {
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page 1 at {} DPI → {}x{} px",
            self.dpi,
            image.width(),
            image.height()
        );

        image
            .save_with_format(out, image::ImageFormat::Png)
            .map_err(|e| Pdf2PoError::RasterisationFailed {
                detail: format!("writing PNG: {e}"),
            })
    }
}

/// Scale factor that turns PDF points into pixels at `dpi`.
fn scale_for_dpi(dpi: u32) -> f32 {
    dpi as f32 / POINTS_PER_INCH
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingRasterizer;

    impl Rasterizer for FailingRasterizer {
        fn render_first_page(&self, _pdf: &Path, _out: &Path) -> Result<(), Pdf2PoError> {
            Err(Pdf2PoError::RasterisationFailed {
                detail: "corrupt xref".into(),
            })
        }
    }

    struct CopyRasterizer;

    impl Rasterizer for CopyRasterizer {
        fn render_first_page(&self, pdf: &Path, out: &Path) -> Result<(), Pdf2PoError> {
            std::fs::copy(pdf, out)
                .map(|_| ())
                .map_err(|e| Pdf2PoError::Internal(e.to_string()))
        }
    }

    #[test]
    fn scale_for_300_dpi() {
        assert!((scale_for_dpi(300) - 4.1666665).abs() < 1e-5);
        assert_eq!(scale_for_dpi(72), 1.0);
    }

    #[tokio::test]
    async fn blocking_failure_propagates() {
        let err = render_first_page(
            Arc::new(FailingRasterizer),
            PathBuf::from("in.pdf"),
            PathBuf::from("out.png"),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("corrupt xref"));
    }

    #[tokio::test]
    async fn blocking_success_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("in.pdf");
        let out = dir.path().join("out.png");
        std::fs::write(&pdf, b"%PDF").unwrap();

        render_first_page(Arc::new(CopyRasterizer), pdf, out.clone())
            .await
            .unwrap();
        assert!(out.exists());
    }
}
