//! Input handling: validate uploaded PDF bytes and stage them on disk.
//!
//! pdfium requires a file-system path, so each extraction gets its own
//! [`ScratchSpace`] (a `TempDir`) holding the uploaded PDF and the rendered
//! page image. [`ScratchSpace::release`] deletes both and logs, rather than
//! propagates, a cleanup failure. Dropping the scratch space without
//! releasing it still deletes the directory.

use crate::error::Pdf2PoError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Name of the staged PDF inside a scratch directory. The uploaded file
/// name is never used as a path component.
const STAGED_PDF: &str = "upload.pdf";

/// Name of the rendered first page inside a scratch directory.
const RENDERED_PAGE: &str = "page-1.png";

/// An uploaded PDF held in memory.
#[derive(Clone)]
pub struct PdfDocument {
    pub file_name: String,
    pub bytes: Arc<[u8]>,
}

impl PdfDocument {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a PDF from disk. The file name is the last path component.
    pub async fn from_path(path: &Path) -> Result<Self, Pdf2PoError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Pdf2PoError::Scratch(format!("reading '{}': {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());
        Ok(Self::new(file_name, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Verify the PDF magic bytes (`%PDF`) so callers get a meaningful error
/// instead of a pdfium failure.
pub fn validate_pdf(doc: &PdfDocument) -> Result<(), Pdf2PoError> {
    if doc.is_empty() {
        return Err(Pdf2PoError::EmptyUpload {
            name: doc.file_name.clone(),
        });
    }
    if doc.bytes.len() < 4 || &doc.bytes[..4] != b"%PDF" {
        return Err(Pdf2PoError::NotAPdf {
            name: doc.file_name.clone(),
            magic: doc.bytes.iter().take(4).copied().collect(),
        });
    }
    Ok(())
}

/// Per-extraction temporary directory.
pub struct ScratchSpace {
    dir: TempDir,
}

impl ScratchSpace {
    pub fn new() -> Result<Self, Pdf2PoError> {
        let dir = tempfile::Builder::new()
            .prefix("pdf2po-")
            .tempdir()
            .map_err(|e| Pdf2PoError::Scratch(e.to_string()))?;
        debug!("Scratch space: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the rasteriser writes page 1.
    pub fn image_path(&self) -> PathBuf {
        self.dir.path().join(RENDERED_PAGE)
    }

    /// Write the uploaded bytes into the scratch directory.
    pub async fn stage_pdf(&self, doc: &PdfDocument) -> Result<PathBuf, Pdf2PoError> {
        let path = self.dir.path().join(STAGED_PDF);
        tokio::fs::write(&path, &doc.bytes)
            .await
            .map_err(|e| Pdf2PoError::Scratch(format!("Failed to write temp file: {e}")))?;
        Ok(path)
    }

    /// Delete the directory and everything in it.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Failed to delete scratch space {}: {}", path.display(), e);
        } else {
            debug!("Released scratch space {}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_pdf() {
        let doc = PdfDocument::new("notes.txt", b"hello world".to_vec());
        let err = validate_pdf(&doc).unwrap_err();
        assert!(matches!(err, Pdf2PoError::NotAPdf { ref magic, .. } if magic == b"hell"));
    }

    #[test]
    fn rejects_empty_upload() {
        let doc = PdfDocument::new("empty.pdf", Vec::new());
        assert!(matches!(
            validate_pdf(&doc),
            Err(Pdf2PoError::EmptyUpload { .. })
        ));
    }

    #[test]
    fn accepts_pdf_magic() {
        let doc = PdfDocument::new("po.pdf", b"%PDF-1.7\n...".to_vec());
        assert!(validate_pdf(&doc).is_ok());
    }

    #[tokio::test]
    async fn release_deletes_staged_files() {
        let scratch = ScratchSpace::new().unwrap();
        let doc = PdfDocument::new("../../etc/passwd", b"%PDF-1.4".to_vec());
        let staged = scratch.stage_pdf(&doc).await.unwrap();
        std::fs::write(scratch.image_path(), b"png").unwrap();

        let dir = scratch.path().to_path_buf();
        assert!(staged.starts_with(&dir));
        assert!(staged.exists());

        scratch.release();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn from_path_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order-17.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let doc = PdfDocument::from_path(&path).await.unwrap();
        assert_eq!(doc.file_name, "order-17.pdf");
        assert_eq!(doc.len(), 8);
    }
}
