use std::path::Path;

use pdf_oxide::PdfDocument;
use tracing::debug;

use super::{Content, FileReader};
use crate::error::{Error, Result};

/// PDF documents; text of every page, in page order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfReader;

impl FileReader for PdfReader {
    fn extensions(&self) -> &'static [&'static str] {
        &["pdf"]
    }

    fn read(&self, path: &Path) -> Result<Content> {
        let mut doc =
            PdfDocument::open(path).map_err(|e| Error::file_read(path, e))?;
        let page_count =
            doc.page_count().map_err(|e| Error::file_read(path, e))?;

        let mut text = String::new();
        for page_idx in 0..page_count {
            match doc.extract_text(page_idx) {
                Ok(page_text) => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&page_text);
                }
                Err(e) => {
                    debug!(
                        path = %path.display(),
                        page = page_idx + 1,
                        "skipping unreadable PDF page: {e}"
                    );
                }
            }
        }

        Ok(Content::Text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_a_read_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, b"definitely not a pdf").unwrap();

        assert!(matches!(
            PdfReader.read(&path),
            Err(Error::FileRead { .. })
        ));
    }
}
