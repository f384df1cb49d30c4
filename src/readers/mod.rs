//! Format-specific file readers and the registry that dispatches to them.
//!
//! Readers are registered statically by extension. A reader returns either a
//! single block of text or a sequence of structured rows; turning that into
//! records is the normalizer's job.

mod docx;
mod html;
mod json;
mod pdf;
mod tabular;
mod text;

use std::{collections::HashMap, path::Path, sync::Arc};

pub use docx::DocxReader;
pub use html::HtmlReader;
pub use json::{JsonLinesReader, JsonReader};
pub use pdf::PdfReader;
pub use tabular::{CsvReader, ExcelReader};
pub use text::TextReader;

use crate::{
    error::{Error, Result},
    walker::file_extension,
};

/// What a reader extracted from one file.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// The whole file as one piece of text.
    Text(String),
    /// One structured value per row.
    Rows(Vec<serde_json::Value>),
}

pub trait FileReader: Send + Sync {
    /// Lower-case extensions (without the dot) this reader handles.
    fn extensions(&self) -> &'static [&'static str];

    fn read(&self, path: &Path) -> Result<Content>;
}

/// Extension → reader lookup table.
#[derive(Clone, Default)]
pub struct ReaderRegistry {
    readers: HashMap<&'static str, Arc<dyn FileReader>>,
    builtin: bool,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in reader.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(TextReader);
        registry.register(HtmlReader);
        registry.register(PdfReader);
        registry.register(DocxReader);
        registry.register(CsvReader);
        registry.register(ExcelReader);
        registry.register(JsonReader);
        registry.register(JsonLinesReader);
        registry.builtin = true;
        registry
    }

    /// Whether this registry holds exactly the built-in readers, i.e. the
    /// set a freshly started worker process would use.
    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    /// Register `reader` for each of its extensions, replacing any previous
    /// reader for those extensions.
    pub fn register<R: FileReader + 'static>(&mut self, reader: R) {
        let reader: Arc<dyn FileReader> = Arc::new(reader);
        for ext in reader.extensions() {
            self.readers.insert(ext, Arc::clone(&reader));
        }
        self.builtin = false;
    }

    pub fn get(&self, extension: &str) -> Option<Arc<dyn FileReader>> {
        self.readers
            .get(extension.to_ascii_lowercase().as_str())
            .cloned()
    }

    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut exts: Vec<_> = self.readers.keys().copied().collect();
        exts.sort_unstable();
        exts
    }

    /// Read `path` with the reader registered for its extension.
    pub fn read(&self, path: &Path) -> Result<Content> {
        let extension = file_extension(path).unwrap_or_default();
        let reader =
            self.get(&extension).ok_or_else(|| Error::UnsupportedFormat {
                extension: if extension.is_empty() {
                    "(none)".to_string()
                } else {
                    format!(".{extension}")
                },
            })?;
        reader.read(path)
    }
}

impl std::fmt::Debug for ReaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderRegistry")
            .field("extensions", &self.supported_extensions())
            .finish()
    }
}

fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_supported_formats() {
        let registry = ReaderRegistry::with_defaults();
        assert_eq!(
            registry.supported_extensions(),
            vec![
                "csv", "docx", "htm", "html", "json", "jsonl", "pdf", "txt",
                "xhtml", "xls", "xlsx"
            ]
        );
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = ReaderRegistry::with_defaults();
        assert!(registry.get("TXT").is_some());
        assert!(registry.get("md").is_none());
    }

    #[test]
    fn unsupported_extension_names_it() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.md");
        std::fs::write(&path, "# hi").unwrap();

        let err = ReaderRegistry::with_defaults().read(&path).unwrap_err();
        match err {
            Error::UnsupportedFormat { extension } => {
                assert_eq!(extension, ".md")
            }
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn missing_extension_is_unsupported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("Makefile");
        std::fs::write(&path, "all:").unwrap();

        assert!(matches!(
            ReaderRegistry::with_defaults().read(&path),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    struct Shouty;

    impl FileReader for Shouty {
        fn extensions(&self) -> &'static [&'static str] {
            &["txt"]
        }

        fn read(&self, path: &Path) -> Result<Content> {
            Ok(Content::Text(read_to_string(path)?.to_uppercase()))
        }
    }

    #[test]
    fn register_replaces_existing_reader() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, "quiet").unwrap();

        let mut registry = ReaderRegistry::with_defaults();
        registry.register(Shouty);
        assert_eq!(
            registry.read(&path).unwrap(),
            Content::Text("QUIET".into())
        );
    }

    #[test]
    fn only_defaults_count_as_builtin() {
        assert!(ReaderRegistry::with_defaults().is_builtin());
        assert!(!ReaderRegistry::new().is_builtin());

        let mut registry = ReaderRegistry::with_defaults();
        registry.register(Shouty);
        assert!(!registry.is_builtin());
    }
}
