use std::path::Path;

use super::{Content, FileReader, read_to_string};
use crate::error::Result;

/// Plain UTF-8 text files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextReader;

impl FileReader for TextReader {
    fn extensions(&self) -> &'static [&'static str] {
        &["txt"]
    }

    fn read(&self, path: &Path) -> Result<Content> {
        Ok(Content::Text(read_to_string(path)?))
    }
}
