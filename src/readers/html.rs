use std::path::Path;

use scraper::{Html, Node};

use super::{Content, FileReader, read_to_string};
use crate::error::Result;

/// Elements whose text is never shown to a reader.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// HTML and XHTML pages, reduced to their visible text.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlReader;

impl FileReader for HtmlReader {
    fn extensions(&self) -> &'static [&'static str] {
        &["html", "htm", "xhtml"]
    }

    fn read(&self, path: &Path) -> Result<Content> {
        let source = read_to_string(path)?;
        Ok(Content::Text(html_to_text(&source)))
    }
}

/// Concatenate every text node outside of script-like elements.
pub fn html_to_text(source: &str) -> String {
    let document = Html::parse_document(source);
    let mut text = String::new();

    for node in document.root_element().descendants() {
        let Node::Text(fragment) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|e| e.name()))
            .is_some_and(|name| SKIPPED_ELEMENTS.contains(&name));
        if !hidden {
            text.push_str(fragment);
        }
    }

    text
}
