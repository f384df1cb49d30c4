//! The boundary to the neural retrieval capability.
//!
//! Index construction goes through [`RetrievalBackend`]; query time goes
//! through the [`SearchIndex`] a backend loads. The retrieve-and-rerank
//! engine only depends on these traits.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{error::Result, normalize::{Metadata, RecordBatch}};

/// Engineering parameters for building an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildParams {
    /// Model ID or local model path used to embed passages.
    pub model_name: String,
    /// Maximum passage length, in model tokens.
    pub max_document_length: usize,
    /// Split documents longer than `max_document_length` into several
    /// passages instead of truncating them.
    pub split_documents: bool,
    /// Number of passages encoded per model call.
    pub batch_size: usize,
    /// Replace an existing index at the destination.
    pub overwrite: bool,
}

/// One hit from the first-stage search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub score: f32,
    /// ID of the record the passage came from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl SearchHit {
    pub fn new(content: impl Into<String>, score: f32) -> Self {
        Self {
            content: content.into(),
            score,
            document_id: None,
            metadata: Metadata::new(),
        }
    }
}

/// A loaded, read-only index.
pub trait SearchIndex {
    /// Up to `k` passages, best first by the index's native score.
    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>>;

    /// `texts` reordered by relevance to `query`.
    fn rerank(&self, query: &str, texts: &[String]) -> Result<Vec<String>>;
}

impl<T: SearchIndex + ?Sized> SearchIndex for &T {
    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        (**self).search(query, k)
    }

    fn rerank(&self, query: &str, texts: &[String]) -> Result<Vec<String>> {
        (**self).rerank(query, texts)
    }
}

pub trait RetrievalBackend {
    type Index: SearchIndex;

    /// Persist `batch` as an index at `destination`, returning the path the
    /// index was written to.
    fn build(
        &self,
        batch: &RecordBatch,
        destination: &Path,
        params: &BuildParams,
    ) -> Result<PathBuf>;

    fn load(&self, path: &Path) -> Result<Self::Index>;
}
