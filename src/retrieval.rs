use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    backend::{SearchHit, SearchIndex},
    error::{Error, Result},
    normalize::Metadata,
};

pub const DEFAULT_K: usize = 10;
pub const DEFAULT_RERANK_K: usize = 100;

/// A final, ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// 1-based position in the final ordering.
    pub rank: usize,
    /// First-stage retrieval score; reranking does not change it.
    pub score: f32,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl SearchResult {
    fn from_hit(hit: SearchHit, rank: usize) -> Self {
        Self {
            rank,
            score: hit.score,
            content: hit.content,
            document_id: hit.document_id,
            metadata: hit.metadata,
        }
    }
}

/// Two-stage retrieval: over-fetch `rerank_k` candidates, let the index
/// rerank their texts, then keep the first `k`.
///
/// Candidates are matched back to the reranked texts by content. When two
/// candidates share the same content only the later one is kept, and each
/// content is emitted at most once even if the reranker repeats it. Texts
/// the reranker invents are dropped. Search and rerank failures are returned
/// as [`Error::Retrieval`] and [`Error::Rerank`] and are not retried.
pub fn retrieve_and_rerank<I: SearchIndex + ?Sized>(
    index: &I,
    query: &str,
    k: usize,
    rerank_k: usize,
) -> Result<Vec<SearchResult>> {
    info!(query, k, rerank_k, "retrieving and reranking");

    let candidates = index
        .search(query, rerank_k)
        .map_err(|e| stage_error(e, Error::Retrieval))?;

    let mut texts = Vec::with_capacity(candidates.len());
    let mut by_content: HashMap<String, SearchHit> =
        HashMap::with_capacity(candidates.len());
    for hit in candidates {
        texts.push(hit.content.clone());
        by_content.insert(hit.content.clone(), hit);
    }

    let collapsed = texts.len() - by_content.len();
    if collapsed > 0 {
        debug!(collapsed, "duplicate candidate contents collapsed");
    }

    let reranked = index
        .rerank(query, &texts)
        .map_err(|e| stage_error(e, Error::Rerank))?;

    let mut results = Vec::with_capacity(k.min(by_content.len()));
    for text in reranked {
        if results.len() == k {
            break;
        }
        if let Some(hit) = by_content.remove(&text) {
            results.push(SearchResult::from_hit(hit, results.len() + 1));
        }
    }

    Ok(results)
}

/// Run [`retrieve_and_rerank`] for each query in order.
///
/// Stops at the first failing query and returns its error; queries after it
/// are not attempted.
pub fn retrieve_and_rerank_batch<I, Q>(
    index: &I,
    queries: &[Q],
    k: usize,
    rerank_k: usize,
) -> Result<Vec<Vec<SearchResult>>>
where
    I: SearchIndex + ?Sized,
    Q: AsRef<str>,
{
    info!(queries = queries.len(), "retrieving and reranking batch");
    queries
        .iter()
        .map(|query| retrieve_and_rerank(index, query.as_ref(), k, rerank_k))
        .collect()
}

fn stage_error(err: Error, wrap: fn(String) -> Error) -> Error {
    match err {
        Error::Retrieval(_) | Error::Rerank(_) => err,
        other => wrap(other.to_string()),
    }
}
