//! A [`RetrievalBackend`] storing ColBERT token embeddings in redb.
//!
//! Building splits every record into passages, encodes them in batches, and
//! writes passages and embeddings to `index.redb` inside the index
//! directory. Searching scores every stored passage against the query with
//! MaxSim; reranking re-encodes the candidate texts and scores them the
//! same way.

use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use candle_core::Tensor;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    backend::{BuildParams, RetrievalBackend, SearchHit, SearchIndex},
    chunking::split_passages,
    embedding::{load_embedding_tensor, maxsim, split_batch, to_host},
    error::{Error, Result},
    index_store::{IndexStore, StoredPassage},
    model_manager::ModelManager,
    normalize::RecordBatch,
};

pub const INDEX_FILE: &str = "index.redb";

const MODEL_SETTING: &str = "model_name";
const DOCUMENT_LENGTH_SETTING: &str = "max_document_length";

/// Texts encoded per model call when reranking.
const RERANK_BATCH: usize = 32;

#[derive(Debug, Default, Clone, Copy)]
pub struct ColbertBackend;

impl ColbertBackend {
    pub fn new() -> Self {
        Self
    }
}

impl RetrievalBackend for ColbertBackend {
    type Index = ColbertIndex;

    fn build(
        &self,
        batch: &RecordBatch,
        destination: &Path,
        params: &BuildParams,
    ) -> Result<PathBuf> {
        if destination.exists() {
            if !params.overwrite {
                return Err(Error::IndexBuild(format!(
                    "{} already exists",
                    destination.display()
                )));
            }
            debug!(path = %destination.display(), "replacing existing index");
            std::fs::remove_dir_all(destination)?;
        }
        std::fs::create_dir_all(destination)?;

        let store = IndexStore::create(&destination.join(INDEX_FILE))?;
        store.set_setting(MODEL_SETTING, &params.model_name)?;
        store.set_setting(
            DOCUMENT_LENGTH_SETTING,
            &params.max_document_length.to_string(),
        )?;

        let passages = collect_passages(batch, params);
        info!(
            records = batch.len(),
            passages = passages.len(),
            "building index"
        );
        store.store_passages(&passages)?;

        let mut model = ModelManager::with_model_id(params.model_name.clone());
        let batch_size = params.batch_size.max(1);
        for (n, chunk) in passages.chunks(batch_size).enumerate() {
            let texts: Vec<String> =
                chunk.iter().map(|(_, p)| p.text.clone()).collect();
            let ids: Vec<u64> = chunk.iter().map(|(id, _)| *id).collect();

            let embeddings = model.encode_documents(&texts)?;
            store.batch_store_embeddings(&split_batch(&embeddings, &ids)?)?;
            debug!(batch = n + 1, passages = ids.len(), "encoded batch");
        }

        Ok(destination.to_path_buf())
    }

    fn load(&self, path: &Path) -> Result<ColbertIndex> {
        ColbertIndex::open(path)
    }
}

/// Number every passage of every record, in batch order.
fn collect_passages(
    batch: &RecordBatch,
    params: &BuildParams,
) -> Vec<(u64, StoredPassage)> {
    let mut passages = Vec::new();
    for record in batch.iter() {
        for text in split_passages(
            record.text,
            params.max_document_length,
            params.split_documents,
        ) {
            let id = passages.len() as u64;
            passages.push((
                id,
                StoredPassage {
                    document_id: record.id.to_string(),
                    text,
                    metadata: record.metadata.clone(),
                },
            ));
        }
    }
    passages
}

/// A built index opened for querying.
#[derive(Debug)]
pub struct ColbertIndex {
    path: PathBuf,
    store: IndexStore,
    model: Mutex<ModelManager>,
}

impl ColbertIndex {
    pub fn open(path: &Path) -> Result<Self> {
        let store = IndexStore::open(&path.join(INDEX_FILE))?;
        let model_name = store.get_setting(MODEL_SETTING)?.ok_or_else(|| {
            Error::Model(format!("{} does not record its model", path.display()))
        })?;
        debug!(path = %path.display(), model = %model_name, "opened index");

        Ok(Self {
            path: path.to_path_buf(),
            store,
            model: Mutex::new(ModelManager::with_model_id(model_name)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn model_name(&self) -> Result<String> {
        Ok(self.lock_model()?.model_id().to_string())
    }

    fn lock_model(&self) -> Result<MutexGuard<'_, ModelManager>> {
        self.model
            .lock()
            .map_err(|_| Error::Model("model lock poisoned".into()))
    }

    fn encode_query(&self, query: &str) -> Result<Tensor> {
        let query_embedding = self.lock_model()?.encode_query(query)?;
        to_host(&query_embedding)
    }

    /// The `k` best passages for an already encoded query.
    fn search_embedding(
        &self,
        query_embedding: &Tensor,
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        let ids = self.store.passage_ids()?;
        let top = top_passages(query_embedding, &ids, &self.store, k);

        let mut hits = Vec::with_capacity(top.len());
        for (id, score) in top {
            let Some(passage) = self.store.load_passage(id)? else {
                continue;
            };
            hits.push(SearchHit {
                content: passage.text,
                score,
                document_id: Some(passage.document_id),
                metadata: passage.metadata,
            });
        }
        Ok(hits)
    }
}

impl SearchIndex for ColbertIndex {
    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.encode_query(query)?;
        self.search_embedding(&query_embedding, k)
    }

    fn rerank(&self, query: &str, texts: &[String]) -> Result<Vec<String>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut model = self.lock_model()?;
        let query_embedding = to_host(&model.encode_query(query)?)?;

        let mut scores = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(RERANK_BATCH) {
            let embeddings = to_host(&model.encode_documents(chunk)?)?;
            for i in 0..chunk.len() {
                scores.push(maxsim(&query_embedding, &embeddings.get(i)?)?);
            }
        }
        drop(model);

        Ok(order_by_score(texts, &scores))
    }
}

/// MaxSim-score `ids` in parallel and keep the `k` best.
///
/// Passages without a usable embedding are skipped. Equal scores are ordered
/// by passage ID.
fn top_passages(
    query_embedding: &Tensor,
    ids: &[u64],
    store: &IndexStore,
    k: usize,
) -> Vec<(u64, f32)> {
    let mut scored: Vec<(u64, f32)> = ids
        .par_iter()
        .filter_map(|&id| {
            let doc_embedding = load_embedding_tensor(store, id).ok().flatten()?;
            let score = maxsim(query_embedding, &doc_embedding).ok()?;
            Some((id, score))
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(k);
    scored
}

/// `texts` sorted by descending score; ties keep their input order.
fn order_by_score(texts: &[String], scores: &[f32]) -> Vec<String> {
    let mut order: Vec<usize> = (0..texts.len().min(scores.len())).collect();
    order.sort_by(|&a, &b| {
        scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal)
    });
    order.into_iter().map(|i| texts[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;
    use crate::{index_store::EmbeddingMatrix, normalize::Metadata};

    fn params(max_document_length: usize, split: bool) -> BuildParams {
        BuildParams {
            model_name: "test/model".into(),
            max_document_length,
            split_documents: split,
            batch_size: 8,
            overwrite: true,
        }
    }

    fn sample_batch() -> RecordBatch {
        let mut batch = RecordBatch::new();
        batch.push(
            "short",
            "a.txt",
            Metadata::from([("source".into(), "a.txt".into())]),
        );
        batch.push(
            "word ".repeat(40),
            "b.txt",
            Metadata::from([("source".into(), "b.txt".into())]),
        );
        batch
    }

    /// A store with one-token passages pointing along the given axes.
    fn store_with_axes(axes: &[usize]) -> (tempfile::TempDir, IndexStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = IndexStore::create(&tmp.path().join(INDEX_FILE)).unwrap();
        let entries: Vec<(u64, EmbeddingMatrix)> = axes
            .iter()
            .enumerate()
            .map(|(id, &axis)| {
                let mut data = vec![0.0; 3];
                data[axis] = 1.0;
                (
                    id as u64,
                    EmbeddingMatrix {
                        num_tokens: 1,
                        dimension: 3,
                        data,
                    },
                )
            })
            .collect();
        store.batch_store_embeddings(&entries).unwrap();
        (tmp, store)
    }

    fn query(axis: usize) -> Tensor {
        let mut data = vec![0.0f32; 3];
        data[axis] = 1.0;
        Tensor::from_vec(data, (1, 3), &Device::Cpu).unwrap()
    }

    #[test]
    fn passages_are_numbered_in_record_order() {
        let passages = collect_passages(&sample_batch(), &params(4, true));

        assert!(passages.len() > 2);
        assert_eq!(passages[0].1.text, "short");
        assert_eq!(passages[0].1.document_id, "a.txt");
        for (i, (id, passage)) in passages.iter().enumerate().skip(1) {
            assert_eq!(*id, i as u64);
            assert_eq!(passage.document_id, "b.txt");
            assert_eq!(passage.metadata["source"], "b.txt");
        }
    }

    #[test]
    fn unsplit_records_are_one_passage_each() {
        let passages = collect_passages(&sample_batch(), &params(4, false));
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[1].1.text.chars().count(), 16);
    }

    #[test]
    fn top_passages_orders_by_maxsim() {
        let (_tmp, store) = store_with_axes(&[1, 0, 2, 0]);
        let ids = store.passage_ids().unwrap();

        let top = top_passages(&query(0), &ids, &store, 10);
        let order: Vec<u64> = top.iter().map(|(id, _)| *id).collect();
        // ties between 1 and 3 break by passage id
        assert_eq!(&order[..2], &[1, 3]);
        assert!((top[0].1 - 1.0).abs() < 1e-6);

        assert_eq!(top_passages(&query(0), &ids, &store, 1).len(), 1);
    }

    #[test]
    fn top_passages_skips_missing_embeddings() {
        let (_tmp, store) = store_with_axes(&[0]);
        let top = top_passages(&query(0), &[0, 5], &store, 10);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0, 0);
    }

    #[test]
    fn search_returns_stored_passages() {
        let tmp = tempfile::tempdir().unwrap();
        let store = IndexStore::create(&tmp.path().join(INDEX_FILE)).unwrap();
        store.set_setting(MODEL_SETTING, "test/model").unwrap();
        let passages = collect_passages(&sample_batch(), &params(256, true));
        store.store_passages(&passages).unwrap();
        store
            .batch_store_embeddings(&[
                (
                    0,
                    EmbeddingMatrix {
                        num_tokens: 1,
                        dimension: 3,
                        data: vec![0.0, 1.0, 0.0],
                    },
                ),
                (
                    1,
                    EmbeddingMatrix {
                        num_tokens: 1,
                        dimension: 3,
                        data: vec![1.0, 0.0, 0.0],
                    },
                ),
            ])
            .unwrap();
        drop(store);

        let index = ColbertBackend::new().load(tmp.path()).unwrap();
        assert_eq!(index.model_name().unwrap(), "test/model");

        let hits = index.search_embedding(&query(0), 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id.as_deref(), Some("b.txt"));
        assert_eq!(hits[1].content, "short");
        assert_eq!(hits[1].metadata["source"], "a.txt");
    }

    #[test]
    fn load_missing_index_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ColbertBackend::new().load(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn load_without_model_setting_fails() {
        let tmp = tempfile::tempdir().unwrap();
        IndexStore::create(&tmp.path().join(INDEX_FILE)).unwrap();
        assert!(matches!(
            ColbertBackend::new().load(tmp.path()),
            Err(Error::Model(_))
        ));
    }

    #[test]
    fn build_refuses_existing_destination_without_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let mut p = params(256, true);
        p.overwrite = false;

        let err = ColbertBackend::new()
            .build(&RecordBatch::new(), tmp.path(), &p)
            .unwrap_err();
        assert!(matches!(err, Error::IndexBuild(_)));
    }

    #[test]
    fn empty_batch_builds_an_empty_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("empty");

        let path = ColbertBackend::new()
            .build(&RecordBatch::new(), &dest, &params(256, true))
            .unwrap();
        assert_eq!(path, dest);

        let index = ColbertBackend::new().load(&dest).unwrap();
        assert!(index.store.passage_ids().unwrap().is_empty());
    }

    #[test]
    fn order_by_score_is_stable() {
        let texts: Vec<String> =
            ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let ordered = order_by_score(&texts, &[0.1, 0.9, 0.1, 0.5]);
        assert_eq!(ordered, vec!["b", "d", "a", "c"]);
    }
}
