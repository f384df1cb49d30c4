use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    normalize::Metadata,
};

const PASSAGES: TableDefinition<u64, &[u8]> = TableDefinition::new("passages");
const EMBEDDINGS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("embeddings");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Header size: 4 bytes token count + 4 bytes dimension.
const HEADER_SIZE: usize = 8;

/// A passage as stored in the index: a piece of one record's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPassage {
    pub document_id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// A per-token embedding matrix stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    pub num_tokens: u32,
    pub dimension: u32,
    pub data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn token_embedding(&self, token: u32) -> &[f32] {
        let dim = self.dimension as usize;
        let start = token as usize * dim;
        &self.data[start..start + dim]
    }
}

/// Passage texts, their ColBERT embeddings, and index settings, in one
/// redb database.
///
/// Embedding binary format per entry:
/// - 4 bytes: token count T (u32 LE)
/// - 4 bytes: embedding dimension D (u32 LE)
/// - T * D * 4 bytes: f32 LE values in row-major order
pub struct IndexStore {
    db: Database,
}

impl IndexStore {
    /// Create (or open) the store at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(PASSAGES)?;
        txn.open_table(EMBEDDINGS)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Open an existing store; fails if there is none at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::NotFound {
                kind: "index",
                name: path.display().to_string(),
            });
        }
        Ok(Self {
            db: Database::open(path)?,
        })
    }

    // -- Passages --

    /// Store passages in a single transaction.
    pub fn store_passages(&self, passages: &[(u64, StoredPassage)]) -> Result<()> {
        if passages.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(PASSAGES)?;
            for (id, passage) in passages {
                let bytes = serde_json::to_vec(passage)?;
                table.insert(*id, bytes.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    pub fn load_passage(&self, id: u64) -> Result<Option<StoredPassage>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PASSAGES)?;
        match table.get(id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn passage_ids(&self) -> Result<Vec<u64>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PASSAGES)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, _) = entry?;
            result.push(k.value());
        }
        Ok(result)
    }

    // -- Embeddings --

    /// Store multiple embedding matrices in a single transaction.
    pub fn batch_store_embeddings(
        &self,
        entries: &[(u64, EmbeddingMatrix)],
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(EMBEDDINGS)?;
            for (id, matrix) in entries {
                let expected =
                    matrix.num_tokens as usize * matrix.dimension as usize;
                if matrix.data.len() != expected {
                    return Err(Error::IndexBuild(format!(
                        "embedding for passage {id} has {} values, expected {expected}",
                        matrix.data.len()
                    )));
                }

                let byte_len =
                    HEADER_SIZE + std::mem::size_of_val(matrix.data.as_slice());
                let mut guard = table.insert_reserve(*id, byte_len)?;
                let dest = guard.as_mut();

                dest[0..4].copy_from_slice(&matrix.num_tokens.to_le_bytes());
                dest[4..8].copy_from_slice(&matrix.dimension.to_le_bytes());
                dest[HEADER_SIZE..]
                    .copy_from_slice(bytemuck::cast_slice(&matrix.data));
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Returns `None` if the passage has no (well-formed) embedding.
    pub fn load_embedding(&self, id: u64) -> Result<Option<EmbeddingMatrix>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;

        let Some(guard) = table.get(id)? else {
            return Ok(None);
        };
        Ok(decode_matrix(guard.value()))
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }
}

fn decode_matrix(bytes: &[u8]) -> Option<EmbeddingMatrix> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }

    let num_tokens = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let dimension = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

    let expected_len =
        HEADER_SIZE + (num_tokens as usize) * (dimension as usize) * 4;
    if bytes.len() != expected_len {
        return None;
    }

    // The value slice is not guaranteed to be 4-byte aligned.
    let data: Vec<f32> = bytes[HEADER_SIZE..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Some(EmbeddingMatrix {
        num_tokens,
        dimension,
        data,
    })
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, IndexStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = IndexStore::create(&tmp.path().join("index.redb")).unwrap();
        (tmp, store)
    }

    fn passage(id: &str, text: &str) -> StoredPassage {
        StoredPassage {
            document_id: id.to_string(),
            text: text.to_string(),
            metadata: Metadata::from([("source".to_string(), id.to_string())]),
        }
    }

    #[test]
    fn passages_roundtrip() {
        let (_tmp, store) = test_store();
        store
            .store_passages(&[(0, passage("a.txt", "alpha")), (1, passage("b.txt", "beta"))])
            .unwrap();

        assert_eq!(store.passage_ids().unwrap(), vec![0, 1]);
        assert_eq!(store.load_passage(1).unwrap(), Some(passage("b.txt", "beta")));
        assert_eq!(store.load_passage(9).unwrap(), None);
    }

    #[test]
    fn embeddings_roundtrip() {
        let (_tmp, store) = test_store();
        let matrix = EmbeddingMatrix {
            num_tokens: 3,
            dimension: 4,
            data: (0..12).map(|i| i as f32).collect(),
        };
        store.batch_store_embeddings(&[(42, matrix.clone())]).unwrap();

        let loaded = store.load_embedding(42).unwrap().unwrap();
        assert_eq!(loaded, matrix);
        assert_eq!(loaded.token_embedding(1), &[4.0, 5.0, 6.0, 7.0]);
        assert!(store.load_embedding(7).unwrap().is_none());
    }

    #[test]
    fn mismatched_embedding_is_rejected() {
        let (_tmp, store) = test_store();
        let bad = EmbeddingMatrix {
            num_tokens: 2,
            dimension: 2,
            data: vec![1.0],
        };
        assert!(store.batch_store_embeddings(&[(1, bad)]).is_err());
    }

    #[test]
    fn settings_roundtrip() {
        let (_tmp, store) = test_store();
        assert_eq!(store.get_setting("model").unwrap(), None);
        store.set_setting("model", "custom/model").unwrap();
        assert_eq!(
            store.get_setting("model").unwrap(),
            Some("custom/model".to_string())
        );
    }

    #[test]
    fn open_missing_store_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = IndexStore::open(&tmp.path().join("index.redb")).unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "index", .. }));
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.redb");
        {
            let store = IndexStore::create(&path).unwrap();
            store.store_passages(&[(5, passage("a", "alpha"))]).unwrap();
        }

        let store = IndexStore::open(&path).unwrap();
        assert_eq!(store.passage_ids().unwrap(), vec![5]);
    }

    #[test]
    fn decode_rejects_truncated_entries() {
        assert!(decode_matrix(&[1, 2, 3]).is_none());

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        assert!(decode_matrix(&bytes).is_none());
    }
}
