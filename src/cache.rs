//! Content-addressed memoization of query results.
//!
//! Keys are blake3 hashes of a JSON serialization of a call's semantic
//! inputs, so they are stable across runs and independent of in-memory
//! object identity.

use std::{collections::HashMap, path::Path, sync::Mutex};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{
    backend::SearchIndex,
    error::{Error, Result},
    retrieval::{SearchResult, retrieve_and_rerank},
};

const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

/// Hex-encoded blake3 digest identifying one cached call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive a key from an operation name and its inputs.
    pub fn for_inputs<T: Serialize>(operation: &str, inputs: &T) -> Result<Self> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(operation.as_bytes());
        hasher.update(&[0]);
        hasher.update(&serde_json::to_vec(inputs)?);
        Ok(Self(hasher.finalize().to_hex().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait ResultCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &CacheKey, value: &[u8]) -> Result<()>;

    /// Fetch and decode a JSON value. Undecodable entries count as misses.
    fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>>
    where
        Self: Sized,
    {
        let Some(bytes) = self.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = %key, "ignoring unreadable cache entry: {e}");
                Ok(None)
            }
        }
    }

    fn put_json<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<()>
    where
        Self: Sized,
    {
        self.put(key, &serde_json::to_vec(value)?)
    }
}

/// A cache stored in a single redb table on disk.
pub struct DiskCache {
    db: Database,
}

impl DiskCache {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|_| Error::DataDir(parent.to_path_buf()))?;
        }
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(ENTRIES)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Open `cache.redb` inside `dir`.
    pub fn open_in(dir: &Path) -> Result<Self> {
        Self::open(&dir.join("cache.redb"))
    }
}

impl ResultCache for DiskCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;
        Ok(table.get(key.as_str())?.map(|v| v.value().to_vec()))
    }

    fn put(&self, key: &CacheKey, value: &[u8]) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ENTRIES)?;
            table.insert(key.as_str(), value)?;
        }
        txn.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCache").finish_non_exhaustive()
    }
}

/// An in-process cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, Vec<u8>>>,
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| Error::Config("cache lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &CacheKey, value: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Config("cache lock poisoned".into()))?;
        entries.insert(key.clone(), value.to_vec());
        Ok(())
    }
}

#[derive(Serialize)]
struct QueryInputs<'a> {
    index: &'a str,
    model: &'a str,
    query: &'a str,
    k: usize,
    rerank_k: usize,
}

/// [`retrieve_and_rerank`] memoized in `cache`.
///
/// `index_id` and `model` identify the index the results came from; only
/// successful results are stored.
pub fn cached_retrieve_and_rerank<C, I>(
    cache: &C,
    index: &I,
    index_id: &str,
    model: &str,
    query: &str,
    k: usize,
    rerank_k: usize,
) -> Result<Vec<SearchResult>>
where
    C: ResultCache,
    I: SearchIndex + ?Sized,
{
    let key = CacheKey::for_inputs(
        "retrieve_and_rerank",
        &QueryInputs {
            index: index_id,
            model,
            query,
            k,
            rerank_k,
        },
    )?;

    if let Some(results) = cache.get_json::<Vec<SearchResult>>(&key)? {
        debug!(key = %key, "cache hit");
        return Ok(results);
    }

    let results = retrieve_and_rerank(index, query, k, rerank_k)?;
    cache.put_json(&key, &results)?;
    debug!(key = %key, "cached results");
    Ok(results)
}
