//! Turning one raw file into uniform `(text, id, metadata)` records.

use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    path::Path,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::{
    error::{Error, Result},
    readers::{Content, ReaderRegistry},
};

/// Free-form record metadata. Always contains [`SOURCE_KEY`].
pub type Metadata = BTreeMap<String, String>;

pub const SOURCE_KEY: &str = "source";

/// A borrowed view of one record in a [`RecordBatch`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentRecord<'a> {
    pub text: &'a str,
    pub id: &'a str,
    pub metadata: &'a Metadata,
}

/// Records stored as three parallel collections.
///
/// The collections only grow together, so they always have equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRecordBatch")]
pub struct RecordBatch {
    texts: Vec<String>,
    ids: Vec<String>,
    metadatas: Vec<Metadata>,
}

#[derive(Deserialize)]
struct RawRecordBatch {
    texts: Vec<String>,
    ids: Vec<String>,
    metadatas: Vec<Metadata>,
}

impl TryFrom<RawRecordBatch> for RecordBatch {
    type Error = String;

    fn try_from(raw: RawRecordBatch) -> std::result::Result<Self, String> {
        if raw.texts.len() != raw.ids.len()
            || raw.texts.len() != raw.metadatas.len()
        {
            return Err(format!(
                "mismatched record batch: {} texts, {} ids, {} metadatas",
                raw.texts.len(),
                raw.ids.len(),
                raw.metadatas.len()
            ));
        }
        Ok(Self {
            texts: raw.texts,
            ids: raw.ids,
            metadatas: raw.metadatas,
        })
    }
}

impl RecordBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        text: impl Into<String>,
        id: impl Into<String>,
        metadata: Metadata,
    ) {
        self.texts.push(text.into());
        self.ids.push(id.into());
        self.metadatas.push(metadata);
    }

    /// Append every record of `other`, keeping its order.
    pub fn extend(&mut self, other: RecordBatch) {
        self.texts.extend(other.texts);
        self.ids.extend(other.ids);
        self.metadatas.extend(other.metadatas);
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn metadatas(&self) -> &[Metadata] {
        &self.metadatas
    }

    pub fn iter(&self) -> impl Iterator<Item = DocumentRecord<'_>> {
        self.texts
            .iter()
            .zip(&self.ids)
            .zip(&self.metadatas)
            .map(|((text, id), metadata)| DocumentRecord { text, id, metadata })
    }
}

/// Normalize `path`, absorbing any failure into an empty batch.
///
/// Errors and reader panics are logged with the file path; they never reach
/// the caller, so one bad file cannot abort an ingestion run.
pub fn normalize(registry: &ReaderRegistry, path: &Path) -> RecordBatch {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        try_normalize(registry, path)
    }));

    match outcome {
        Ok(Ok(batch)) => {
            debug!(path = %path.display(), records = batch.len(), "normalized file");
            batch
        }
        Ok(Err(e)) => {
            error!(path = %path.display(), "error processing file: {e}");
            RecordBatch::new()
        }
        Err(payload) => {
            error!(
                path = %path.display(),
                "reader panicked: {}",
                panic_message(payload.as_ref())
            );
            RecordBatch::new()
        }
    }
}

/// Normalize `path`, returning reader errors to the caller.
pub fn try_normalize(registry: &ReaderRegistry, path: &Path) -> Result<RecordBatch> {
    let content = registry.read(path)?;
    Ok(records_from_content(path, content))
}

fn records_from_content(path: &Path, content: Content) -> RecordBatch {
    let source = path.to_string_lossy().to_string();
    let mut batch = RecordBatch::new();

    match content {
        Content::Text(text) => {
            batch.push(text, source.clone(), source_metadata(&source));
        }
        Content::Rows(rows) => {
            for (index, row) in rows.into_iter().enumerate() {
                batch.push(
                    coerce_to_text(row),
                    format!("{source}_{index}"),
                    source_metadata(&source),
                );
            }
        }
    }

    batch
}

fn source_metadata(source: &str) -> Metadata {
    Metadata::from([(SOURCE_KEY.to_string(), source.to_string())])
}

/// Strings are taken verbatim; any other value becomes compact JSON.
pub fn coerce_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
