use std::path::PathBuf;

use tracing::{error, info};

use crate::{
    backend::{BuildParams, RetrievalBackend},
    config::Settings,
    error::{Error, Result},
    normalize::RecordBatch,
};

/// Maximum passage length, in model tokens, for built indexes.
pub const MAX_DOCUMENT_LENGTH: usize = 256;

/// Build an index named `index_name` from `batch` under the configured
/// index root, replacing any index with the same name.
///
/// Returns the index directory `{index_root}/colbert/indexes/{index_name}`.
pub fn build_index<B: RetrievalBackend + ?Sized>(
    backend: &B,
    batch: &RecordBatch,
    index_name: &str,
    model_name: &str,
    settings: &Settings,
) -> Result<PathBuf> {
    let data_dir = settings.data_dir();
    let destination = data_dir.index_path(index_name)?;
    data_dir.ensure_indexes_dir()?;

    let params = BuildParams {
        model_name: model_name.to_string(),
        max_document_length: MAX_DOCUMENT_LENGTH,
        split_documents: true,
        batch_size: settings.batch_size,
        overwrite: true,
    };

    info!(
        index = index_name,
        model = model_name,
        records = batch.len(),
        "building index"
    );

    match backend.build(batch, &destination, &params) {
        Ok(path) => {
            info!(path = %path.display(), "index built");
            Ok(destination)
        }
        Err(e) => {
            error!(index = index_name, "index build failed: {e}");
            Err(match e {
                Error::IndexBuild(_) => e,
                other => Error::IndexBuild(other.to_string()),
            })
        }
    }
}
