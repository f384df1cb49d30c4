use candle_core::{Device, Tensor};
use pylate_rs::ColBERT;

use crate::error::{Error, Result};

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

/// Owns a ColBERT model, loading it on first use.
pub struct ModelManager {
    model: Option<ColBERT>,
    model_id: String,
}

impl ModelManager {
    /// The model is not loaded until the first encode call.
    pub fn with_model_id(model_id: impl Into<String>) -> Self {
        Self {
            model: None,
            model_id: model_id.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Ensures the model is loaded, downloading from HuggingFace Hub if needed.
    fn ensure_loaded(&mut self) -> Result<&mut ColBERT> {
        if self.model.is_none() {
            tracing::info!(model = %self.model_id, "loading ColBERT model");
            let loaded: std::result::Result<ColBERT, _> =
                ColBERT::from(&self.model_id)
                    .with_device(default_device())
                    .try_into();
            let colbert = loaded.map_err(|e| {
                Error::Model(format!("cannot load {}: {e}", self.model_id))
            })?;
            self.model = Some(colbert);
        }

        self.model
            .as_mut()
            .ok_or_else(|| Error::Model("model not loaded".into()))
    }

    /// Encodes document texts into token-level embeddings `[B, T, D]`.
    pub fn encode_documents(&mut self, texts: &[String]) -> Result<Tensor> {
        let model = self.ensure_loaded()?;
        model
            .encode(texts, false)
            .map_err(|e| Error::Model(e.to_string()))
    }

    /// Encodes a query into a `[Q, D]` matrix.
    pub fn encode_query(&mut self, query: &str) -> Result<Tensor> {
        let model = self.ensure_loaded()?;
        let embeddings = model
            .encode(&[query.to_string()], true)
            .map_err(|e| Error::Model(e.to_string()))?;
        // [1, Q, D] -> [Q, D]
        Ok(embeddings.squeeze(0)?)
    }
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("model_id", &self.model_id)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
