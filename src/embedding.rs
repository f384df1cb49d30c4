use candle_core::{DType, Device, Tensor};

use crate::{
    error::{Error, Result},
    index_store::{EmbeddingMatrix, IndexStore},
};

/// Split a `[B, T, D]` encoder output into one matrix per passage ID.
pub fn split_batch(
    embeddings: &Tensor,
    ids: &[u64],
) -> Result<Vec<(u64, EmbeddingMatrix)>> {
    let (batch_size, num_tokens, dimension) = embeddings.dims3()?;
    if batch_size != ids.len() {
        return Err(Error::IndexBuild(format!(
            "encoder returned {batch_size} embeddings for {} passages",
            ids.len()
        )));
    }

    let embeddings = to_host(embeddings)?;
    let mut entries = Vec::with_capacity(batch_size);
    for (i, &id) in ids.iter().enumerate() {
        let data = embeddings.get(i)?.flatten_all()?.to_vec1::<f32>()?;
        entries.push((
            id,
            EmbeddingMatrix {
                num_tokens: num_tokens as u32,
                dimension: dimension as u32,
                data,
            },
        ));
    }
    Ok(entries)
}

/// Move a tensor to host memory as f32, where stored embeddings live.
pub fn to_host(tensor: &Tensor) -> Result<Tensor> {
    Ok(tensor.to_device(&Device::Cpu)?.to_dtype(DType::F32)?)
}

pub fn matrix_to_tensor(matrix: &EmbeddingMatrix) -> Result<Tensor> {
    Ok(Tensor::from_slice(
        &matrix.data,
        (matrix.num_tokens as usize, matrix.dimension as usize),
        &Device::Cpu,
    )?)
}

/// Load a passage's embedding as a `[T, D]` tensor.
///
/// Returns None if the passage has no stored embedding.
pub fn load_embedding_tensor(store: &IndexStore, id: u64) -> Result<Option<Tensor>> {
    match store.load_embedding(id)? {
        Some(matrix) => Ok(Some(matrix_to_tensor(&matrix)?)),
        None => Ok(None),
    }
}

/// Late-interaction score of a `[Q, D]` query against a `[T, D]` passage.
///
/// MaxSim = sum over query tokens of the best dot product with any passage
/// token.
pub fn maxsim(query_embedding: &Tensor, doc_embedding: &Tensor) -> Result<f32> {
    // [Q, T]
    let sim_matrix = query_embedding.matmul(&doc_embedding.t()?)?;
    let row_maxes = sim_matrix.max(1)?;
    Ok(row_maxes.sum_all()?.to_scalar::<f32>()?)
}
