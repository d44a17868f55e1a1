use crate::header::Hyperparams;
use crate::kernel::{AttentionKernel, FeedForwardKernel, Kernels, OutputProjectionKernel};
use crate::source::{ChunkStream, DataSource};
use crate::Result;

/// All weight tensors of a loaded model.
///
/// Per-layer tensors live inside the kernel instances; the embedding table is
/// held here because the decoder reads rows from it directly. Every tensor is
/// written exactly once, during load, and never mutated afterwards.
pub struct Checkpoint<K: Kernels> {
    /// (vocab_size, dim)
    pub embedding_weight: Vec<f32>,
    pub attention: K::Attention,
    pub feed_forward: K::FeedForward,
    pub output_projection: K::OutputProjection,
}

/// Streams every tensor, in the file's fixed order, into kernel-owned
/// storage.
///
/// The order is load-bearing: embedding table; attention norm, query, key,
/// value, output weights, each grouped across all layers; feed-forward norm,
/// gate, up, down weights, grouped the same way; final norm weight; final
/// output weight. When the shared-output flag is set the final output weight
/// is not read from the stream at all — it is a verbatim copy of the
/// embedding table.
pub fn load_checkpoint<S, K>(
    source: &mut DataSource<S>,
    hyperparams: &Hyperparams,
    kernels: &K,
) -> Result<Checkpoint<K>>
where
    S: ChunkStream,
    K: Kernels,
{
    let mut attention = kernels.create_attention(hyperparams)?;
    let mut feed_forward = kernels.create_feed_forward(hyperparams)?;
    let mut output_projection = kernels.create_output_projection(hyperparams)?;

    let mut embedding_weight =
        vec![0.0; hyperparams.vocab_size * hyperparams.embedding_size];
    source.request_f32(&mut embedding_weight)?;

    source.request_f32(attention.norm_weight_mut())?;
    source.request_f32(attention.query_weight_mut())?;
    source.request_f32(attention.key_weight_mut())?;
    source.request_f32(attention.value_weight_mut())?;
    source.request_f32(attention.output_weight_mut())?;

    source.request_f32(feed_forward.norm_weight_mut())?;
    source.request_f32(feed_forward.gate_weight_mut())?;
    source.request_f32(feed_forward.up_weight_mut())?;
    source.request_f32(feed_forward.down_weight_mut())?;

    source.request_f32(output_projection.norm_weight_mut())?;

    if hyperparams.shared_output_weight {
        output_projection
            .output_weight_mut()
            .copy_from_slice(&embedding_weight);
    } else {
        source.request_f32(output_projection.output_weight_mut())?;
    }

    Ok(Checkpoint {
        embedding_weight,
        attention,
        feed_forward,
        output_projection,
    })
}
