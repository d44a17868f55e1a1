//! Compute-kernel capability interfaces.
//!
//! The decoder engine and the checkpoint loader only ever see these traits:
//! the loader pours weight bytes into the `*_weight_mut` buffers once, the
//! engine copies activations through the input/output slots. One instance of
//! each kernel class covers all layers; weight buffers are layer-concatenated
//! and `forward` takes the layer index.

use crate::header::Hyperparams;
use crate::Result;

/// Attention over all layers, including the only position-indexed state in
/// the system (the key/value cache).
pub trait AttentionKernel {
    fn norm_weight_mut(&mut self) -> &mut [f32];
    fn query_weight_mut(&mut self) -> &mut [f32];
    fn key_weight_mut(&mut self) -> &mut [f32];
    fn value_weight_mut(&mut self) -> &mut [f32];
    fn output_weight_mut(&mut self) -> &mut [f32];
    fn input_vector_mut(&mut self) -> &mut [f32];
    fn output_vector(&self) -> &[f32];

    /// Positions must arrive in increasing order, one per committed token;
    /// the key/value cache is indexed by them. The kernel adds its own input
    /// as the residual term.
    fn forward(&mut self, position: usize, layer: usize);
}

pub trait FeedForwardKernel {
    fn norm_weight_mut(&mut self) -> &mut [f32];
    fn gate_weight_mut(&mut self) -> &mut [f32];
    fn up_weight_mut(&mut self) -> &mut [f32];
    fn down_weight_mut(&mut self) -> &mut [f32];
    fn input_vector_mut(&mut self) -> &mut [f32];
    fn output_vector(&self) -> &[f32];

    /// The kernel adds its own input as the residual term.
    fn forward(&mut self, layer: usize);
}

pub trait OutputProjectionKernel {
    fn norm_weight_mut(&mut self) -> &mut [f32];
    fn output_weight_mut(&mut self) -> &mut [f32];
    fn input_vector_mut(&mut self) -> &mut [f32];
    fn output_vector(&self) -> &[f32];
    fn output_vector_mut(&mut self) -> &mut [f32];

    fn forward(&mut self);

    /// Normalizes the logits in place.
    fn compute_softmax(&mut self);
}

/// Factory for the three kernel classes, injected into the checkpoint
/// loader at construction time.
pub trait Kernels {
    type Attention: AttentionKernel;
    type FeedForward: FeedForwardKernel;
    type OutputProjection: OutputProjectionKernel;

    fn create_attention(&self, hyperparams: &Hyperparams) -> Result<Self::Attention>;
    fn create_feed_forward(&self, hyperparams: &Hyperparams) -> Result<Self::FeedForward>;
    fn create_output_projection(&self, hyperparams: &Hyperparams)
        -> Result<Self::OutputProjection>;
}
