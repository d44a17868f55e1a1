use crate::checkpoint::Checkpoint;
use crate::header::Hyperparams;
use crate::kernel::{AttentionKernel, FeedForwardKernel, Kernels, OutputProjectionKernel};

/// Sequences the per-layer forward passes over a single reusable hidden-state
/// buffer.
///
/// One decoder drives exactly one sequence: positions must be fed as 0, 1,
/// 2, … with no gaps or repeats, because the attention kernel's key/value
/// cache is indexed by them. Reusing a decoder for a second, independent
/// sequence requires a fresh checkpoint/kernel set.
pub struct Decoder<K: Kernels> {
    hyperparams: Hyperparams,
    checkpoint: Checkpoint<K>,
    /// residual stream for the position currently being processed
    /// (dim,)
    hidden_state: Vec<f32>,
}

impl<K: Kernels> Decoder<K> {
    pub fn new(hyperparams: Hyperparams, checkpoint: Checkpoint<K>) -> Self {
        let hidden_state = vec![0.0; hyperparams.embedding_size];

        Self {
            hyperparams,
            checkpoint,
            hidden_state,
        }
    }

    pub fn hyperparams(&self) -> &Hyperparams {
        &self.hyperparams
    }

    /// Runs one token through all layers and returns the logits over the
    /// vocabulary, normalized to probabilities when `softmax` is set.
    ///
    /// The logits buffer is overwritten by the next call; the returned
    /// mutable borrow forces callers to consume it first.
    pub fn forward(&mut self, token_id: usize, position: usize, softmax: bool) -> &mut [f32] {
        let dim = self.hyperparams.embedding_size;

        assert!(
            token_id < self.hyperparams.vocab_size,
            "token id {token_id} out of range"
        );
        assert!(
            position < self.hyperparams.max_sequence_length,
            "position {position} out of range"
        );

        self.hidden_state
            .copy_from_slice(&self.checkpoint.embedding_weight[token_id * dim..][..dim]);

        for layer in 0..self.hyperparams.layer_count {
            let attention = &mut self.checkpoint.attention;
            attention.input_vector_mut().copy_from_slice(&self.hidden_state);
            attention.forward(position, layer);
            self.hidden_state.copy_from_slice(attention.output_vector());

            let feed_forward = &mut self.checkpoint.feed_forward;
            feed_forward.input_vector_mut().copy_from_slice(&self.hidden_state);
            feed_forward.forward(layer);
            self.hidden_state.copy_from_slice(feed_forward.output_vector());
        }

        let output_projection = &mut self.checkpoint.output_projection;
        output_projection
            .input_vector_mut()
            .copy_from_slice(&self.hidden_state);
        output_projection.forward();

        if softmax {
            output_projection.compute_softmax();
        }

        output_projection.output_vector_mut()
    }
}
