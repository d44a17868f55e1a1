//! Reference CPU kernels.
//!
//! Each kernel owns its layer-concatenated weight buffers, its scratch
//! vectors, and (for attention) the key/value caches. The loader fills the
//! weights once; after that only the input/output slots and caches change.

use crate::header::Hyperparams;
use crate::kernel::{AttentionKernel, FeedForwardKernel, Kernels, OutputProjectionKernel};
use crate::operator;
use crate::Result;

/// Factory for the plain-CPU kernel set.
pub struct CpuKernels;

impl Kernels for CpuKernels {
    type Attention = CpuAttention;
    type FeedForward = CpuFeedForward;
    type OutputProjection = CpuOutputProjection;

    fn create_attention(&self, hyperparams: &Hyperparams) -> Result<CpuAttention> {
        Ok(CpuAttention::new(hyperparams))
    }

    fn create_feed_forward(&self, hyperparams: &Hyperparams) -> Result<CpuFeedForward> {
        Ok(CpuFeedForward::new(hyperparams))
    }

    fn create_output_projection(&self, hyperparams: &Hyperparams) -> Result<CpuOutputProjection> {
        Ok(CpuOutputProjection::new(hyperparams))
    }
}

pub struct CpuAttention {
    embedding_size: usize,
    key_value_size: usize,
    head_size: usize,
    query_head_count: usize,
    sequence_length: usize,
    /// (layer, dim)
    norm_weight: Vec<f32>,
    /// (layer, dim, dim)
    query_weight: Vec<f32>,
    /// (layer, kv_size, dim)
    key_weight: Vec<f32>,
    /// (layer, kv_size, dim)
    value_weight: Vec<f32>,
    /// (layer, dim, dim)
    output_weight: Vec<f32>,
    input_vector: Vec<f32>,
    output_vector: Vec<f32>,
    /// activation inside the residual branch
    /// (dim,)
    xb: Vec<f32>,
    /// query
    /// (dim,)
    q: Vec<f32>,
    /// buffer for scores/attention values
    /// (query_heads, seq_len)
    att: Vec<f32>,
    /// (layer, seq_len, kv_size)
    key_cache: Vec<f32>,
    value_cache: Vec<f32>,
}

impl CpuAttention {
    fn new(hyperparams: &Hyperparams) -> Self {
        let dim = hyperparams.embedding_size;
        let kv_size = hyperparams.key_value_size();
        let layers = hyperparams.layer_count;
        let seq_len = hyperparams.max_sequence_length;

        Self {
            embedding_size: dim,
            key_value_size: kv_size,
            head_size: hyperparams.head_size(),
            query_head_count: hyperparams.query_head_count,
            sequence_length: seq_len,
            norm_weight: vec![0.0; layers * dim],
            query_weight: vec![0.0; layers * dim * dim],
            key_weight: vec![0.0; layers * kv_size * dim],
            value_weight: vec![0.0; layers * kv_size * dim],
            output_weight: vec![0.0; layers * dim * dim],
            input_vector: vec![0.0; dim],
            output_vector: vec![0.0; dim],
            xb: vec![0.0; dim],
            q: vec![0.0; dim],
            att: vec![0.0; hyperparams.query_head_count * seq_len],
            key_cache: vec![0.0; layers * seq_len * kv_size],
            value_cache: vec![0.0; layers * seq_len * kv_size],
        }
    }
}

impl AttentionKernel for CpuAttention {
    fn norm_weight_mut(&mut self) -> &mut [f32] {
        &mut self.norm_weight
    }

    fn query_weight_mut(&mut self) -> &mut [f32] {
        &mut self.query_weight
    }

    fn key_weight_mut(&mut self) -> &mut [f32] {
        &mut self.key_weight
    }

    fn value_weight_mut(&mut self) -> &mut [f32] {
        &mut self.value_weight
    }

    fn output_weight_mut(&mut self) -> &mut [f32] {
        &mut self.output_weight
    }

    fn input_vector_mut(&mut self) -> &mut [f32] {
        &mut self.input_vector
    }

    fn output_vector(&self) -> &[f32] {
        &self.output_vector
    }

    fn forward(&mut self, position: usize, layer: usize) {
        let dim = self.embedding_size;
        let kv_size = self.key_value_size;
        let head_size = self.head_size;
        let seq_len = self.sequence_length;

        debug_assert!(position < seq_len);

        let norm = &self.norm_weight[layer * dim..][..dim];
        operator::rmsnorm(&mut self.xb, norm, &self.input_vector);

        let wq = &self.query_weight[layer * dim * dim..][..dim * dim];
        operator::matmul(&mut self.q, wq, &self.xb, dim, dim);

        // k and v for this position are produced directly into the caches
        let cache_offset = (layer * seq_len + position) * kv_size;
        let wk = &self.key_weight[layer * kv_size * dim..][..kv_size * dim];
        operator::matmul(
            &mut self.key_cache[cache_offset..][..kv_size],
            wk,
            &self.xb,
            dim,
            kv_size,
        );
        let wv = &self.value_weight[layer * kv_size * dim..][..kv_size * dim];
        operator::matmul(
            &mut self.value_cache[cache_offset..][..kv_size],
            wv,
            &self.xb,
            dim,
            kv_size,
        );

        operator::rope(&mut self.q, head_size, position);
        operator::rope(
            &mut self.key_cache[cache_offset..][..kv_size],
            head_size,
            position,
        );

        // query heads share key/value heads in groups
        let kv_head_count = kv_size / head_size;
        let group_size = self.query_head_count / kv_head_count;
        let scale = (head_size as f32).sqrt();

        self.xb.fill(0.0);

        for head in 0..self.query_head_count {
            let q = &self.q[head * head_size..][..head_size];
            let kv_offset = (head / group_size) * head_size;
            let att = &mut self.att[head * seq_len..][..position + 1];

            for (t, score) in att.iter_mut().enumerate() {
                let k = &self.key_cache[(layer * seq_len + t) * kv_size + kv_offset..][..head_size];
                *score = q.iter().zip(k).map(|(q, k)| q * k).sum::<f32>() / scale;
            }

            operator::softmax(att);

            let xb = &mut self.xb[head * head_size..][..head_size];

            for (t, &score) in att.iter().enumerate() {
                let v =
                    &self.value_cache[(layer * seq_len + t) * kv_size + kv_offset..][..head_size];
                xb.iter_mut().zip(v).for_each(|(x, v)| *x += score * v);
            }
        }

        let wo = &self.output_weight[layer * dim * dim..][..dim * dim];
        operator::matmul(&mut self.output_vector, wo, &self.xb, dim, dim);

        // the residual connection belongs to this kernel
        self.output_vector
            .iter_mut()
            .zip(&self.input_vector)
            .for_each(|(out, x)| *out += x);
    }
}

pub struct CpuFeedForward {
    embedding_size: usize,
    hidden_size: usize,
    /// (layer, dim)
    norm_weight: Vec<f32>,
    /// (layer, hidden_dim, dim)
    gate_weight: Vec<f32>,
    /// (layer, hidden_dim, dim)
    up_weight: Vec<f32>,
    /// (layer, dim, hidden_dim)
    down_weight: Vec<f32>,
    input_vector: Vec<f32>,
    output_vector: Vec<f32>,
    /// (dim,)
    xb: Vec<f32>,
    /// buffers for the hidden dimension
    /// (hidden_dim,)
    hb: Vec<f32>,
    hb2: Vec<f32>,
}

impl CpuFeedForward {
    fn new(hyperparams: &Hyperparams) -> Self {
        let dim = hyperparams.embedding_size;
        let hidden_dim = hyperparams.hidden_size;
        let layers = hyperparams.layer_count;

        Self {
            embedding_size: dim,
            hidden_size: hidden_dim,
            norm_weight: vec![0.0; layers * dim],
            gate_weight: vec![0.0; layers * hidden_dim * dim],
            up_weight: vec![0.0; layers * hidden_dim * dim],
            down_weight: vec![0.0; layers * dim * hidden_dim],
            input_vector: vec![0.0; dim],
            output_vector: vec![0.0; dim],
            xb: vec![0.0; dim],
            hb: vec![0.0; hidden_dim],
            hb2: vec![0.0; hidden_dim],
        }
    }
}

impl FeedForwardKernel for CpuFeedForward {
    fn norm_weight_mut(&mut self) -> &mut [f32] {
        &mut self.norm_weight
    }

    fn gate_weight_mut(&mut self) -> &mut [f32] {
        &mut self.gate_weight
    }

    fn up_weight_mut(&mut self) -> &mut [f32] {
        &mut self.up_weight
    }

    fn down_weight_mut(&mut self) -> &mut [f32] {
        &mut self.down_weight
    }

    fn input_vector_mut(&mut self) -> &mut [f32] {
        &mut self.input_vector
    }

    fn output_vector(&self) -> &[f32] {
        &self.output_vector
    }

    fn forward(&mut self, layer: usize) {
        let dim = self.embedding_size;
        let hidden_dim = self.hidden_size;

        let norm = &self.norm_weight[layer * dim..][..dim];
        operator::rmsnorm(&mut self.xb, norm, &self.input_vector);

        let gate = &self.gate_weight[layer * hidden_dim * dim..][..hidden_dim * dim];
        operator::matmul(&mut self.hb, gate, &self.xb, dim, hidden_dim);

        let up = &self.up_weight[layer * hidden_dim * dim..][..hidden_dim * dim];
        operator::matmul(&mut self.hb2, up, &self.xb, dim, hidden_dim);

        operator::silu(&mut self.hb);
        self.hb
            .iter_mut()
            .zip(&self.hb2)
            .for_each(|(hb, hb2)| *hb *= hb2);

        let down = &self.down_weight[layer * dim * hidden_dim..][..dim * hidden_dim];
        operator::matmul(&mut self.output_vector, down, &self.hb, hidden_dim, dim);

        // the residual connection belongs to this kernel
        self.output_vector
            .iter_mut()
            .zip(&self.input_vector)
            .for_each(|(out, x)| *out += x);
    }
}

pub struct CpuOutputProjection {
    embedding_size: usize,
    vocab_size: usize,
    /// (dim,)
    norm_weight: Vec<f32>,
    /// (vocab_size, dim)
    output_weight: Vec<f32>,
    input_vector: Vec<f32>,
    /// (vocab_size,)
    output_vector: Vec<f32>,
    /// (dim,)
    xb: Vec<f32>,
}

impl CpuOutputProjection {
    fn new(hyperparams: &Hyperparams) -> Self {
        let dim = hyperparams.embedding_size;
        let vocab_size = hyperparams.vocab_size;

        Self {
            embedding_size: dim,
            vocab_size,
            norm_weight: vec![0.0; dim],
            output_weight: vec![0.0; vocab_size * dim],
            input_vector: vec![0.0; dim],
            output_vector: vec![0.0; vocab_size],
            xb: vec![0.0; dim],
        }
    }
}

impl OutputProjectionKernel for CpuOutputProjection {
    fn norm_weight_mut(&mut self) -> &mut [f32] {
        &mut self.norm_weight
    }

    fn output_weight_mut(&mut self) -> &mut [f32] {
        &mut self.output_weight
    }

    fn input_vector_mut(&mut self) -> &mut [f32] {
        &mut self.input_vector
    }

    fn output_vector(&self) -> &[f32] {
        &self.output_vector
    }

    fn output_vector_mut(&mut self) -> &mut [f32] {
        &mut self.output_vector
    }

    fn forward(&mut self) {
        operator::rmsnorm(&mut self.xb, &self.norm_weight, &self.input_vector);
        operator::matmul(
            &mut self.output_vector,
            &self.output_weight,
            &self.xb,
            self.embedding_size,
            self.vocab_size,
        );
    }

    fn compute_softmax(&mut self) {
        operator::softmax(&mut self.output_vector);
    }
}
