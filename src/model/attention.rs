//! Attention primitives
//!
//! Implements:
//! - Scaled dot-product attention
//! - Multi-head attention with independent query and key lengths

use candle_core::{Result, Tensor, D};
use candle_nn::{linear, Linear, Module, VarBuilder};

/// Scaled dot-product attention
///
/// Shapes: query `[g, h, tq, dk]`, key/value `[g, h, tk, dk]`.
/// Returns the context `[g, h, tq, dk]` and weights `[g, h, tq, tk]`.
pub fn scaled_dot_product_attention(
    query: &Tensor,
    key: &Tensor,
    value: &Tensor,
) -> Result<(Tensor, Tensor)> {
    let d_k = query.dim(D::Minus1)? as f64;
    let scale = 1.0 / d_k.sqrt();

    // Q @ K^T / sqrt(d_k)
    let scores = query.matmul(&key.transpose(D::Minus2, D::Minus1)?.contiguous()?)?;
    let scores = (scores * scale)?;

    let attention_weights = candle_nn::ops::softmax_last_dim(&scores)?;
    let output = attention_weights.matmul(value)?;

    Ok((output, attention_weights))
}

/// Multi-head attention
///
/// Queries, keys and values are projected from `input_dim` to `d_model` with
/// ReLU, split into heads, attended and projected back to `d_model`.
pub struct MultiHeadAttention {
    query_proj: Linear,
    key_proj: Linear,
    value_proj: Linear,
    output_proj: Linear,
    n_heads: usize,
    head_dim: usize,
}

impl MultiHeadAttention {
    /// Create a new multi-head attention layer
    pub fn new(input_dim: usize, d_model: usize, n_heads: usize, vb: VarBuilder) -> Result<Self> {
        if n_heads == 0 || d_model % n_heads != 0 {
            candle_core::bail!("d_model ({}) must be divisible by n_heads ({})", d_model, n_heads);
        }

        Ok(Self {
            query_proj: linear(input_dim, d_model, vb.pp("query"))?,
            key_proj: linear(input_dim, d_model, vb.pp("key"))?,
            value_proj: linear(input_dim, d_model, vb.pp("value"))?,
            output_proj: linear(d_model, d_model, vb.pp("output"))?,
            n_heads,
            head_dim: d_model / n_heads,
        })
    }

    /// Split `[g, t, d_model]` into `[g, heads, t, head_dim]`
    fn split_heads(&self, x: &Tensor) -> Result<Tensor> {
        let (groups, len, _) = x.dims3()?;
        x.reshape((groups, len, self.n_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }

    /// Forward pass
    ///
    /// Input shapes: query `[g, tq, input_dim]`, key/value `[g, tk, input_dim]`.
    /// Output shape: `[g, tq, d_model]`.
    pub fn forward(&self, query: &Tensor, key: &Tensor, value: &Tensor) -> Result<Tensor> {
        let (groups, q_len, _) = query.dims3()?;

        let q = self.split_heads(&self.query_proj.forward(query)?.relu()?)?;
        let k = self.split_heads(&self.key_proj.forward(key)?.relu()?)?;
        let v = self.split_heads(&self.value_proj.forward(value)?.relu()?)?;

        let (context, _) = scaled_dot_product_attention(&q, &k, &v)?;

        // [g, heads, tq, head_dim] -> [g, tq, d_model]
        let context = context
            .transpose(1, 2)?
            .contiguous()?
            .reshape((groups, q_len, self.n_heads * self.head_dim))?;

        self.output_proj.forward(&context)
    }
}
