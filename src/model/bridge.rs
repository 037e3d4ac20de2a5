//! Bridge transformer
//!
//! Moves encoder states from the input horizon onto the forecast horizon:
//! future ST embeddings query, per site, the historical states.

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;

use super::attention::MultiHeadAttention;
use super::fc::{Activation, FullyConnected};

pub struct BridgeTransformer {
    attention: MultiHeadAttention,
    projection: FullyConnected,
}

impl BridgeTransformer {
    pub fn new(d_model: usize, n_heads: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            attention: MultiHeadAttention::new(d_model, d_model, n_heads, vb.pp("attention"))?,
            projection: FullyConnected::new(
                d_model,
                &[d_model, d_model],
                &[Activation::Relu, Activation::Linear],
                vb.pp("projection"),
            )?,
        })
    }

    /// `[batch, time, sites, d]` -> `[batch * sites, time, d]`
    fn per_site(x: &Tensor) -> Result<Tensor> {
        let (batch, time, sites, d) = x.dims4()?;
        x.permute((0, 2, 1, 3))?
            .contiguous()?
            .reshape((batch * sites, time, d))
    }

    /// Cross-attention from the forecast horizon to the input horizon
    ///
    /// - `x`: values `[batch, input_length, sites, d]`
    /// - `x_p`: keys `[batch, input_length, sites, d]`
    /// - `x_q`: queries `[batch, output_length, sites, d]`
    ///
    /// Output shape: `[batch, output_length, sites, d]`
    pub fn encoder(&self, x: &Tensor, x_p: &Tensor, x_q: &Tensor) -> Result<Tensor> {
        let (batch, out_len, sites, d) = x_q.dims4()?;

        let context = self.attention.forward(
            &Self::per_site(x_q)?,
            &Self::per_site(x_p)?,
            &Self::per_site(x)?,
        )?;

        let context = context
            .reshape((batch, sites, out_len, d))?
            .permute((0, 2, 1, 3))?
            .contiguous()?;

        self.projection.forward(&context)
    }
}
