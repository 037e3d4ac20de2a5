//! Spatio-temporal speed encoder
//!
//! Each block attends across sites (spatial) and across timesteps (temporal)
//! with the ST embedding appended to the state, fuses both views with a
//! learned gate and adds the result back onto the input.

use candle_core::{Result, Tensor};
use candle_nn::{linear, linear_no_bias, Linear, Module, VarBuilder};

use super::attention::MultiHeadAttention;
use super::fc::{Activation, FullyConnected};

/// Gate between spatial and temporal views
pub struct GatedFusion {
    spatial_gate: Linear,
    temporal_gate: Linear,
    projection: FullyConnected,
}

impl GatedFusion {
    pub fn new(d_model: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            spatial_gate: linear_no_bias(d_model, d_model, vb.pp("spatial_gate"))?,
            temporal_gate: linear(d_model, d_model, vb.pp("temporal_gate"))?,
            projection: FullyConnected::new(
                d_model,
                &[d_model, d_model],
                &[Activation::Relu, Activation::Linear],
                vb.pp("projection"),
            )?,
        })
    }

    /// `z * hs + (1 - z) * ht`, then projected
    pub fn forward(&self, hs: &Tensor, ht: &Tensor) -> Result<Tensor> {
        let gate = (self.spatial_gate.forward(hs)? + self.temporal_gate.forward(ht)?)?;
        let z = candle_nn::ops::sigmoid(&gate)?;
        let fused = ((&z * hs)? + (z.affine(-1.0, 1.0)? * ht)?)?;
        self.projection.forward(&fused)
    }
}

/// One spatio-temporal attention block
pub struct STAttBlock {
    spatial: MultiHeadAttention,
    temporal: MultiHeadAttention,
    fusion: GatedFusion,
}

impl STAttBlock {
    pub fn new(d_model: usize, n_heads: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            spatial: MultiHeadAttention::new(2 * d_model, d_model, n_heads, vb.pp("spatial"))?,
            temporal: MultiHeadAttention::new(2 * d_model, d_model, n_heads, vb.pp("temporal"))?,
            fusion: GatedFusion::new(d_model, vb.pp("fusion"))?,
        })
    }

    /// Input shapes: `x` and `ste` `[batch, time, sites, d_model]`
    /// Output shape: `[batch, time, sites, d_model]`
    pub fn forward(&self, x: &Tensor, ste: &Tensor) -> Result<Tensor> {
        let (batch, time, sites, d_model) = x.dims4()?;
        let h = Tensor::cat(&[x, ste], 3)?;
        let width = 2 * d_model;

        // Across sites within each timestep
        let hs = h.reshape((batch * time, sites, width))?;
        let hs = self
            .spatial
            .forward(&hs, &hs, &hs)?
            .reshape((batch, time, sites, d_model))?;

        // Across timesteps within each site
        let ht = h
            .permute((0, 2, 1, 3))?
            .contiguous()?
            .reshape((batch * sites, time, width))?;
        let ht = self
            .temporal
            .forward(&ht, &ht, &ht)?
            .reshape((batch, sites, time, d_model))?
            .permute((0, 2, 1, 3))?
            .contiguous()?;

        x + self.fusion.forward(&hs, &ht)?
    }
}

/// Stack of spatio-temporal attention blocks
pub struct STBlock {
    blocks: Vec<STAttBlock>,
}

impl STBlock {
    pub fn new(d_model: usize, n_heads: usize, num_blocks: usize, vb: VarBuilder) -> Result<Self> {
        let blocks = (0..num_blocks)
            .map(|i| STAttBlock::new(d_model, n_heads, vb.pp(format!("block_{}", i))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { blocks })
    }

    /// Encode the input horizon
    ///
    /// `speed` is the projected speed features and `ste` the ST embedding
    /// restricted to the input horizon; both `[batch, input_length, sites, d_model]`.
    pub fn spatio_temporal(&self, speed: &Tensor, ste: &Tensor) -> Result<Tensor> {
        let mut x = speed.clone();
        for block in &self.blocks {
            x = block.forward(&x, ste)?;
        }
        Ok(x)
    }
}
