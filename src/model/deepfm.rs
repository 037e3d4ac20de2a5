//! DeepFM-style trajectory travel-time model
//!
//! Combines three signals:
//! - Wide: first-order weights over the concatenated one-hot attributes
//! - FM: pairwise interactions of per-field embeddings
//! - Deep: hidden speed states gathered along the trajectory's road segments
//!
//! and predicts a travel time per segment plus the total travel time.

use candle_core::{Result, Tensor};
use candle_nn::{embedding, linear, Embedding, Linear, Module, VarBuilder};

use super::fc::{Activation, FullyConnected};
use super::ModelConfig;

pub struct DeepFM {
    first_order: Linear,
    field_embedding: Embedding,
    segment_projection: FullyConnected,
    segment_deep: FullyConnected,
    segment_output: Linear,
    total_output: FullyConnected,
    trajectory_length: usize,
}

impl DeepFM {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let d = config.emb_size;
        let hidden_width = config.total_length() * d;

        Ok(Self {
            first_order: linear(config.feature_tra, 1, vb.pp("first_order"))?,
            field_embedding: embedding(config.feature_tra, d, vb.pp("field_embed"))?,
            segment_projection: FullyConnected::new(
                hidden_width,
                &[d],
                &[Activation::Relu],
                vb.pp("segment_projection"),
            )?,
            segment_deep: FullyConnected::new(
                2 * d,
                &[d],
                &[Activation::Relu],
                vb.pp("segment_deep"),
            )?,
            segment_output: linear(d, 1, vb.pp("segment_output"))?,
            total_output: FullyConnected::new(
                2 * d,
                &[d, 1],
                &[Activation::Relu, Activation::Linear],
                vb.pp("total_output"),
            )?,
            trajectory_length: config.trajectory_length,
        })
    }

    /// Second-order factorization term `0.5 * ((sum v)^2 - sum v^2)`
    ///
    /// `field_vectors`: `[batch, field_cnt, k]` -> `[batch, k]`
    pub fn interaction(field_vectors: &Tensor) -> Result<Tensor> {
        let square_of_sum = field_vectors.sum(1)?.sqr()?;
        let sum_of_square = field_vectors.sqr()?.sum(1)?;
        (square_of_sum - sum_of_square)? * 0.5
    }

    /// Predict travel times
    ///
    /// - `x`: one-hot attributes `[batch, feature_tra]`
    /// - `feature_inds`: active index per field `[batch, field_cnt]`
    /// - `dropout`: drop rate applied to the deep part, 0.0 disables it
    /// - `hiddens`: `[batch, total_length, trajectory_length, d]`
    ///
    /// Returns `(per_segment [batch, trajectory_length], total [batch, 1])`.
    pub fn inference(
        &self,
        x: &Tensor,
        feature_inds: &Tensor,
        dropout: f64,
        hiddens: &Tensor,
    ) -> Result<(Tensor, Tensor)> {
        let (batch, time, segments, d) = hiddens.dims4()?;
        if segments != self.trajectory_length {
            candle_core::bail!(
                "hidden states carry {} segments, model expects {}",
                segments,
                self.trajectory_length
            );
        }

        let wide = self.first_order.forward(x)?;
        let fm = Self::interaction(&self.field_embedding.forward(feature_inds)?)?;

        // [batch, segments, time * d]
        let per_segment = hiddens
            .permute((0, 2, 1, 3))?
            .contiguous()?
            .reshape((batch, segments, time * d))?;
        let per_segment = self.segment_projection.forward(&per_segment)?;

        let fm_tiled = fm
            .unsqueeze(1)?
            .broadcast_as((batch, segments, d))?
            .contiguous()?;
        let deep = self
            .segment_deep
            .forward(&Tensor::cat(&[&per_segment, &fm_tiled], 2)?)?;
        let deep = if dropout > 0.0 {
            candle_nn::ops::dropout(&deep, dropout as f32)?
        } else {
            deep
        };

        let separate = self.segment_output.forward(&deep)?.squeeze(2)?;

        let pooled = deep.mean(1)?;
        let total = self
            .total_output
            .forward(&Tensor::cat(&[&pooled, &fm], 1)?)?;
        let total = (total + wide)?;

        Ok((separate, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn config() -> ModelConfig {
        ModelConfig {
            site_num: 6,
            emb_size: 8,
            field_cnt: 3,
            feature_s: 1,
            feature_tra: 12,
            input_length: 3,
            output_length: 2,
            trajectory_length: 4,
            num_heads: 2,
            num_blocks: 1,
            dropout: 0.2,
        }
    }

    #[test]
    fn test_interaction_matches_pairwise_sum() -> Result<()> {
        let dev = Device::Cpu;
        // two fields, k = 2: pairwise dot = 1*3 + 2*4 = 11
        let v = Tensor::new(&[[[1f32, 2.0], [3.0, 4.0]]], &dev)?;
        let out: Vec<f32> = DeepFM::interaction(&v)?.sum(1)?.to_vec1()?;
        assert!((out[0] - 11.0).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_deepfm_output_shapes() -> Result<()> {
        let config = config();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = DeepFM::new(&config, vb)?;
        let dev = Device::Cpu;

        let x = Tensor::zeros((2, 12), DType::F32, &dev)?;
        let inds = Tensor::new(&[[0u32, 4, 9], [1, 5, 11]], &dev)?;
        let hiddens = Tensor::randn(0f32, 1f32, (2, 5, 4, 8), &dev)?;

        let (sep, total) = model.inference(&x, &inds, 0.2, &hiddens)?;
        assert_eq!(sep.dims(), &[2, 4]);
        assert_eq!(total.dims(), &[2, 1]);
        Ok(())
    }
}
