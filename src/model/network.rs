//! Multi-task network
//!
//! Wires the speed branch (`speed_model` scope) and the trajectory branch
//! (`trajectory_model` scope) into one forward pass over a validated feed.

use candle_core::Tensor;
use candle_nn::VarBuilder;
use tracing::debug;

use super::bridge::BridgeTransformer;
use super::deepfm::DeepFM;
use super::embedding::{EmbeddingComposer, STEmbedding};
use super::fc::{Activation, FullyConnected};
use super::inference::InferenceHead;
use super::placeholders::{Feed, Placeholders};
use super::st_block::STBlock;
use super::ModelConfig;
use crate::error::Result;

/// Predictions of one forward pass
pub struct ModelOutput {
    /// Speed `[batch, site_num, output_length]`
    pub speed: Tensor,
    /// Travel time per segment `[batch, trajectory_length]`
    pub separate: Tensor,
    /// Total travel time `[batch, 1]`
    pub total: Tensor,
}

/// Joint speed and travel-time model
pub struct MultiTaskModel {
    config: ModelConfig,
    placeholders: Placeholders,
    composer: EmbeddingComposer,
    speed_projection: FullyConnected,
    st_embedding: STEmbedding,
    st_block: STBlock,
    bridge: BridgeTransformer,
    inference: InferenceHead,
    deepfm: DeepFM,
}

impl MultiTaskModel {
    /// Build every layer, registering variables in `vb`
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let d = config.emb_size;

        let composer =
            EmbeddingComposer::new(config.site_num, d, config.total_length(), vb.pp("embedding"))?;

        let speed_vb = vb.pp("speed_model");
        let speed_projection = FullyConnected::new(
            config.feature_s,
            &[d, d],
            &[Activation::Relu, Activation::Linear],
            speed_vb.pp("speed_fc"),
        )?;
        let st_embedding = STEmbedding::new(d, speed_vb.pp("st_embedding"))?;
        let st_block = STBlock::new(d, config.num_heads, config.num_blocks, speed_vb.pp("st_block"))?;
        let bridge = BridgeTransformer::new(d, config.num_heads, speed_vb.pp("bridge"))?;
        let inference = InferenceHead::new(d, speed_vb.pp("inference"))?;

        let deepfm = DeepFM::new(config, vb.pp("trajectory_model"))?;

        Ok(Self {
            config: config.clone(),
            placeholders: Placeholders::new(config),
            composer,
            speed_projection,
            st_embedding,
            st_block,
            bridge,
            inference,
            deepfm,
        })
    }

    /// Model configuration
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Input slot declarations
    pub fn placeholders(&self) -> &Placeholders {
        &self.placeholders
    }

    /// Forward pass over a feed
    ///
    /// The feed is validated against the placeholders first; any slot that
    /// disagrees is reported before touching the network.
    pub fn forward(&self, feed: &Feed) -> Result<ModelOutput> {
        let total_length = self.config.total_length();
        feed.validate(&self.placeholders, total_length)?;
        let batch = feed.batch_size()?;
        let (input_length, output_length) = (self.config.input_length, self.config.output_length);

        let embeddings = self.composer.forward(
            &feed.position,
            &feed.week,
            &feed.day,
            &feed.hour,
            &feed.minute,
            batch,
        )?;
        let ste = self.st_embedding.forward(&embeddings)?;
        let ste_input = ste.narrow(1, 0, input_length)?.contiguous()?;
        let ste_output = ste.narrow(1, input_length, output_length)?.contiguous()?;

        let speed = self.speed_projection.forward(&feed.feature_s)?;
        let encoder_outs = self.st_block.spatio_temporal(&speed, &ste_input)?;
        debug!("ST block outs shape: {:?}", encoder_outs.dims());

        let bridge_outs = self.bridge.encoder(&encoder_outs, &encoder_outs, &ste_output)?;
        debug!("Bridge outs shape: {:?}", bridge_outs.dims());

        // [batch, total_length, trajectory_length, d]
        let hidden_states = Tensor::cat(&[&encoder_outs, &bridge_outs], 1)?
            .index_select(&feed.trajectory_inds, 2)?;

        let speed = self.inference.inference(&bridge_outs)?;
        debug!("Inference outs shape: {:?}", speed.dims());

        let (separate, total) = self.deepfm.inference(
            &feed.feature_tra,
            &feed.feature_inds,
            feed.dropout,
            &hidden_states,
        )?;

        Ok(ModelOutput {
            speed,
            separate,
            total,
        })
    }
}
