//! Model module for multi-task speed and travel-time prediction
//!
//! This module provides the network components:
//! - Placeholders describing every input slot of a step
//! - Fully-connected stacks and attention primitives
//! - Embedding composer and spatio-temporal embedding
//! - Spatio-temporal encoder, bridge transformer and inference head
//! - DeepFM-style trajectory feature-cross model
//! - The assembled `MultiTaskModel`

mod attention;
mod bridge;
mod deepfm;
mod embedding;
mod fc;
mod inference;
mod network;
mod placeholders;
mod st_block;

pub use attention::{scaled_dot_product_attention, MultiHeadAttention};
pub use bridge::BridgeTransformer;
pub use deepfm::DeepFM;
pub use embedding::{EmbeddingComposer, SpeedEmbeddings, STEmbedding, TimeVocab};
pub use fc::{Activation, FullyConnected};
pub use inference::InferenceHead;
pub use network::{ModelOutput, MultiTaskModel};
pub use placeholders::{Feed, Placeholders, SlotDType, SlotShape, SlotSpec};
pub use st_block::{GatedFusion, STAttBlock, STBlock};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Network hyper-parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of road sites
    pub site_num: usize,
    /// Hidden embedding size
    pub emb_size: usize,
    /// Number of one-hot trajectory fields
    pub field_cnt: usize,
    /// Number of speed features per site and timestep
    pub feature_s: usize,
    /// Width of the concatenated one-hot trajectory vector
    pub feature_tra: usize,
    /// Input length of speed data
    pub input_length: usize,
    /// Output length of speed data
    pub output_length: usize,
    /// Number of road segments on a trajectory
    pub trajectory_length: usize,
    /// Attention heads in the encoder and bridge
    pub num_heads: usize,
    /// Stacked spatio-temporal attention blocks
    pub num_blocks: usize,
    /// Dropout rate fed to the trajectory model while training
    pub dropout: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            site_num: 108,
            emb_size: 64,
            field_cnt: 9,
            feature_s: 1,
            feature_tra: 278,
            input_length: 12,
            output_length: 12,
            trajectory_length: 5,
            num_heads: 8,
            num_blocks: 1,
            dropout: 0.3,
        }
    }
}

impl ModelConfig {
    /// Total number of timesteps covered by the time placeholders
    pub fn total_length(&self) -> usize {
        self.input_length + self.output_length
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_heads == 0 || self.emb_size % self.num_heads != 0 {
            return Err(Error::InvalidConfig(format!(
                "emb_size ({}) must be divisible by num_heads ({})",
                self.emb_size, self.num_heads
            )));
        }
        let positive = [
            ("site_num", self.site_num),
            ("field_cnt", self.field_cnt),
            ("feature_s", self.feature_s),
            ("feature_tra", self.feature_tra),
            ("input_length", self.input_length),
            ("output_length", self.output_length),
            ("trajectory_length", self.trajectory_length),
            ("num_blocks", self.num_blocks),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(Error::InvalidConfig(format!("{} must be greater than 0", name)));
        }
        if self.feature_tra < self.field_cnt {
            return Err(Error::InvalidConfig(format!(
                "feature_tra ({}) cannot be narrower than field_cnt ({})",
                self.feature_tra, self.field_cnt
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::InvalidConfig(format!(
                "dropout ({}) must be in [0, 1)",
                self.dropout
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ModelConfig::default();
        assert_eq!(config.total_length(), 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ModelConfig::default();
        config.emb_size = 63;
        assert!(config.validate().is_err());

        config = ModelConfig::default();
        config.trajectory_length = 0;
        assert!(config.validate().is_err());

        config = ModelConfig::default();
        config.dropout = 1.0;
        assert!(config.validate().is_err());

        config = ModelConfig::default();
        config.feature_tra = 3;
        assert!(config.validate().is_err());
    }
}
