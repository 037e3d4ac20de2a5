//! Training module
//!
//! This module provides:
//! - Joint RMSE losses with fixed task weights
//! - Regression metrics for validation
//! - Checkpoint persistence
//! - The training and evaluation loop

mod checkpoint;
mod losses;
mod metrics;
mod trainer;

pub use checkpoint::{
    restore_checkpoint, save_checkpoint, weights_path, CheckpointMeta, METADATA_FILE, WEIGHTS_FILE,
};
pub use losses::{
    combine_losses, rmse_loss, JointLoss, SEGMENT_TIME_WEIGHT, SPEED_WEIGHT, TOTAL_TIME_WEIGHT,
};
pub use metrics::RegressionMetrics;
pub use trainer::{BestTracker, EvaluationReport, Trainer, TrainingConfig, TrainingSummary};
