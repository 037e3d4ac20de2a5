//! # Multi-task road speed and trajectory travel-time prediction
//!
//! This crate trains one network that jointly forecasts road-site speeds and
//! the travel time of vehicle trajectories over those sites.
//!
//! ## Modules
//!
//! - `data`: Raw batch contract, normalization bounds, feed construction, synthetic source
//! - `model`: Placeholders, embeddings, spatio-temporal encoder, bridge, inference head, DeepFM
//! - `training`: Joint loss, metrics, checkpoints and the train/evaluate loop
//! - `utils`: Configuration and logging
//!
//! ## Example
//!
//! ```no_run
//! use candle_core::Device;
//! use speed_trajectory_mtl::{Config, SyntheticConfig, SyntheticSource, Trainer};
//!
//! fn main() -> speed_trajectory_mtl::Result<()> {
//!     let config = Config::default();
//!     let source = SyntheticSource::new(SyntheticConfig::for_model(&config.model, 2_000));
//!
//!     let mut trainer = Trainer::new(config.model.clone(), config.training.clone(), Device::Cpu)?;
//!     let summary = trainer.run_epoch(&source)?;
//!     println!("best MAE: {:?}", summary.best_mae);
//!     Ok(())
//! }
//! ```

pub mod data;
pub mod error;
pub mod model;
pub mod training;
pub mod utils;

// Re-export main types for convenience
pub use data::{BatchSource, FeedBuilder, NormBounds, RawBatch, SyntheticConfig, SyntheticSource};
pub use error::{Error, Result};
pub use model::{Feed, ModelConfig, ModelOutput, MultiTaskModel, Placeholders};
pub use training::{EvaluationReport, RegressionMetrics, Trainer, TrainingConfig, TrainingSummary};
pub use utils::{setup_logging, Config};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
