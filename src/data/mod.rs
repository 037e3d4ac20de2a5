//! Data module
//!
//! Provides the raw batch contract, speed normalization bounds, feed
//! construction and a deterministic synthetic source.

pub mod batch;
pub mod feed;
pub mod normalize;
pub mod source;
pub mod synthetic;

pub use batch::{one_hot_concatenation, RawBatch, TrajectoryAttributes};
pub use feed::FeedBuilder;
pub use normalize::NormBounds;
pub use source::{BatchIter, BatchSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};
