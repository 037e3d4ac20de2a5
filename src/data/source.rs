//! Batch source contract
//!
//! The data pipeline is external; the trainer only relies on this trait.

use super::batch::RawBatch;
use super::normalize::NormBounds;
use crate::error::Result;

/// Owned iterator over raw batches
pub type BatchIter = Box<dyn Iterator<Item = Result<RawBatch>> + Send>;

/// Supplier of training and held-out batches
pub trait BatchSource {
    /// Iterate batches of `batch_size` samples
    ///
    /// Training iteration cycles the training split `epoch` times; held-out
    /// iteration walks the remaining split once.
    fn next_batch(&self, batch_size: usize, epoch: usize, is_training: bool) -> Result<BatchIter>;

    /// Total number of trajectories across both splits
    fn num_trajectories(&self) -> usize;

    /// Bounds used to normalize speeds
    fn speed_bounds(&self) -> NormBounds;
}
