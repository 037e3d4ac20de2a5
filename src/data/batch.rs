//! Raw batches as handed over by a batch source
//!
//! Field order follows the source contract: speed features, week, day, hour,
//! minute, speed labels, the nine trajectory attribute blocks, element index,
//! separate trajectory time, total time, trajectory indices, dates.

use ndarray::{concatenate, Array1, Array2, Array3, ArrayD, Axis};

use crate::error::Result;

/// One-hot trajectory attributes, each `[batch, width]`
#[derive(Debug, Clone)]
pub struct TrajectoryAttributes {
    pub vehicle_id: Array2<f32>,
    pub vehicle_type: Array2<f32>,
    pub start_week: Array2<f32>,
    pub start_day: Array2<f32>,
    pub start_hour: Array2<f32>,
    pub start_minute: Array2<f32>,
    pub start_second: Array2<f32>,
    pub distances: Array2<f32>,
    pub route_id: Array2<f32>,
}

impl TrajectoryAttributes {
    /// Number of attribute fields
    pub const FIELD_COUNT: usize = 9;

    /// Blocks in concatenation order
    pub fn fields(&self) -> [&Array2<f32>; Self::FIELD_COUNT] {
        [
            &self.vehicle_id,
            &self.vehicle_type,
            &self.start_week,
            &self.start_day,
            &self.start_hour,
            &self.start_minute,
            &self.start_second,
            &self.distances,
            &self.route_id,
        ]
    }

    /// Concatenate all blocks along the feature axis
    pub fn concatenate(&self) -> Result<Array2<f32>> {
        one_hot_concatenation(&self.fields())
    }
}

/// Concatenate one-hot blocks `[batch, width_i]` into `[batch, sum(width_i)]`
pub fn one_hot_concatenation(features: &[&Array2<f32>]) -> Result<Array2<f32>> {
    let views: Vec<_> = features.iter().map(|f| f.view()).collect();
    Ok(concatenate(Axis(1), &views)?)
}

/// Batch tuple produced by a source
#[derive(Debug, Clone)]
pub struct RawBatch {
    /// Speed features, `batch * input_length * site_num * feature_s` values
    pub x_s: ArrayD<f32>,
    /// Time fields, `batch * (input_length + output_length) * site_num` values each
    pub week: ArrayD<u32>,
    pub day: ArrayD<u32>,
    pub hour: ArrayD<u32>,
    pub minute: ArrayD<u32>,
    /// Speed labels `[batch, site_num, output_length]`
    pub label_s: Array3<f32>,
    pub trajectory: TrajectoryAttributes,
    /// Active one-hot column per field `[batch, field_cnt]`
    pub element_index: Array2<u32>,
    /// Travel time per segment in minutes `[batch, trajectory_length]`
    pub separate_trajectory_time: Array2<f32>,
    /// Total travel time in minutes `[batch, 1]`
    pub total_time: Array2<f32>,
    /// Site index of each trajectory segment `[trajectory_length]`
    pub trajectory_inds: Array1<u32>,
    /// Departure timestamp of each sample
    pub dates: Vec<String>,
}

impl RawBatch {
    /// Number of samples, taken from the speed labels
    pub fn len(&self) -> usize {
        self.label_s.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_one_hot_concatenation() {
        let a = array![[1.0f32, 0.0], [0.0, 1.0]];
        let b = array![[0.0f32, 0.0, 1.0], [1.0, 0.0, 0.0]];
        let out = one_hot_concatenation(&[&a, &b]).unwrap();

        assert_eq!(out.dim(), (2, 5));
        assert_eq!(out.row(0).to_vec(), vec![1.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(out.row(1).to_vec(), vec![0.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_concatenation_rejects_ragged_batches() {
        let a = array![[1.0f32, 0.0]];
        let b = array![[0.0f32], [1.0]];
        assert!(one_hot_concatenation(&[&a, &b]).is_err());
    }
}
