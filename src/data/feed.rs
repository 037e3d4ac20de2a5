//! Feed construction
//!
//! Reshapes a raw batch into the placeholder layouts and binds every slot.

use candle_core::{Device, Tensor, WithDType};
use ndarray::{Array, Dimension};

use super::batch::RawBatch;
use crate::error::{Error, Result};
use crate::model::{Feed, ModelConfig};

/// Flatten an array and infer its leading axis from `tail`, like a
/// `reshape([-1, tail..])`
fn reshape_leading<T: WithDType, D: Dimension>(
    slot: &'static str,
    values: &Array<T, D>,
    tail: &[usize],
    device: &Device,
) -> Result<Tensor> {
    let row: usize = tail.iter().product();
    if row == 0 || values.len() % row != 0 {
        return Err(Error::ShapeMismatch {
            slot,
            expected: tail.to_vec(),
            actual: values.shape().to_vec(),
        });
    }

    let mut shape = Vec::with_capacity(tail.len() + 1);
    shape.push(values.len() / row);
    shape.extend_from_slice(tail);

    let flat: Vec<T> = values.iter().copied().collect();
    Ok(Tensor::from_vec(flat, shape.as_slice(), device)?)
}

/// Copy an array into a tensor of the same shape
fn array_tensor<T: WithDType, D: Dimension>(values: &Array<T, D>, device: &Device) -> Result<Tensor> {
    let flat: Vec<T> = values.iter().copied().collect();
    Ok(Tensor::from_vec(flat, values.shape(), device)?)
}

/// Builds feeds for one model configuration
pub struct FeedBuilder {
    config: ModelConfig,
    device: Device,
}

impl FeedBuilder {
    pub fn new(config: ModelConfig, device: Device) -> Self {
        Self { config, device }
    }

    /// Site indices `[1, site_num]`
    fn position(&self) -> Result<Tensor> {
        let n = self.config.site_num;
        Ok(Tensor::arange(0u32, n as u32, &self.device)?.reshape((1, n))?)
    }

    /// Bind every slot from a raw batch; dropout starts at 0.0
    pub fn build(&self, raw: &RawBatch) -> Result<Feed> {
        let c = &self.config;
        let dev = &self.device;
        let speed_tail = [c.input_length, c.site_num, c.feature_s];
        let site_tail = [c.site_num];

        let x_tra = raw.trajectory.concatenate()?;

        Ok(Feed {
            position: self.position()?,
            week: reshape_leading("week", &raw.week, &site_tail, dev)?,
            day: reshape_leading("day", &raw.day, &site_tail, dev)?,
            hour: reshape_leading("hour", &raw.hour, &site_tail, dev)?,
            minute: reshape_leading("minute", &raw.minute, &site_tail, dev)?,
            feature_s: reshape_leading("feature_s", &raw.x_s, &speed_tail, dev)?,
            label_s: array_tensor(&raw.label_s, dev)?,
            feature_tra: array_tensor(&x_tra, dev)?,
            label_tra: array_tensor(&raw.separate_trajectory_time, dev)?,
            label_tra_sum: array_tensor(&raw.total_time, dev)?,
            feature_inds: array_tensor(&raw.element_index, dev)?,
            trajectory_inds: array_tensor(&raw.trajectory_inds, dev)?,
            dropout: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn test_reshape_leading_infers_batch() {
        let values = ArrayD::<f32>::zeros(IxDyn(&[2 * 3 * 4 * 1]));
        let t = reshape_leading("feature_s", &values, &[3, 4, 1], &Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[2, 3, 4, 1]);
    }

    #[test]
    fn test_reshape_leading_rejects_remainder() {
        let values = ArrayD::<u32>::zeros(IxDyn(&[7]));
        let err = reshape_leading("hour", &values, &[3], &Device::Cpu).unwrap_err();
        assert!(err.is_shape_error());
    }
}
