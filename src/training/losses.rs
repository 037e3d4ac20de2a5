//! Loss functions for joint training
//!
//! Each task contributes an RMSE over the batch axis, averaged over the
//! remaining axes. The three terms are combined with fixed weights.

use candle_core::{Result, Tensor};

/// Weight of the speed term
pub const SPEED_WEIGHT: f64 = 0.3;
/// Weight of the total travel-time term
pub const TOTAL_TIME_WEIGHT: f64 = 0.4;
/// Weight of the per-segment travel-time term
pub const SEGMENT_TIME_WEIGHT: f64 = 0.3;

/// `mean(sqrt(mean_batch((pred + 1e-10 - label)^2)))`
pub fn rmse_loss(pred: &Tensor, label: &Tensor) -> Result<Tensor> {
    let diff = (pred + 1e-10)?.broadcast_sub(label)?;
    diff.sqr()?.mean(0)?.sqrt()?.mean_all()
}

/// `0.3 * speed + 0.4 * total + 0.3 * segment`
pub fn combine_losses(speed: &Tensor, total: &Tensor, segment: &Tensor) -> Result<Tensor> {
    let weighted_speed = (speed * SPEED_WEIGHT)?;
    let weighted_total = (total * TOTAL_TIME_WEIGHT)?;
    let weighted_segment = (segment * SEGMENT_TIME_WEIGHT)?;
    (weighted_speed + weighted_total)? + weighted_segment
}

/// The three task losses of one step and their weighted sum
pub struct JointLoss {
    pub speed: Tensor,
    pub total_time: Tensor,
    pub segment_time: Tensor,
    pub joint: Tensor,
}

impl JointLoss {
    /// Build every term from predictions and labels
    pub fn compute(
        pred_speed: &Tensor,
        label_speed: &Tensor,
        pred_total: &Tensor,
        label_total: &Tensor,
        pred_segment: &Tensor,
        label_segment: &Tensor,
    ) -> Result<Self> {
        let speed = rmse_loss(pred_speed, label_speed)?;
        let total_time = rmse_loss(pred_total, label_total)?;
        let segment_time = rmse_loss(pred_segment, label_segment)?;
        let joint = combine_losses(&speed, &total_time, &segment_time)?;

        Ok(Self {
            speed,
            total_time,
            segment_time,
            joint,
        })
    }

    /// Scalar value of the joint loss
    pub fn value(&self) -> Result<f64> {
        self.joint.to_dtype(candle_core::DType::F64)?.to_scalar::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::Device;

    fn scalar(t: &Tensor) -> f64 {
        t.to_dtype(candle_core::DType::F64)
            .unwrap()
            .to_scalar::<f64>()
            .unwrap()
    }

    #[test]
    fn test_weights_sum_to_one() {
        assert_relative_eq!(SPEED_WEIGHT + TOTAL_TIME_WEIGHT + SEGMENT_TIME_WEIGHT, 1.0);
    }

    #[test]
    fn test_joint_is_weighted_sum() -> Result<()> {
        let dev = Device::Cpu;
        for (a, b, c) in [(1.0f32, 2.0f32, 3.0f32), (0.0, 0.5, 10.0), (7.25, 0.0, 0.125)] {
            let joint = combine_losses(
                &Tensor::new(a, &dev)?,
                &Tensor::new(b, &dev)?,
                &Tensor::new(c, &dev)?,
            )?;
            let expected = 0.3 * a as f64 + 0.4 * b as f64 + 0.3 * c as f64;
            assert_relative_eq!(scalar(&joint), expected, epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_rmse_averages_per_column() -> Result<()> {
        let dev = Device::Cpu;
        // column 0 errors: 3, 4 -> rmse sqrt(12.5); column 1 errors: 0, 0
        let pred = Tensor::new(&[[3.0f32, 1.0], [4.0, 2.0]], &dev)?;
        let label = Tensor::new(&[[0.0f32, 1.0], [0.0, 2.0]], &dev)?;
        let loss = rmse_loss(&pred, &label)?;
        assert_relative_eq!(scalar(&loss), 12.5f64.sqrt() / 2.0, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn test_joint_loss_compute() -> Result<()> {
        let dev = Device::Cpu;
        let zeros = Tensor::zeros((2, 3), candle_core::DType::F32, &dev)?;
        let ones = Tensor::ones((2, 3), candle_core::DType::F32, &dev)?;
        let twos = (&ones * 2.0)?;

        let loss = JointLoss::compute(&ones, &zeros, &twos, &zeros, &zeros, &zeros)?;
        assert_relative_eq!(scalar(&loss.speed), 1.0, epsilon = 1e-4);
        assert_relative_eq!(scalar(&loss.total_time), 2.0, epsilon = 1e-4);
        assert_relative_eq!(loss.value()?, 0.3 + 0.8, epsilon = 1e-4);
        Ok(())
    }
}
