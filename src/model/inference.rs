//! Speed inference head

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;

use super::fc::{Activation, FullyConnected};

/// Regression head mapping bridged states to per-site speeds
pub struct InferenceHead {
    regression: FullyConnected,
}

impl InferenceHead {
    pub fn new(d_model: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            regression: FullyConnected::new(
                d_model,
                &[d_model, 1],
                &[Activation::Relu, Activation::Linear],
                vb.pp("regression"),
            )?,
        })
    }

    /// `[batch, output_length, sites, d]` -> `[batch, sites, output_length]`
    pub fn inference(&self, out_hiddens: &Tensor) -> Result<Tensor> {
        self.regression
            .forward(out_hiddens)?
            .squeeze(3)?
            .transpose(1, 2)?
            .contiguous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_inference_layout() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let head = InferenceHead::new(8, vb)?;

        let hidden = Tensor::randn(0f32, 1f32, (2, 4, 5, 8), &Device::Cpu)?;
        assert_eq!(head.inference(&hidden)?.dims(), &[2, 5, 4]);
        Ok(())
    }
}
