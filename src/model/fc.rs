//! Fully-connected stacks
//!
//! A stack applies `activation(x @ W + b)` per layer on the last axis, so it
//! works on any `[.., features]` tensor of rank up to four.

use candle_core::{Result, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};
use serde::{Deserialize, Serialize};

/// Activation applied after a dense layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// max(0, x)
    Relu,
    /// 1 / (1 + exp(-x))
    Sigmoid,
    /// Identity
    Linear,
}

impl Activation {
    fn apply(self, x: &Tensor) -> Result<Tensor> {
        match self {
            Activation::Relu => x.relu(),
            Activation::Sigmoid => candle_nn::ops::sigmoid(x),
            Activation::Linear => Ok(x.clone()),
        }
    }
}

/// Stack of dense layers
pub struct FullyConnected {
    layers: Vec<(Linear, Activation)>,
}

impl FullyConnected {
    /// Create a stack mapping `input_dim` through `units`
    ///
    /// `units` and `activations` must have the same length.
    pub fn new(
        input_dim: usize,
        units: &[usize],
        activations: &[Activation],
        vb: VarBuilder,
    ) -> Result<Self> {
        if units.len() != activations.len() || units.is_empty() {
            candle_core::bail!(
                "fully connected stack needs one activation per layer ({} units, {} activations)",
                units.len(),
                activations.len()
            );
        }

        let mut layers = Vec::with_capacity(units.len());
        let mut in_dim = input_dim;
        for (i, (&out_dim, &activation)) in units.iter().zip(activations).enumerate() {
            let layer = linear(in_dim, out_dim, vb.pp(format!("layer_{}", i)))?;
            layers.push((layer, activation));
            in_dim = out_dim;
        }

        Ok(Self { layers })
    }

    /// Output width of the stack
    pub fn output_dim(&self) -> usize {
        self.layers
            .last()
            .map(|(l, _)| l.weight().dim(0).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Forward pass
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mut out = x.clone();
        for (layer, activation) in &self.layers {
            out = activation.apply(&layer.forward(&out)?)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_fc_on_4d_input() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let fc = FullyConnected::new(3, &[16, 8], &[Activation::Relu, Activation::Linear], vb)?;

        let x = Tensor::randn(0f32, 1f32, (2, 4, 5, 3), &Device::Cpu)?;
        let out = fc.forward(&x)?;

        assert_eq!(out.dims(), &[2, 4, 5, 8]);
        assert_eq!(fc.output_dim(), 8);
        Ok(())
    }

    #[test]
    fn test_fc_rejects_mismatched_activations() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        assert!(FullyConnected::new(3, &[16, 8], &[Activation::Relu], vb).is_err());
    }
}
