//! Input slots of a training or evaluation step
//!
//! `Placeholders` declares every slot the network reads (dtype, shape with a
//! free batch axis, vocabulary bound for index slots). A `Feed` binds one
//! tensor per slot and is checked against the declarations before it reaches
//! the network.

use candle_core::{DType, Tensor};

use super::embedding::TimeVocab;
use super::ModelConfig;
use crate::error::{Error, Result};

/// Element type of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDType {
    /// Integer indices
    Index,
    /// Continuous values
    Float,
}

impl SlotDType {
    fn dtype(self) -> DType {
        match self {
            SlotDType::Index => DType::U32,
            SlotDType::Float => DType::F32,
        }
    }
}

/// One axis of a slot shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotShape {
    /// Any length (the batch axis)
    Free,
    /// Exactly this length
    Fixed(usize),
}

/// Declaration of one input slot
#[derive(Debug, Clone)]
pub struct SlotSpec {
    pub name: &'static str,
    pub dtype: SlotDType,
    pub shape: Vec<SlotShape>,
    /// Exclusive upper bound for index slots
    pub vocab: Option<usize>,
}

impl SlotSpec {
    fn new(name: &'static str, dtype: SlotDType, shape: Vec<SlotShape>) -> Self {
        Self {
            name,
            dtype,
            shape,
            vocab: None,
        }
    }

    fn with_vocab(mut self, vocab: usize) -> Self {
        self.vocab = Some(vocab);
        self
    }

    /// Whether `dims` satisfies the declared rank and fixed axes
    pub fn matches(&self, dims: &[usize]) -> bool {
        dims.len() == self.shape.len()
            && self.shape.iter().zip(dims).all(|(s, &d)| match s {
                SlotShape::Free => true,
                SlotShape::Fixed(n) => *n == d,
            })
    }

    /// Declared shape with free axes reported as 0
    pub fn expected_dims(&self) -> Vec<usize> {
        self.shape
            .iter()
            .map(|s| match s {
                SlotShape::Free => 0,
                SlotShape::Fixed(n) => *n,
            })
            .collect()
    }

    /// Check a bound tensor against this declaration
    pub fn check(&self, tensor: &Tensor) -> Result<()> {
        if tensor.dtype() != self.dtype.dtype() || !self.matches(tensor.dims()) {
            return Err(Error::ShapeMismatch {
                slot: self.name,
                expected: self.expected_dims(),
                actual: tensor.dims().to_vec(),
            });
        }

        if let Some(vocab) = self.vocab {
            let indices = tensor.flatten_all()?.to_vec1::<u32>()?;
            if let Some(&index) = indices.iter().find(|&&i| i as usize >= vocab) {
                return Err(Error::IndexOutOfRange {
                    field: self.name,
                    index,
                    vocab,
                });
            }
        }
        Ok(())
    }
}

/// All input slots of the network
#[derive(Debug, Clone)]
pub struct Placeholders {
    pub position: SlotSpec,
    pub week: SlotSpec,
    pub day: SlotSpec,
    pub hour: SlotSpec,
    pub minute: SlotSpec,
    pub feature_s: SlotSpec,
    pub label_s: SlotSpec,
    pub feature_tra: SlotSpec,
    pub label_tra: SlotSpec,
    pub label_tra_sum: SlotSpec,
    pub feature_inds: SlotSpec,
    pub trajectory_inds: SlotSpec,
}

impl Placeholders {
    /// Declare the slots for a configuration
    pub fn new(config: &ModelConfig) -> Self {
        use SlotDType::{Float, Index};
        use SlotShape::{Fixed, Free};

        let n = config.site_num;
        let time_slot = |name, vocab| SlotSpec::new(name, Index, vec![Free, Fixed(n)]).with_vocab(vocab);

        Self {
            position: SlotSpec::new("position", Index, vec![Fixed(1), Fixed(n)]).with_vocab(n),
            week: time_slot("week", TimeVocab::WEEK),
            day: time_slot("day", TimeVocab::DAY),
            hour: time_slot("hour", TimeVocab::HOUR),
            minute: time_slot("minute", TimeVocab::MINUTE),
            feature_s: SlotSpec::new(
                "feature_s",
                Float,
                vec![Free, Fixed(config.input_length), Fixed(n), Fixed(config.feature_s)],
            ),
            label_s: SlotSpec::new(
                "label_s",
                Float,
                vec![Free, Fixed(n), Fixed(config.output_length)],
            ),
            feature_tra: SlotSpec::new("feature_tra", Float, vec![Free, Fixed(config.feature_tra)]),
            label_tra: SlotSpec::new(
                "label_tra",
                Float,
                vec![Free, Fixed(config.trajectory_length)],
            ),
            label_tra_sum: SlotSpec::new("label_tra_sum", Float, vec![Free, Fixed(1)]),
            feature_inds: SlotSpec::new("feature_inds", Index, vec![Free, Fixed(config.field_cnt)])
                .with_vocab(config.feature_tra),
            trajectory_inds: SlotSpec::new(
                "trajectory_inds",
                Index,
                vec![Fixed(config.trajectory_length)],
            )
            .with_vocab(n),
        }
    }

    /// Slots in declaration order
    pub fn slots(&self) -> [&SlotSpec; 12] {
        [
            &self.position,
            &self.week,
            &self.day,
            &self.hour,
            &self.minute,
            &self.feature_s,
            &self.label_s,
            &self.feature_tra,
            &self.label_tra,
            &self.label_tra_sum,
            &self.feature_inds,
            &self.trajectory_inds,
        ]
    }
}

/// One fully bound step input
#[derive(Debug, Clone)]
pub struct Feed {
    pub position: Tensor,
    pub week: Tensor,
    pub day: Tensor,
    pub hour: Tensor,
    pub minute: Tensor,
    pub feature_s: Tensor,
    pub label_s: Tensor,
    pub feature_tra: Tensor,
    pub label_tra: Tensor,
    pub label_tra_sum: Tensor,
    pub feature_inds: Tensor,
    pub trajectory_inds: Tensor,
    /// Dropout rate for the trajectory model, 0.0 at evaluation
    pub dropout: f64,
}

impl Feed {
    /// Replace the dropout rate
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Batch size carried by the speed features
    pub fn batch_size(&self) -> Result<usize> {
        Ok(self.feature_s.dim(0)?)
    }

    fn bound(&self) -> [&Tensor; 12] {
        [
            &self.position,
            &self.week,
            &self.day,
            &self.hour,
            &self.minute,
            &self.feature_s,
            &self.label_s,
            &self.feature_tra,
            &self.label_tra,
            &self.label_tra_sum,
            &self.feature_inds,
            &self.trajectory_inds,
        ]
    }

    /// Check every slot, then the batch axes against each other
    pub fn validate(&self, placeholders: &Placeholders, total_length: usize) -> Result<()> {
        for (spec, tensor) in placeholders.slots().iter().zip(self.bound()) {
            spec.check(tensor)?;
        }

        let batch = self.batch_size()?;
        let per_batch = [
            (&placeholders.label_s, &self.label_s),
            (&placeholders.feature_tra, &self.feature_tra),
            (&placeholders.label_tra, &self.label_tra),
            (&placeholders.label_tra_sum, &self.label_tra_sum),
            (&placeholders.feature_inds, &self.feature_inds),
        ];
        for (spec, tensor) in per_batch {
            if tensor.dim(0)? != batch {
                return Err(Error::ShapeMismatch {
                    slot: spec.name,
                    expected: vec![batch],
                    actual: tensor.dims().to_vec(),
                });
            }
        }

        for (spec, tensor) in [
            (&placeholders.week, &self.week),
            (&placeholders.day, &self.day),
            (&placeholders.hour, &self.hour),
            (&placeholders.minute, &self.minute),
        ] {
            if tensor.dim(0)? != batch * total_length {
                return Err(Error::ShapeMismatch {
                    slot: spec.name,
                    expected: vec![batch * total_length],
                    actual: tensor.dims().to_vec(),
                });
            }
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
    use candle_core::Device;

    fn small_config() -> ModelConfig {
        ModelConfig {
            site_num: 4,
            emb_size: 8,
            field_cnt: 3,
            feature_s: 2,
            feature_tra: 10,
            input_length: 3,
            output_length: 2,
            trajectory_length: 3,
            num_heads: 2,
            num_blocks: 1,
            dropout: 0.1,
        }
    }

    #[test]
    fn test_slot_ranks_follow_config() {
        let config = small_config();
        let p = Placeholders::new(&config);

        assert_eq!(p.position.expected_dims(), vec![1, 4]);
        assert_eq!(p.feature_s.expected_dims(), vec![0, 3, 4, 2]);
        assert_eq!(p.label_s.expected_dims(), vec![0, 4, 2]);
        assert_eq!(p.feature_tra.expected_dims(), vec![0, 10]);
        assert_eq!(p.label_tra.expected_dims(), vec![0, 3]);
        assert_eq!(p.label_tra_sum.expected_dims(), vec![0, 1]);
        assert_eq!(p.feature_inds.expected_dims(), vec![0, 3]);
        assert_eq!(p.trajectory_inds.expected_dims(), vec![3]);
    }

    #[test]
    fn test_slot_rejects_wrong_rank_and_dtype() {
        let p = Placeholders::new(&small_config());
        let dev = Device::Cpu;

        let ok = Tensor::zeros((5, 3, 4, 2), DType::F32, &dev).unwrap();
        assert!(p.feature_s.check(&ok).is_ok());

        let wrong_rank = Tensor::zeros((5, 3, 4), DType::F32, &dev).unwrap();
        assert!(p.feature_s.check(&wrong_rank).is_err());

        let wrong_dtype = Tensor::zeros((5, 3, 4, 2), DType::U32, &dev).unwrap();
        assert!(p.feature_s.check(&wrong_dtype).is_err());
    }

    #[test]
    fn test_index_slot_bounds() {
        let p = Placeholders::new(&small_config());
        let dev = Device::Cpu;

        let hours = Tensor::new(&[[0u32, 5, 23, 1]], &dev).unwrap();
        assert!(p.hour.check(&hours).is_ok());

        let hours = Tensor::new(&[[0u32, 5, 24, 1]], &dev).unwrap();
        match p.hour.check(&hours) {
            Err(Error::IndexOutOfRange { index, vocab, .. }) => {
                assert_eq!(index, 24);
                assert_eq!(vocab, 24);
            }
            other => panic!("expected out of range, got {:?}", other),
        }
    }
}
