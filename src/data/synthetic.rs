//! Deterministic synthetic traffic source
//!
//! Generates daily-periodic site speeds and routes whose segment travel times
//! follow the speed at departure, so smoke runs and tests have a learnable
//! signal without an external pipeline.

use std::f64::consts::PI;

use chrono::{Duration, NaiveDate};
use ndarray::{Array1, Array2, Array3, ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::batch::{RawBatch, TrajectoryAttributes};
use super::normalize::NormBounds;
use super::source::{BatchIter, BatchSource};
use crate::error::{Error, Result};
use crate::model::ModelConfig;

/// Quarter-hour slots per day
const SLOTS_PER_DAY: usize = 96;

/// Synthetic source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub site_num: usize,
    pub feature_s: usize,
    pub input_length: usize,
    pub output_length: usize,
    pub trajectory_length: usize,
    /// One-hot width of each trajectory attribute, in concatenation order
    pub field_widths: [usize; TrajectoryAttributes::FIELD_COUNT],
    pub num_trajectories: usize,
    pub divide_ratio: f64,
    pub seed: u64,
    /// Speed range in km/h before normalization
    pub speed_bounds: NormBounds,
}

impl SyntheticConfig {
    /// Match a model configuration, spreading `feature_tra` over the fields
    pub fn for_model(config: &ModelConfig, num_trajectories: usize) -> Self {
        let fields = TrajectoryAttributes::FIELD_COUNT;
        let base = config.feature_tra / fields;
        let extra = config.feature_tra % fields;
        let mut field_widths = [base; TrajectoryAttributes::FIELD_COUNT];
        for w in field_widths.iter_mut().take(extra) {
            *w += 1;
        }

        Self {
            site_num: config.site_num,
            feature_s: config.feature_s,
            input_length: config.input_length,
            output_length: config.output_length,
            trajectory_length: config.trajectory_length,
            field_widths,
            num_trajectories,
            divide_ratio: 0.8,
            seed: 42,
            speed_bounds: NormBounds::new(0.0, 100.0),
        }
    }

    pub fn with_divide_ratio(mut self, divide_ratio: f64) -> Self {
        self.divide_ratio = divide_ratio;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn total_length(&self) -> usize {
        self.input_length + self.output_length
    }

    fn train_samples(&self) -> usize {
        (self.num_trajectories as f64 * self.divide_ratio) as usize
    }

    fn held_out_samples(&self) -> usize {
        (self.num_trajectories as f64 * (1.0 - self.divide_ratio)) as usize
    }
}

/// In-memory source producing reproducible batches
pub struct SyntheticSource {
    config: SyntheticConfig,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }
}

impl BatchSource for SyntheticSource {
    fn next_batch(&self, batch_size: usize, epoch: usize, is_training: bool) -> Result<BatchIter> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be greater than 0".to_string()));
        }
        if self.config.field_widths.iter().any(|&w| w == 0) {
            return Err(Error::InvalidConfig(
                "every trajectory field needs a non-zero one-hot width".to_string(),
            ));
        }

        let (samples, seed) = if is_training {
            (self.config.train_samples() * epoch, self.config.seed)
        } else {
            (self.config.held_out_samples(), self.config.seed.wrapping_add(1))
        };

        Ok(Box::new(SyntheticBatches {
            config: self.config.clone(),
            rng: StdRng::seed_from_u64(seed),
            remaining: samples / batch_size,
            batch_size,
        }))
    }

    fn num_trajectories(&self) -> usize {
        self.config.num_trajectories
    }

    fn speed_bounds(&self) -> NormBounds {
        self.config.speed_bounds
    }
}

struct SyntheticBatches {
    config: SyntheticConfig,
    rng: StdRng,
    remaining: usize,
    batch_size: usize,
}

impl SyntheticBatches {
    /// Normalized speed of a site at a quarter-hour slot
    fn speed(site: usize, slot: usize) -> f64 {
        let phase = 2.0 * PI * (slot % SLOTS_PER_DAY) as f64 / SLOTS_PER_DAY as f64;
        0.5 + 0.3 * (phase + site as f64 * 0.7).sin()
    }

    fn generate(&mut self) -> Result<RawBatch> {
        let c = &self.config;
        let b = self.batch_size;
        let (n, fs, input, output) = (c.site_num, c.feature_s, c.input_length, c.output_length);
        let total = c.total_length();
        let segments = c.trajectory_length;

        let starts: Vec<usize> = (0..b)
            .map(|_| self.rng.gen_range(0..SLOTS_PER_DAY * 28))
            .collect();

        let mut x_s = Vec::with_capacity(b * input * n * fs);
        for &t0 in &starts {
            for t in 0..input {
                for site in 0..n {
                    let v = Self::speed(site, t0 + t);
                    for _ in 0..fs {
                        x_s.push((v + self.rng.gen_range(-0.02..0.02)) as f32);
                    }
                }
            }
        }

        let label_s = Array3::from_shape_fn((b, n, output), |(i, site, o)| {
            Self::speed(site, starts[i] + input + o) as f32
        });

        let time_field = |f: &dyn Fn(usize) -> usize| {
            let mut values = Vec::with_capacity(b * total * n);
            for &t0 in &starts {
                for t in 0..total {
                    values.extend(std::iter::repeat(f(t0 + t) as u32).take(n));
                }
            }
            ArrayD::from_shape_vec(IxDyn(&[b * total * n]), values)
        };
        let week = time_field(&|q| (q / SLOTS_PER_DAY) % 5);
        let day = time_field(&|q| (q / SLOTS_PER_DAY) % 31);
        let hour = time_field(&|q| (q / 4) % 24);
        let minute = time_field(&|q| q % 4);

        let trajectory_inds: Array1<u32> = (0..segments)
            .map(|_| self.rng.gen_range(0..n) as u32)
            .collect();

        // One active column per field and sample
        let widths = c.field_widths;
        let mut active = Array2::<usize>::zeros((b, widths.len()));
        for i in 0..b {
            for (f, &w) in widths.iter().enumerate() {
                active[[i, f]] = self.rng.gen_range(0..w);
            }
        }
        let one_hot = |f: usize| {
            Array2::from_shape_fn((b, widths[f]), |(i, j)| {
                if active[[i, f]] == j {
                    1.0f32
                } else {
                    0.0
                }
            })
        };
        let trajectory = TrajectoryAttributes {
            vehicle_id: one_hot(0),
            vehicle_type: one_hot(1),
            start_week: one_hot(2),
            start_day: one_hot(3),
            start_hour: one_hot(4),
            start_minute: one_hot(5),
            start_second: one_hot(6),
            distances: one_hot(7),
            route_id: one_hot(8),
        };

        let offsets: Vec<usize> = widths
            .iter()
            .scan(0, |acc, &w| {
                let start = *acc;
                *acc += w;
                Some(start)
            })
            .collect();
        let element_index =
            Array2::from_shape_fn((b, widths.len()), |(i, f)| (offsets[f] + active[[i, f]]) as u32);

        // Slower departure speed and longer distance bucket -> longer segment time
        let separate = Array2::from_shape_fn((b, segments), |(i, l)| {
            let departure = starts[i] + input;
            let v = Self::speed(trajectory_inds[l] as usize, departure);
            let distance = active[[i, 7]] as f64 / widths[7] as f64;
            (0.2 + 0.3 * (1.0 - v) + 0.05 * distance) as f32
        });
        let total_time = separate.sum_axis(ndarray::Axis(1)).insert_axis(ndarray::Axis(1));

        let epoch = NaiveDate::from_ymd_opt(2021, 6, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| Error::InvalidConfig("invalid synthetic base date".to_string()))?;
        let dates = starts
            .iter()
            .map(|&t0| {
                (epoch + Duration::minutes(15 * (t0 + input) as i64))
                    .format("%Y-%m-%d %H:%M")
                    .to_string()
            })
            .collect();

        Ok(RawBatch {
            x_s: ArrayD::from_shape_vec(IxDyn(&[b * input * n * fs]), x_s)?,
            week: week?,
            day: day?,
            hour: hour?,
            minute: minute?,
            label_s,
            trajectory,
            element_index,
            separate_trajectory_time: separate,
            total_time,
            trajectory_inds,
            dates,
        })
    }
}

impl Iterator for SyntheticBatches {
    type Item = Result<RawBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.generate())
    }
}
