//! Joint training loop
//!
//! Runs a precomputed number of steps over the batch source, validates on
//! held-out data every `validate_every` steps and keeps the best checkpoint
//! by total travel-time MAE.

use std::path::PathBuf;

use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, Array3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::checkpoint::{restore_checkpoint, save_checkpoint, CheckpointMeta};
use super::losses::JointLoss;
use super::metrics::RegressionMetrics;
use crate::data::{BatchSource, FeedBuilder, RawBatch};
use crate::error::{Error, Result};
use crate::model::{ModelConfig, MultiTaskModel};

/// Samples skipped at the end of the held-out split, per time step of a window
const HELD_OUT_MARGIN: usize = 15;

/// Travel times are stored in minutes and reported in seconds
const SECONDS_PER_MINUTE: f64 = 60.0;

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Sliding-window step of an external batch source; unused by the trainer
    /// and the synthetic source
    pub step: usize,
    /// Passes over the training split
    pub epoch: usize,
    pub batch_size: usize,
    /// Share of trajectories used for training
    pub divide_ratio: f64,
    pub learning_rate: f64,
    /// When false, evaluation restores the saved checkpoint first
    pub is_training: bool,
    /// Whether speeds were min-max normalized by the source
    pub normalize: bool,
    /// Checkpoint directory
    pub save_path: PathBuf,
    /// Validation interval in steps
    pub validate_every: usize,
    /// Seed of the synthetic source
    pub seed: u64,
    /// Validation MAE (seconds) a checkpoint must beat to be written
    pub initial_best_mae: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            step: 1,
            epoch: 100,
            batch_size: 32,
            divide_ratio: 0.8,
            learning_rate: 0.001,
            is_training: true,
            normalize: true,
            save_path: PathBuf::from("weights"),
            validate_every: 100,
            seed: 42,
            initial_best_mae: 100.0,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be greater than 0".into()));
        }
        if self.epoch == 0 {
            return Err(Error::InvalidConfig("epoch must be greater than 0".into()));
        }
        if self.validate_every == 0 {
            return Err(Error::InvalidConfig("validate_every must be greater than 0".into()));
        }
        if self.initial_best_mae.is_nan() {
            return Err(Error::InvalidConfig("initial_best_mae must not be NaN".into()));
        }
        if !(self.divide_ratio > 0.0 && self.divide_ratio < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "divide_ratio must lie in (0, 1), got {}",
                self.divide_ratio
            )));
        }
        if !(self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }

    /// `floor(n * divide_ratio) * epoch / batch_size`
    pub fn train_steps(&self, num_trajectories: usize) -> usize {
        let samples = (num_trajectories as f64 * self.divide_ratio) as usize;
        samples * self.epoch / self.batch_size
    }

    /// `(floor(n * (1 - divide_ratio)) - 15 * total_length) / batch_size`, never negative
    pub fn eval_steps(&self, num_trajectories: usize, total_length: usize) -> usize {
        let samples = (num_trajectories as f64 * (1.0 - self.divide_ratio)) as usize;
        samples.saturating_sub(HELD_OUT_MARGIN * total_length) / self.batch_size
    }
}

/// Keeps the lowest validation error seen so far
#[derive(Debug, Clone, Copy)]
pub struct BestTracker {
    best: f64,
    recorded: bool,
}

impl BestTracker {
    /// Only errors strictly below `threshold` count as improvements
    pub fn new(threshold: f64) -> Self {
        Self {
            best: threshold,
            recorded: false,
        }
    }

    /// Record `mae` if it is strictly lower; NaN never improves
    pub fn update(&mut self, mae: f64) -> bool {
        if mae < self.best {
            self.best = mae;
            self.recorded = true;
            true
        } else {
            false
        }
    }

    /// Best recorded error, `None` until something beat the threshold
    pub fn best(&self) -> Option<f64> {
        self.recorded.then_some(self.best)
    }
}

/// Metrics of one pass over the held-out split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Speed, denormalized when the source normalizes
    pub speed: RegressionMetrics,
    /// Total travel time in seconds
    pub total_time: RegressionMetrics,
    /// Per-segment travel time in seconds
    pub segment_time: RegressionMetrics,
    pub batches: usize,
    pub samples: usize,
}

impl EvaluationReport {
    pub fn log(&self) {
        self.speed.log("speed");
        self.total_time.log("entire travel time");
        self.segment_time.log("separate travel time");
    }
}

/// Outcome of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub steps: usize,
    pub final_loss: f64,
    pub best_mae: Option<f64>,
    pub validations: usize,
    pub checkpoints_written: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
}

/// Host-side accumulation of predictions and labels
#[derive(Default)]
struct Collected {
    speed_pred: Vec<f32>,
    speed_label: Vec<f32>,
    total_pred: Vec<f32>,
    total_label: Vec<f32>,
    segment_pred: Vec<f32>,
    segment_label: Vec<f32>,
}

fn host_values(t: &Tensor) -> Result<Vec<f32>> {
    Ok(t.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
}

fn minutes_to_seconds(values: &[f32]) -> Array1<f64> {
    values.iter().map(|&v| v as f64 * SECONDS_PER_MINUTE).collect()
}

/// Trainer owning the model variables and optimizer state
pub struct Trainer {
    config: TrainingConfig,
    model_config: ModelConfig,
    varmap: VarMap,
    model: MultiTaskModel,
    optimizer: AdamW,
    feeds: FeedBuilder,
    best: BestTracker,
    checkpoints_written: usize,
}

impl Trainer {
    /// Build the model and an Adam optimizer over all its variables
    pub fn new(model_config: ModelConfig, config: TrainingConfig, device: Device) -> Result<Self> {
        config.validate()?;
        info!("Using device: {:?}", device);

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = MultiTaskModel::new(&model_config, vb)?;

        let params = ParamsAdamW {
            lr: config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let optimizer = AdamW::new(varmap.all_vars(), params)?;
        info!("Model built with {} variables", varmap.all_vars().len());

        let best = BestTracker::new(config.initial_best_mae);
        Ok(Self {
            feeds: FeedBuilder::new(model_config.clone(), device),
            config,
            model_config,
            varmap,
            model,
            optimizer,
            best,
            checkpoints_written: 0,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn model(&self) -> &MultiTaskModel {
        &self.model
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn best_mae(&self) -> Option<f64> {
        self.best.best()
    }

    /// Pull the next batch, failing if the source ends early
    fn next_raw(
        batches: &mut dyn Iterator<Item = Result<RawBatch>>,
        consumed: usize,
    ) -> Result<RawBatch> {
        batches.next().ok_or(Error::SourceExhausted(consumed))?
    }

    /// One optimization step; returns the joint loss
    fn train_step(&mut self, raw: &RawBatch) -> Result<f64> {
        let feed = self.feeds.build(raw)?.with_dropout(self.model_config.dropout);
        let out = self.model.forward(&feed)?;

        let loss = JointLoss::compute(
            &out.speed,
            &feed.label_s,
            &out.total,
            &feed.label_tra_sum,
            &out.separate,
            &feed.label_tra,
        )?;
        self.optimizer.backward_step(&loss.joint)?;
        Ok(loss.value()?)
    }

    /// Train for the configured number of epochs
    pub fn run_epoch(&mut self, source: &dyn BatchSource) -> Result<TrainingSummary> {
        let started_at = Utc::now();
        let steps = self.config.train_steps(source.num_trajectories());
        if steps == 0 {
            return Err(Error::InsufficientData(format!(
                "{} trajectories give no training step at batch size {}",
                source.num_trajectories(),
                self.config.batch_size
            )));
        }
        info!("Training for {} steps", steps);

        let mut batches = source.next_batch(self.config.batch_size, self.config.epoch, true)?;

        let pb = ProgressBar::new(steps as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .map(|style| style.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut final_loss = f64::NAN;
        let mut validations = 0;

        for i in 0..steps {
            let raw = Self::next_raw(&mut batches, i)?;
            final_loss = self.train_step(&raw)?;
            debug!("after {} steps, the training loss is {:.6}", i, final_loss);
            if !final_loss.is_finite() {
                warn!("Non-finite training loss at step {}", i);
            }

            if i % self.config.validate_every == 0 {
                let report = self.evaluate(source)?;
                validations += 1;
                let mae = report.total_time.mae;
                if self.best.update(mae) {
                    info!("Validation MAE improved to {:.6} at step {}", mae, i);
                    save_checkpoint(&self.varmap, &self.config.save_path, i, mae)?;
                    self.checkpoints_written += 1;
                } else {
                    debug!("Validation MAE {:.6} did not improve", mae);
                }
            }

            pb.set_message(format!("loss: {:.6}", final_loss));
            pb.inc(1);
        }

        pb.finish_with_message(format!("Training complete, loss: {:.6}", final_loss));

        let elapsed_secs = (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0;
        info!("Total running time: {:.3}s", elapsed_secs);

        Ok(TrainingSummary {
            steps,
            final_loss,
            best_mae: self.best.best(),
            validations,
            checkpoints_written: self.checkpoints_written,
            started_at,
            elapsed_secs,
        })
    }

    /// Load the saved checkpoint into the model variables
    pub fn restore(&mut self) -> Result<Option<CheckpointMeta>> {
        restore_checkpoint(&mut self.varmap, &self.config.save_path)
    }

    /// Full pass over the held-out split without parameter updates
    pub fn evaluate(&mut self, source: &dyn BatchSource) -> Result<EvaluationReport> {
        if !self.config.is_training {
            info!("Loading model weights for evaluation");
            self.restore()?;
        }

        let c = &self.model_config;
        let steps = self
            .config
            .eval_steps(source.num_trajectories(), c.total_length());
        if steps == 0 {
            return Err(Error::InsufficientData(format!(
                "held-out split of {} trajectories gives no validation batch",
                source.num_trajectories()
            )));
        }

        let mut batches = source.next_batch(self.config.batch_size, 1, false)?;
        let mut collected = Collected::default();

        for i in 0..steps {
            let raw = Self::next_raw(&mut batches, i)?;
            let feed = self.feeds.build(&raw)?;
            let out = self.model.forward(&feed)?;

            collected.speed_pred.extend(host_values(&out.speed)?);
            collected.speed_label.extend(raw.label_s.iter().copied());
            collected.total_pred.extend(host_values(&out.total)?);
            collected.total_label.extend(raw.total_time.iter().copied());
            collected.segment_pred.extend(host_values(&out.separate)?);
            collected
                .segment_label
                .extend(raw.separate_trajectory_time.iter().copied());
        }

        let samples = collected.total_label.len();
        let speed_shape = (samples, c.site_num, c.output_length);
        // [site, sample, horizon]
        let to_site_major = |values: Vec<f32>| -> Result<Array3<f64>> {
            let a = Array3::from_shape_vec(speed_shape, values)?.mapv(|v| v as f64);
            Ok(a.permuted_axes([1, 0, 2]))
        };
        let mut speed_pred = to_site_major(collected.speed_pred)?;
        let mut speed_label = to_site_major(collected.speed_label)?;
        if self.config.normalize {
            let bounds = source.speed_bounds();
            speed_pred = bounds.re_current_array(&speed_pred);
            speed_label = bounds.re_current_array(&speed_label);
        }

        let report = EvaluationReport {
            speed: RegressionMetrics::from_arrays(&speed_label, &speed_pred),
            total_time: RegressionMetrics::calculate(
                &minutes_to_seconds(&collected.total_label),
                &minutes_to_seconds(&collected.total_pred),
            ),
            segment_time: RegressionMetrics::calculate(
                &minutes_to_seconds(&collected.segment_label),
                &minutes_to_seconds(&collected.segment_pred),
            ),
            batches: steps,
            samples,
        };
        report.log();
        Ok(report)
    }
}
