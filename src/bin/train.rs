//! Train the multi-task model
//!
//! Runs the joint training loop against the synthetic traffic source and
//! keeps the best checkpoint under the configured save path.

use anyhow::{ensure, Result};
use candle_core::Device;
use clap::Parser;
use tracing::warn;

use speed_trajectory_mtl::data::TrajectoryAttributes;
use speed_trajectory_mtl::{setup_logging, Config, NormBounds, SyntheticConfig, SyntheticSource, Trainer};

#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train the joint speed and travel-time model")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Number of epochs (overrides config)
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Batch size (overrides config)
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Number of synthetic trajectories (overrides config)
    #[arg(short, long)]
    trajectories: Option<usize>,

    /// Checkpoint directory (overrides config)
    #[arg(short, long)]
    output: Option<String>,

    /// Log level (overrides config)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, load_err) = Config::load_checked(&args.config);
    if let Some(epochs) = args.epochs {
        config.training.epoch = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.training.batch_size = batch_size;
    }
    if let Some(n) = args.trajectories {
        config.data.num_trajectories = n;
    }
    if let Some(output) = &args.output {
        config.training.save_path = output.into();
    }
    config.training.is_training = true;

    setup_logging(args.log_level.as_deref().unwrap_or(&config.logging.level));
    if let Some(e) = load_err {
        warn!("Could not load {}: {}; using defaults", args.config, e);
    }
    config.validate()?;
    ensure!(
        config.model.field_cnt == TrajectoryAttributes::FIELD_COUNT,
        "the synthetic source produces {} trajectory fields, config has field_cnt = {}",
        TrajectoryAttributes::FIELD_COUNT,
        config.model.field_cnt
    );

    println!("\nSpeed / Travel-Time Training");
    println!("═══════════════════════════════════════════════════════════════\n");
    println!("[CONFIG] Configuration loaded from: {}", args.config);
    println!("[MODEL] Sites: {}", config.model.site_num);
    println!("[MODEL] Embedding size: {}", config.model.emb_size);
    println!("[MODEL] Horizon: {} -> {}", config.model.input_length, config.model.output_length);
    println!("[MODEL] Trajectory length: {}", config.model.trajectory_length);
    println!("[TRAINING] Epochs: {}", config.training.epoch);
    println!("[TRAINING] Batch size: {}", config.training.batch_size);
    println!("[TRAINING] Learning rate: {}", config.training.learning_rate);
    println!("[OUTPUT] Checkpoints: {}", config.training.save_path.display());
    println!();

    let mut synthetic = SyntheticConfig::for_model(&config.model, config.data.num_trajectories)
        .with_divide_ratio(config.training.divide_ratio)
        .with_seed(config.training.seed);
    synthetic.speed_bounds = NormBounds::new(config.data.speed_min, config.data.speed_max);
    let source = SyntheticSource::new(synthetic);

    let mut trainer = Trainer::new(config.model.clone(), config.training.clone(), Device::Cpu)?;
    let summary = trainer.run_epoch(&source)?;

    println!();
    println!("[RESULT] Steps: {}", summary.steps);
    println!("[RESULT] Final loss: {:.6}", summary.final_loss);
    match summary.best_mae {
        Some(mae) => println!("[RESULT] Best validation MAE: {:.4}s", mae),
        None => println!("[RESULT] No finite validation MAE"),
    }
    println!("[RESULT] Checkpoints written: {}", summary.checkpoints_written);
    println!("[RESULT] Elapsed: {:.2}s", summary.elapsed_secs);

    Ok(())
}
