//! Evaluate a saved checkpoint
//!
//! Restores the weights under the configured save path and reports speed and
//! travel-time metrics on the held-out synthetic split.

use anyhow::{Context, Result};
use candle_core::Device;
use clap::Parser;
use tracing::warn;

use speed_trajectory_mtl::{setup_logging, Config, NormBounds, SyntheticConfig, SyntheticSource, Trainer};

#[derive(Parser)]
#[command(name = "evaluate")]
#[command(about = "Evaluate a trained checkpoint on held-out data")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Checkpoint directory (overrides config)
    #[arg(short, long)]
    weights: Option<String>,

    /// Write the report as JSON to this path
    #[arg(long)]
    report: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, load_err) = Config::load_checked(&args.config);
    if let Some(weights) = &args.weights {
        config.training.save_path = weights.into();
    }
    config.training.is_training = false;

    setup_logging(&config.logging.level);
    if let Some(e) = load_err {
        warn!("Could not load {}: {}; using defaults", args.config, e);
    }
    config.validate()?;

    let mut synthetic = SyntheticConfig::for_model(&config.model, config.data.num_trajectories)
        .with_divide_ratio(config.training.divide_ratio)
        .with_seed(config.training.seed);
    synthetic.speed_bounds = NormBounds::new(config.data.speed_min, config.data.speed_max);
    let source = SyntheticSource::new(synthetic);

    let mut trainer = Trainer::new(config.model.clone(), config.training.clone(), Device::Cpu)?;
    let report = trainer
        .evaluate(&source)
        .with_context(|| format!("evaluating {}", config.training.save_path.display()))?;

    println!("\nEvaluation ({} samples)", report.samples);
    println!("═══════════════════════════════════════════════════════════════\n");
    for (task, m) in [
        ("Speed", &report.speed),
        ("Total travel time (s)", &report.total_time),
        ("Segment travel time (s)", &report.segment_time),
    ] {
        println!("[{}]", task);
        println!("  MAE:  {:.4}", m.mae);
        println!("  RMSE: {:.4}", m.rmse);
        if let Some(mape) = m.mape {
            println!("  MAPE: {:.2}%", mape);
        }
        println!("  COR:  {:.4}", m.correlation);
        println!("  R²:   {:.4}", m.r2);
    }

    if let Some(path) = &args.report {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("\n[OUTPUT] Report written to {}", path);
    }

    Ok(())
}
