//! Checkpoint persistence
//!
//! A checkpoint directory holds all trainable variables as safetensors and a
//! small JSON record of when and why it was written.

use std::fs;
use std::path::{Path, PathBuf};

use candle_nn::VarMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// Variables file inside a checkpoint directory
pub const WEIGHTS_FILE: &str = "model.safetensors";
/// Metadata file inside a checkpoint directory
pub const METADATA_FILE: &str = "checkpoint.json";

/// Record written next to the weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Training step at which validation improved
    pub step: usize,
    /// Validation MAE on total travel time, in seconds
    pub mae: f64,
    pub saved_at: DateTime<Utc>,
}

pub fn weights_path(dir: &Path) -> PathBuf {
    dir.join(WEIGHTS_FILE)
}

/// Write weights and metadata, creating the directory if needed
pub fn save_checkpoint(varmap: &VarMap, dir: &Path, step: usize, mae: f64) -> Result<CheckpointMeta> {
    fs::create_dir_all(dir)?;
    varmap.save(weights_path(dir))?;

    let meta = CheckpointMeta {
        step,
        mae,
        saved_at: Utc::now(),
    };
    fs::write(dir.join(METADATA_FILE), serde_json::to_string_pretty(&meta)?)?;

    info!("Saved checkpoint to {} (step {}, mae {:.6})", dir.display(), step, mae);
    Ok(meta)
}

/// Load weights into existing variables
///
/// Metadata is optional; the weights file is not.
pub fn restore_checkpoint(varmap: &mut VarMap, dir: &Path) -> Result<Option<CheckpointMeta>> {
    let weights = weights_path(dir);
    if !weights.exists() {
        return Err(Error::CheckpointNotFound(weights.display().to_string()));
    }
    varmap.load(&weights)?;

    let meta_path = dir.join(METADATA_FILE);
    let meta = if meta_path.exists() {
        Some(serde_json::from_str(&fs::read_to_string(meta_path)?)?)
    } else {
        None
    };

    info!("Restored weights from {}", weights.display());
    Ok(meta)
}
