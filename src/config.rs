use crate::detection::{BoundaryPolicy, CropWindow};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Optional files written by a pipeline run. Nothing is written when both
/// are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Save every crop as a PNG in this directory
    pub crop_dir: Option<PathBuf>,
    /// Save per-particle predictions as JSON to this file
    pub predictions_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Detections whose centers are closer than this many pixels are
    /// duplicates; 0 disables deduplication
    pub doubles_tol: f64,
    pub boundary: BoundaryPolicy,
    pub window: CropWindow,
    pub output: OutputConfig,
}

impl PipelineConfig {
    pub fn from_json_str(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse pipeline config")
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json_str(&contents)
            .with_context(|| format!("Invalid config {}", path.display()))
    }
}
