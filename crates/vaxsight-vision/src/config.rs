use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Detection model selection and gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Directory holding detection models.
    pub model_dir: String,
    /// ONNX model file name inside `model_dir`.
    pub model_file: String,
    /// Square input edge expected by the model.
    pub input_size: u32,
    /// Minimum confidence for a positive detection.
    pub confidence_threshold: f32,
}

impl DetectionConfig {
    /// Full path to the configured model file.
    pub fn model_path(&self) -> PathBuf {
        Path::new(&self.model_dir).join(&self.model_file)
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_dir: "models".to_string(),
            model_file: "vaccine_detect.onnx".to_string(),
            input_size: 640,
            confidence_threshold: 0.85,
        }
    }
}

/// Barcode decoding behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BarcodeConfig {
    /// Scan attempts per verification before giving up.
    pub retry_count: u32,
    /// Pause between verification scan attempts, in milliseconds.
    pub retry_backoff_ms: u64,
    /// Upper bound for one decode pass, in seconds.
    pub timeout_secs: u64,
}

impl BarcodeConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BarcodeConfig {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_backoff_ms: 300,
            timeout_secs: 3,
        }
    }
}

/// Image archival behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Whether inspection frames are written to disk.
    pub enabled: bool,
    /// Directory receiving the date-partitioned archive.
    pub root: String,
    /// Days a day directory is kept before pruning. Zero disables pruning.
    pub retention_days: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: "images".to_string(),
            retention_days: 30,
        }
    }
}
