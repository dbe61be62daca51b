//! Server configuration.
//!
//! Settings load from an optional TOML file with CLI overrides on top.
//! Every section falls back to commissioning defaults, so the server runs
//! with no configuration at all.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use vaxsight_camera::CameraConfig;
use vaxsight_vision::{ArchiveConfig, BarcodeConfig, DetectionConfig};

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// gRPC server configuration.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Camera selection and acquisition.
    pub camera: CameraConfig,

    /// Detection model and gating.
    pub detection: DetectionConfig,

    /// Barcode decoding behavior.
    pub barcode: BarcodeConfig,

    /// Image archival behavior.
    pub archive: ArchiveConfig,
}

/// gRPC server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the gRPC server to.
    pub bind_addr: SocketAddr,

    /// Requests served concurrently per client connection.
    pub max_concurrent_requests: usize,

    /// Seconds granted to in-flight requests during shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5001".parse().unwrap(),
            max_concurrent_requests: 10,
            shutdown_grace_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Returns the shutdown grace period as a Duration.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Log format (pretty, json, compact).
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merges CLI arguments into the configuration.
    pub fn merge_cli_args(&mut self, args: &super::CliArgs) {
        if let Some(bind_addr) = args.bind_addr {
            self.server.bind_addr = bind_addr;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }

        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        if self.server.max_concurrent_requests == 0 {
            anyhow::bail!("Server concurrency limit must be positive");
        }

        if self.detection.input_size == 0 {
            anyhow::bail!("Detection input size must be positive");
        }

        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            anyhow::bail!(
                "Detection confidence threshold must be within [0, 1], got {}",
                self.detection.confidence_threshold
            );
        }

        Ok(())
    }
}
