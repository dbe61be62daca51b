//! Date-partitioned archival of inspection frames.

use std::path::{Path, PathBuf};

use chrono::{Days, Local, NaiveDate};
use image::RgbImage;
use tokio::task;
use tracing::{error, info, warn};

use crate::config::ArchiveConfig;

/// Writes inspection frames under `root/<yyyymmdd>/` and prunes expired
/// day directories.
///
/// Archival is best effort: any failure logs and yields an empty path so
/// verdicts are never blocked on disk trouble.
#[derive(Clone)]
pub struct Archiver {
    enabled: bool,
    root: PathBuf,
    retention_days: u32,
}

impl Archiver {
    pub fn new(config: &ArchiveConfig) -> Self {
        Self {
            enabled: config.enabled,
            root: PathBuf::from(&config.root),
            retention_days: config.retention_days,
        }
    }

    /// Saves one frame, named by `identifier` and capture time. Returns
    /// the path written, or the empty string when archival is disabled or
    /// the write failed.
    pub async fn save(&self, image: RgbImage, identifier: &str) -> String {
        if !self.enabled {
            return String::new();
        }

        let now = Local::now();
        let day_dir = self.root.join(now.format("%Y%m%d").to_string());
        let path = day_dir.join(format!(
            "{}_{}.jpg",
            identifier,
            now.format("%Y%m%d_%H%M%S_%6f")
        ));

        let written = task::spawn_blocking(move || {
            if let Err(err) = std::fs::create_dir_all(&day_dir) {
                error!(dir = %day_dir.display(), error = %err, "unable to create archive directory");
                return None;
            }
            match image.save(&path) {
                Ok(()) => Some(path.to_string_lossy().into_owned()),
                Err(err) => {
                    error!(path = %path.display(), error = %err, "unable to write archive image");
                    None
                }
            }
        })
        .await;

        match written {
            Ok(Some(path)) => path,
            Ok(None) => String::new(),
            Err(err) => {
                error!(error = %err, "archive task failed");
                String::new()
            }
        }
    }

    /// Removes day directories older than the retention window. Returns
    /// how many directories were removed.
    pub async fn prune_stale(&self) -> usize {
        if !self.enabled || self.retention_days == 0 {
            return 0;
        }

        let root = self.root.clone();
        let cutoff = Local::now().date_naive() - Days::new(u64::from(self.retention_days));

        match task::spawn_blocking(move || prune_directories(&root, cutoff)).await {
            Ok(removed) => removed,
            Err(err) => {
                error!(error = %err, "prune task failed");
                0
            }
        }
    }
}

fn prune_directories(root: &Path, cutoff: NaiveDate) -> usize {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        // Nothing archived yet.
        Err(_) => return 0,
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Ok(day) = NaiveDate::parse_from_str(name, "%Y%m%d") else {
            continue;
        };
        if day >= cutoff {
            continue;
        }

        match std::fs::remove_dir_all(entry.path()) {
            Ok(()) => {
                info!(dir = name, "pruned expired archive directory");
                removed += 1;
            }
            Err(err) => {
                warn!(dir = name, error = %err, "unable to prune archive directory");
            }
        }
    }
    removed
}
