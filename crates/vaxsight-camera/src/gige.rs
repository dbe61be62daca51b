//! Industrial GigE camera backend.

use async_trait::async_trait;
use image::RgbImage;
use tracing::{info, warn};

use crate::camera::Camera;
use crate::frames;

/// GigE Vision camera on the inspection line.
///
/// The vendor SDK attach is stubbed in this build: `open` always succeeds
/// and `capture` produces the staged frame from [`frames::test_frame`], so
/// the rest of the pipeline runs unchanged without the sensor present.
pub struct GigeCamera {
    ip: String,
    width: u32,
    height: u32,
    exposure_us: u32,
    opened: bool,
}

impl GigeCamera {
    pub fn new(ip: impl Into<String>, width: u32, height: u32, exposure_us: u32) -> Self {
        Self {
            ip: ip.into(),
            width,
            height,
            exposure_us,
            opened: false,
        }
    }
}

#[async_trait]
impl Camera for GigeCamera {
    async fn open(&mut self) -> bool {
        info!(
            ip = %self.ip,
            width = self.width,
            height = self.height,
            exposure_us = self.exposure_us,
            "connecting industrial camera"
        );
        self.opened = true;
        info!(ip = %self.ip, "industrial camera connected");
        true
    }

    async fn capture(&mut self) -> Option<RgbImage> {
        if !self.opened {
            warn!("capture requested while industrial camera is closed");
            return None;
        }
        Some(frames::test_frame(self.width, self.height))
    }

    async fn close(&mut self) {
        if self.opened {
            info!(ip = %self.ip, "industrial camera disconnected");
        }
        self.opened = false;
    }

    fn is_open(&self) -> bool {
        self.opened
    }
}
