//! Shared camera ownership and degraded capture.

use std::sync::Arc;

use image::RgbImage;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::camera::Camera;
use crate::config::CameraConfig;
use crate::frames;
use crate::gige::GigeCamera;
use crate::usb::UsbCamera;

/// Owns the single camera instance shared by every in-flight request.
///
/// Captures are serialized through a mutex so concurrent pipelines never
/// race the hardware handle. `capture` always yields an image: when no
/// usable camera exists the manager substitutes the offline frame at the
/// configured resolution.
#[derive(Clone)]
pub struct CameraManager {
    config: CameraConfig,
    camera: Arc<Mutex<Option<Box<dyn Camera>>>>,
}

impl CameraManager {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            camera: Arc::new(Mutex::new(None)),
        }
    }

    /// Selects and opens the configured camera.
    ///
    /// Returns `false` when the hardware could not be opened. The failed
    /// camera is kept so a later capture can still be attempted against it;
    /// the manager stays usable either way.
    pub async fn initialize(&self) -> bool {
        if !self.config.enabled {
            info!("camera disabled, captures will use the offline frame");
            return true;
        }

        let mut camera = select_camera(&self.config);
        let opened = camera.open().await;
        if !opened {
            warn!(camera_type = %self.config.camera_type, "camera failed to open");
        }
        *self.camera.lock().await = Some(camera);
        opened
    }

    /// Grabs one frame, degrading to the offline frame when no camera is
    /// present or the grab fails.
    pub async fn capture(&self) -> RgbImage {
        let mut guard = self.camera.lock().await;
        match guard.as_mut() {
            Some(camera) => match camera.capture().await {
                Some(image) => image,
                None => {
                    warn!("frame grab failed, substituting offline frame");
                    frames::offline_frame(self.config.width, self.config.height)
                }
            },
            None => frames::offline_frame(self.config.width, self.config.height),
        }
    }

    /// Closes and forgets the active camera. Later captures produce the
    /// offline frame.
    pub async fn cleanup(&self) {
        let mut guard = self.camera.lock().await;
        if let Some(camera) = guard.as_mut() {
            camera.close().await;
        }
        *guard = None;
    }

    /// Whether a camera instance is currently held, open or not.
    pub async fn has_camera(&self) -> bool {
        self.camera.lock().await.is_some()
    }

    /// Replaces the held camera without closing the previous one. Lets
    /// scripted backends stand in for hardware on test rigs.
    pub async fn install(&self, camera: Box<dyn Camera>) {
        *self.camera.lock().await = Some(camera);
    }
}

/// Maps the configured selector onto a concrete backend. Unrecognized
/// selectors fall back to the industrial camera.
fn select_camera(config: &CameraConfig) -> Box<dyn Camera> {
    match config.camera_type.as_str() {
        "industrial" => Box::new(GigeCamera::new(
            &config.ip,
            config.width,
            config.height,
            config.exposure_us,
        )),
        "usb" => Box::new(UsbCamera::new(
            config.device_index as usize,
            config.width,
            config.height,
        )),
        other => {
            warn!(camera_type = %other, "unrecognized camera type, falling back to industrial");
            Box::new(GigeCamera::new(
                &config.ip,
                config.width,
                config.height,
                config.exposure_us,
            ))
        }
    }
}
