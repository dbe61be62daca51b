use serde::{Deserialize, Serialize};

/// Camera selection and acquisition parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Whether a hardware camera should be opened at startup.
    pub enabled: bool,
    /// Backend selector: `industrial` or `usb`.
    pub camera_type: String,
    /// GigE camera address (industrial backend).
    pub ip: String,
    /// V4L device index (usb backend).
    pub device_index: u32,
    /// Requested frame width in pixels.
    pub width: u32,
    /// Requested frame height in pixels.
    pub height: u32,
    /// Requested acquisition rate in frames per second.
    pub frame_rate: u32,
    /// Sensor exposure in microseconds (industrial backend).
    pub exposure_us: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            camera_type: "industrial".to_string(),
            ip: "192.168.1.200".to_string(),
            device_index: 0,
            width: 1920,
            height: 1080,
            frame_rate: 30,
            exposure_us: 10_000,
        }
    }
}
