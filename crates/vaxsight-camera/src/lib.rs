//! Camera backends and lifecycle management for the inspection station.
//!
//! A [`CameraManager`] owns at most one camera behind the [`Camera`] trait
//! and serializes hardware access across concurrent requests. Capture is
//! deliberately infallible at the manager level: when no usable camera is
//! present the manager substitutes a synthetic offline frame so the
//! downstream pipeline always has an image to annotate and archive.

pub mod camera;
pub mod config;
pub mod frames;
pub mod gige;
pub mod manager;
pub mod usb;

pub use camera::Camera;
pub use config::CameraConfig;
pub use gige::GigeCamera;
pub use manager::CameraManager;
pub use usb::UsbCamera;
