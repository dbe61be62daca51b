//! Detection backend seam.

use image::RgbImage;
use vaxsight_core::VisionError;

/// One box straight out of a detection model, in source-image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

/// Object detection backend.
///
/// Implementations run synchronously; callers move inference onto a
/// blocking task when latency matters.
pub trait DetectionModel: Send + Sync {
    fn infer(&self, image: &RgbImage) -> Result<Vec<RawDetection>, VisionError>;
}
