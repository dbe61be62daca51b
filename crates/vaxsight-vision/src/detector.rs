//! Vaccine presence detection over an optional model backend.

use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, warn};

use vaxsight_core::{BoundingBox, Detection, DetectionResult};

use crate::model::{DetectionModel, RawDetection};

/// Class labels recognized by the detector, indexed by model class id.
pub const CLASS_NAMES: [&str; 3] = ["vaccine", "syringe", "vial"];

/// Confidence reported by the simulated detector when no model is loaded.
const SIMULATED_CONFIDENCE: f32 = 0.95;

/// Presence detector gating the rest of the pipeline.
///
/// Without a model the detector runs simulated: a centered box at fixed
/// confidence, which keeps bench installs exercising the full pipeline.
/// Inference failures are logged and reported as a miss rather than
/// surfaced to callers.
#[derive(Clone)]
pub struct Detector {
    model: Option<Arc<dyn DetectionModel>>,
    confidence_threshold: f32,
}

impl Detector {
    pub fn new(model: Option<Arc<dyn DetectionModel>>, confidence_threshold: f32) -> Self {
        Self {
            model,
            confidence_threshold,
        }
    }

    /// Finds the most confident candidate and gates it on the configured
    /// threshold. An empty image is always a miss.
    pub fn detect(&self, image: &RgbImage) -> DetectionResult {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return DetectionResult::miss(0.0);
        }

        let Some(model) = &self.model else {
            return simulated_detection(width, height);
        };

        let raw = match model.infer(image) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "detection failed");
                return DetectionResult::miss(0.0);
            }
        };

        // Strictly greater keeps the earliest candidate on equal scores.
        let Some(best) = raw
            .iter()
            .reduce(|best, d| if d.confidence > best.confidence { d } else { best })
        else {
            return DetectionResult::miss(0.0);
        };

        if best.confidence < self.confidence_threshold {
            debug!(
                confidence = best.confidence,
                threshold = self.confidence_threshold,
                "best candidate under threshold"
            );
            return DetectionResult::miss(best.confidence);
        }

        DetectionResult::hit(
            best.confidence,
            clamp_bbox(best, width, height),
            class_name(best.class_id),
        )
    }

    /// Lists every candidate clearing the threshold. A missing model and
    /// inference failures both yield an empty list.
    pub fn detect_all(&self, image: &RgbImage) -> Vec<Detection> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }
        let Some(model) = &self.model else {
            return Vec::new();
        };

        match model.infer(image) {
            Ok(raw) => raw
                .into_iter()
                .filter(|d| d.confidence >= self.confidence_threshold)
                .map(|d| Detection {
                    bbox: clamp_bbox(&d, width, height),
                    confidence: d.confidence,
                    class_id: d.class_id,
                    class_name: class_name(d.class_id).to_string(),
                })
                .collect(),
            Err(err) => {
                warn!(error = %err, "detection failed");
                Vec::new()
            }
        }
    }
}

fn class_name(class_id: usize) -> &'static str {
    CLASS_NAMES.get(class_id).copied().unwrap_or("unknown")
}

fn clamp_bbox(detection: &RawDetection, width: u32, height: u32) -> BoundingBox {
    let max_x = width.saturating_sub(1) as f32;
    let max_y = height.saturating_sub(1) as f32;
    BoundingBox {
        x1: detection.x1.clamp(0.0, max_x) as u32,
        y1: detection.y1.clamp(0.0, max_y) as u32,
        x2: detection.x2.clamp(0.0, max_x) as u32,
        y2: detection.y2.clamp(0.0, max_y) as u32,
    }
}

/// Centered box covering the middle half of the frame.
fn simulated_detection(width: u32, height: u32) -> DetectionResult {
    let bbox = BoundingBox {
        x1: width / 4,
        y1: height / 4,
        x2: width * 3 / 4,
        y2: height * 3 / 4,
    };
    DetectionResult::hit(SIMULATED_CONFIDENCE, bbox, CLASS_NAMES[0])
}
