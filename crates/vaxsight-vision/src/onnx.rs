//! ONNX detection backend executed through tract.

use std::path::Path;

use image::RgbImage;
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use vaxsight_core::VisionError;

use crate::model::{DetectionModel, RawDetection};

/// Candidates under this score are discarded before suppression.
const CANDIDATE_FLOOR: f32 = 0.25;
/// Overlap above this ratio suppresses the lower-confidence box.
const IOU_THRESHOLD: f32 = 0.45;
/// Upper bound on boxes surviving suppression.
const MAX_DETECTIONS: usize = 100;

/// YOLO-family detector loaded from an ONNX graph.
///
/// The graph is pinned to a single NCHW float input of `input_size` square
/// and optimized at load time. Output is expected in the export layout
/// `[1, 4 + classes, candidates]` with centered boxes in input pixels.
pub struct OnnxModel {
    plan: TypedRunnableModel<TypedModel>,
    input_size: u32,
}

impl OnnxModel {
    pub fn load(path: &Path, input_size: u32) -> Result<Self, VisionError> {
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|err| VisionError::ModelLoad(err.to_string()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_size as usize, input_size as usize),
                ),
            )
            .map_err(|err| VisionError::ModelLoad(err.to_string()))?
            .into_optimized()
            .map_err(|err| VisionError::ModelLoad(err.to_string()))?
            .into_runnable()
            .map_err(|err| VisionError::ModelLoad(err.to_string()))?;

        Ok(Self { plan, input_size })
    }
}

impl DetectionModel for OnnxModel {
    fn infer(&self, image: &RgbImage) -> Result<Vec<RawDetection>, VisionError> {
        let (source_w, source_h) = image.dimensions();
        if source_w == 0 || source_h == 0 {
            return Ok(Vec::new());
        }

        let size = self.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, c, y, x)| resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0,
        )
        .into_tensor();

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|err| VisionError::Inference(err.to_string()))?;
        let output = outputs[0]
            .to_array_view::<f32>()
            .map_err(|err| VisionError::Inference(err.to_string()))?;

        decode_predictions(&output, size, source_w, source_h)
    }
}

/// Converts the raw prediction tensor into boxes in source-image pixels.
fn decode_predictions(
    output: &tract_ndarray::ArrayViewD<'_, f32>,
    input_size: u32,
    source_w: u32,
    source_h: u32,
) -> Result<Vec<RawDetection>, VisionError> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
        return Err(VisionError::Inference(format!(
            "unexpected model output shape {shape:?}"
        )));
    }

    let classes = shape[1] - 4;
    let candidates = shape[2];
    let scale_x = source_w as f32 / input_size as f32;
    let scale_y = source_h as f32 / input_size as f32;

    let mut detections = Vec::new();
    for i in 0..candidates {
        let mut best_class = 0;
        let mut best_score = 0.0f32;
        for c in 0..classes {
            let score = output[[0, 4 + c, i]];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }
        if best_score < CANDIDATE_FLOOR {
            continue;
        }

        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];

        detections.push(RawDetection {
            x1: (cx - w / 2.0) * scale_x,
            y1: (cy - h / 2.0) * scale_y,
            x2: (cx + w / 2.0) * scale_x,
            y2: (cy + h / 2.0) * scale_y,
            confidence: best_score,
            class_id: best_class,
        });
    }

    Ok(non_max_suppression(detections, IOU_THRESHOLD, MAX_DETECTIONS))
}

/// Greedy class-agnostic suppression, highest confidence first.
fn non_max_suppression(
    mut detections: Vec<RawDetection>,
    iou_threshold: f32,
    limit: usize,
) -> Vec<RawDetection> {
    detections.retain(|d| d.confidence.is_finite());
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in detections {
        if kept.len() >= limit {
            break;
        }
        if kept.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let left = a.x1.max(b.x1);
    let top = a.y1.max(b.y1);
    let right = a.x2.min(b.x2);
    let bottom = a.y2.min(b.y2);

    let intersection = (right - left).max(0.0) * (bottom - top).max(0.0);
    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - intersection;

    if union <= 0.0 { 0.0 } else { intersection / union }
}
