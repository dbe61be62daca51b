use thiserror::Error;

/// Errors surfaced by the pluggable model seams. Recoverable conditions
/// (decode misses, detection below threshold, absent hardware) are plain
/// values, not errors.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("ocr failed: {0}")]
    Ocr(String),
}
