//! Label text extraction seam.

use image::RgbImage;

use vaxsight_core::VisionError;

/// Text extraction backend for label OCR.
///
/// No engine ships in this build; the pipeline treats a missing engine as
/// empty text and carries on. The seam keeps the wire surface stable for
/// when an engine lands.
pub trait OcrEngine: Send + Sync {
    fn extract(&self, image: &RgbImage) -> Result<String, VisionError>;
}
