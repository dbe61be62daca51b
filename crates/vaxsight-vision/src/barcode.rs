//! Trace code decoding from label imagery.

use image::{DynamicImage, GrayImage, RgbImage};
use rxing::Reader;
use tracing::debug;

use vaxsight_core::TraceCode;

/// Sigma roughly matching a 5x5 Gaussian kernel.
const BLUR_SIGMA: f32 = 1.1;
/// Radius 5 gives an 11x11 adaptive threshold window.
const ADAPTIVE_BLOCK_RADIUS: u32 = 5;

/// Frame-to-trace-code decoding seam.
pub trait TraceScanner: Send + Sync {
    /// Decodes one frame. `None` covers both absent and invalid symbols.
    fn scan(&self, image: &RgbImage) -> Option<TraceCode>;
}

/// Decodes the 20 digit trace code printed next to the vial label.
///
/// Two passes run in order: a cleaned pass (grayscale, blur, adaptive
/// threshold) that lifts low-contrast print, then the raw grayscale as a
/// fallback. The first pass yielding a valid trace code wins. Decoder
/// errors and symbols that are not trace codes both count as no code.
///
/// Each pass reads at most one symbol. On a frame carrying several
/// barcodes the reader keeps whichever symbol it locks onto first, so a
/// stray non-trace symbol can cost a pass; the fallback pass then gives
/// the frame a second look.
#[derive(Clone, Default)]
pub struct BarcodeDecoder;

impl BarcodeDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl TraceScanner for BarcodeDecoder {
    fn scan(&self, image: &RgbImage) -> Option<TraceCode> {
        if image.width() == 0 || image.height() == 0 {
            return None;
        }

        let gray = image::imageops::grayscale(image);
        let cleaned = imageproc::contrast::adaptive_threshold(
            &imageproc::filter::gaussian_blur_f32(&gray, BLUR_SIGMA),
            ADAPTIVE_BLOCK_RADIUS,
        );

        decode_plane(&cleaned).or_else(|| decode_plane(&gray))
    }
}

/// Runs the multi-format reader over one grayscale plane and keeps the
/// text only when it parses as a trace code.
fn decode_plane(gray: &GrayImage) -> Option<TraceCode> {
    let source =
        rxing::BufferedImageLuminanceSource::new(DynamicImage::ImageLuma8(gray.clone()));
    let mut bitmap =
        rxing::BinaryBitmap::new(rxing::common::GlobalHistogramBinarizer::new(source));
    let mut reader = rxing::MultiUseMultiFormatReader::default();

    match reader.decode_with_hints(&mut bitmap, &rxing::DecodingHintDictionary::new()) {
        Ok(result) => {
            let text = result.getText().to_string();
            match TraceCode::parse(&text) {
                Ok(code) => Some(code),
                Err(err) => {
                    debug!(error = %err, "decoded symbol is not a trace code");
                    None
                }
            }
        }
        Err(_) => None,
    }
}
