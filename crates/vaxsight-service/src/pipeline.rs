//! Station operations: recognition, single scan, trace verification.

use std::sync::Arc;

use image::RgbImage;
use tokio::task::{self, JoinError};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use vaxsight_camera::CameraManager;
use vaxsight_core::{
    DetectionResult, RecognitionOutcome, ScanOutcome, TraceCode, VerifyOutcome,
    product_code_matches,
};
use vaxsight_vision::{Archiver, BarcodeConfig, Detector, OcrEngine, TraceScanner};

pub const IMAGE_UNAVAILABLE: &str = "unable to acquire image";
pub const NO_VACCINE: &str = "no vaccine detected";
pub const RECOGNIZED: &str = "recognition successful";
pub const PRODUCT_MISMATCH: &str = "product code mismatch";
pub const SCANNED: &str = "scan successful";
pub const NO_BARCODE: &str = "no barcode detected";
pub const VERIFIED: &str = "verification passed";
pub const TRACE_MISMATCH: &str = "trace code mismatch";
pub const TRACE_UNREADABLE: &str = "cannot identify trace code";

/// Identifier used in archive file names when no trace code was read.
const UNKNOWN_IDENTIFIER: &str = "unknown";

/// Wires the camera, detector, trace scanner, OCR seam, and archiver into
/// the three station operations.
///
/// Operations never fail at the type level: every path ends in an outcome
/// whose message carries the verdict. Frames supplied by the caller are
/// used as-is; an empty payload means the station captures live.
#[derive(Clone)]
pub struct RecognitionPipeline {
    camera: CameraManager,
    detector: Detector,
    scanner: Arc<dyn TraceScanner>,
    ocr: Option<Arc<dyn OcrEngine>>,
    archiver: Archiver,
    barcode: BarcodeConfig,
}

impl RecognitionPipeline {
    pub fn new(
        camera: CameraManager,
        detector: Detector,
        scanner: Arc<dyn TraceScanner>,
        ocr: Option<Arc<dyn OcrEngine>>,
        archiver: Archiver,
        barcode: BarcodeConfig,
    ) -> Self {
        Self {
            camera,
            detector,
            scanner,
            ocr,
            archiver,
            barcode,
        }
    }

    /// Full recognition: presence gate, trace scan, label text, archive,
    /// and the optional product code check.
    #[instrument(skip_all, fields(live = image_bytes.is_empty()))]
    pub async fn recognize(
        &self,
        image_bytes: &[u8],
        expected_product_code: &str,
    ) -> RecognitionOutcome {
        let Some((image, _live)) = self.acquire(image_bytes).await else {
            return RecognitionOutcome::failure(IMAGE_UNAVAILABLE);
        };
        let image = Arc::new(image);

        let detection = match self.detect(Arc::clone(&image)).await {
            Ok(detection) => detection,
            Err(err) => {
                return RecognitionOutcome::failure(format!("recognition error: {err}"));
            }
        };
        if !detection.detected {
            debug!(
                confidence = detection.confidence,
                "presence gate rejected frame"
            );
            return RecognitionOutcome::failure(NO_VACCINE);
        }

        let trace = match self.scan_once(Arc::clone(&image)).await {
            Ok(trace) => trace,
            Err(err) => {
                return RecognitionOutcome::failure(format!("recognition error: {err}"));
            }
        };
        let product_code = self.extract_text(Arc::clone(&image)).await;

        let trace_code = trace.map(TraceCode::into_string).unwrap_or_default();
        let identifier = if trace_code.is_empty() {
            UNKNOWN_IDENTIFIER
        } else {
            trace_code.as_str()
        };
        let image_path = self.archiver.save((*image).clone(), identifier).await;

        if !expected_product_code.is_empty()
            && !product_code_matches(&product_code, expected_product_code)
        {
            info!(expected = expected_product_code, "product code mismatch");
            return RecognitionOutcome {
                message: PRODUCT_MISMATCH.to_string(),
                trace_code,
                image_path,
                ..RecognitionOutcome::default()
            };
        }

        info!(
            confidence = detection.confidence,
            trace = %trace_code,
            "recognition complete"
        );
        RecognitionOutcome {
            success: true,
            message: RECOGNIZED.to_string(),
            product_code,
            trace_code,
            confidence: detection.confidence,
            image_path,
        }
    }

    /// Single decode pass over the supplied or captured frame. Never
    /// archives and never retries.
    #[instrument(skip_all, fields(live = image_bytes.is_empty()))]
    pub async fn scan_barcode(&self, image_bytes: &[u8]) -> ScanOutcome {
        let Some((image, _live)) = self.acquire(image_bytes).await else {
            return ScanOutcome::failure(IMAGE_UNAVAILABLE);
        };

        match self.scan_once(Arc::new(image)).await {
            Ok(Some(code)) => {
                info!(trace = %code, "trace code read");
                ScanOutcome {
                    success: true,
                    message: SCANNED.to_string(),
                    trace_code: code.into_string(),
                }
            }
            Ok(None) => ScanOutcome::failure(NO_BARCODE),
            Err(err) => ScanOutcome::failure(format!("scan error: {err}")),
        }
    }

    /// Trace verification against the expected code.
    ///
    /// A caller-supplied frame gets exactly one decode pass; rescanning the
    /// same bytes cannot change the answer. Live captures retry up to the
    /// configured count, grabbing a fresh frame after each miss.
    #[instrument(skip_all, fields(live = image_bytes.is_empty()))]
    pub async fn verify(&self, image_bytes: &[u8], expected_trace_code: &str) -> VerifyOutcome {
        let Some((image, live)) = self.acquire(image_bytes).await else {
            return VerifyOutcome::failure(IMAGE_UNAVAILABLE);
        };

        let attempts = if live {
            self.barcode.retry_count.max(1)
        } else {
            1
        };

        let mut frame = Arc::new(image);
        let mut code = None;
        for attempt in 1..=attempts {
            code = match self.scan_once(Arc::clone(&frame)).await {
                Ok(code) => code,
                Err(err) => {
                    return VerifyOutcome::failure(format!("verification error: {err}"));
                }
            };
            if code.is_some() {
                break;
            }
            if attempt < attempts {
                debug!(attempt, "trace code not found, retrying with a fresh frame");
                sleep(self.barcode.retry_backoff()).await;
                frame = Arc::new(self.camera.capture().await);
            }
        }

        let Some(code) = code else {
            info!(attempts, "trace code unreadable");
            return VerifyOutcome::failure(TRACE_UNREADABLE);
        };

        let code = code.into_string();
        let image_path = self.archiver.save((*frame).clone(), &code).await;

        if code == expected_trace_code {
            info!(trace = %code, "trace code verified");
            return VerifyOutcome {
                matched: true,
                message: VERIFIED.to_string(),
                actual_trace_code: code,
                confidence: 1.0,
                image_path,
            };
        }

        info!(
            expected = expected_trace_code,
            actual = %code,
            "trace code mismatch"
        );
        VerifyOutcome {
            message: TRACE_MISMATCH.to_string(),
            actual_trace_code: code,
            image_path,
            ..VerifyOutcome::default()
        }
    }

    /// Frame for one request: decoded caller bytes, or a live grab when
    /// the payload is empty. `None` means the supplied bytes are not a
    /// decodable image.
    async fn acquire(&self, image_bytes: &[u8]) -> Option<(RgbImage, bool)> {
        if image_bytes.is_empty() {
            return Some((self.camera.capture().await, true));
        }
        match image::load_from_memory(image_bytes) {
            Ok(image) => Some((image.to_rgb8(), false)),
            Err(err) => {
                warn!(error = %err, "request image failed to decode");
                None
            }
        }
    }

    async fn detect(&self, image: Arc<RgbImage>) -> Result<DetectionResult, JoinError> {
        let detector = self.detector.clone();
        task::spawn_blocking(move || detector.detect(&image)).await
    }

    /// One decode pass bounded by the configured timeout. A pass that
    /// overruns is abandoned and counts as no code.
    async fn scan_once(&self, image: Arc<RgbImage>) -> Result<Option<TraceCode>, JoinError> {
        let scanner = Arc::clone(&self.scanner);
        let scan = task::spawn_blocking(move || scanner.scan(&image));
        match timeout(self.barcode.timeout(), scan).await {
            Ok(result) => result,
            Err(_) => {
                warn!("trace code decode timed out");
                Ok(None)
            }
        }
    }

    /// Label text through the OCR seam. Missing engine and extraction
    /// failures both come back as empty text.
    async fn extract_text(&self, image: Arc<RgbImage>) -> String {
        let Some(engine) = self.ocr.clone() else {
            return String::new();
        };
        match task::spawn_blocking(move || engine.extract(&image)).await {
            Ok(Ok(text)) => text.trim().to_string(),
            Ok(Err(err)) => {
                warn!(error = %err, "text extraction failed");
                String::new()
            }
            Err(err) => {
                warn!(error = %err, "text extraction task failed");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use vaxsight_camera::{Camera, CameraConfig};
    use vaxsight_core::VisionError;
    use vaxsight_vision::model::{DetectionModel, RawDetection};
    use vaxsight_vision::{ArchiveConfig, BarcodeDecoder};

    const CODE: &str = "20241229001234567890";

    struct CountingCamera {
        captures: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Camera for CountingCamera {
        async fn open(&mut self) -> bool {
            true
        }

        async fn capture(&mut self) -> Option<RgbImage> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            Some(RgbImage::from_pixel(64, 64, image::Rgb([90, 90, 90])))
        }

        async fn close(&mut self) {}

        fn is_open(&self) -> bool {
            true
        }
    }

    struct FixedScanner(Option<TraceCode>);

    impl TraceScanner for FixedScanner {
        fn scan(&self, _image: &RgbImage) -> Option<TraceCode> {
            self.0.clone()
        }
    }

    struct CountingScanner {
        hits_after: usize,
        calls: AtomicUsize,
    }

    impl CountingScanner {
        fn new(hits_after: usize) -> Self {
            Self {
                hits_after,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TraceScanner for CountingScanner {
        fn scan(&self, _image: &RgbImage) -> Option<TraceCode> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            (call >= self.hits_after).then(|| trace_code())
        }
    }

    struct FixedOcr(&'static str);

    impl OcrEngine for FixedOcr {
        fn extract(&self, _image: &RgbImage) -> Result<String, VisionError> {
            Ok(self.0.to_string())
        }
    }

    struct BrokenOcr;

    impl OcrEngine for BrokenOcr {
        fn extract(&self, _image: &RgbImage) -> Result<String, VisionError> {
            Err(VisionError::Ocr("engine offline".to_string()))
        }
    }

    struct EmptyModel;

    impl DetectionModel for EmptyModel {
        fn infer(&self, _image: &RgbImage) -> Result<Vec<RawDetection>, VisionError> {
            Ok(Vec::new())
        }
    }

    fn trace_code() -> TraceCode {
        TraceCode::parse(CODE).expect("test code should parse")
    }

    fn offline_camera() -> CameraManager {
        CameraManager::new(CameraConfig {
            enabled: false,
            width: 320,
            height: 240,
            ..CameraConfig::default()
        })
    }

    /// Camera manager backed by a frame source that counts captures.
    async fn counting_camera() -> (CameraManager, Arc<AtomicUsize>) {
        let camera = offline_camera();
        let captures = Arc::new(AtomicUsize::new(0));
        camera
            .install(Box::new(CountingCamera {
                captures: Arc::clone(&captures),
            }))
            .await;
        (camera, captures)
    }

    fn pipeline_at(
        root: &Path,
        detector: Detector,
        scanner: Arc<dyn TraceScanner>,
        ocr: Option<Arc<dyn OcrEngine>>,
    ) -> RecognitionPipeline {
        pipeline_with(root, offline_camera(), detector, scanner, ocr)
    }

    fn pipeline_with(
        root: &Path,
        camera: CameraManager,
        detector: Detector,
        scanner: Arc<dyn TraceScanner>,
        ocr: Option<Arc<dyn OcrEngine>>,
    ) -> RecognitionPipeline {
        let archiver = Archiver::new(&ArchiveConfig {
            enabled: true,
            root: root.to_string_lossy().into_owned(),
            retention_days: 30,
        });
        let barcode = BarcodeConfig {
            retry_backoff_ms: 1,
            ..BarcodeConfig::default()
        };
        RecognitionPipeline::new(camera, detector, scanner, ocr, archiver, barcode)
    }

    fn simulated_detector() -> Detector {
        Detector::new(None, 0.85)
    }

    fn missing_detector() -> Detector {
        Detector::new(Some(Arc::new(EmptyModel)), 0.85)
    }

    fn png_bytes() -> Vec<u8> {
        let image = RgbImage::from_pixel(64, 64, image::Rgb([200, 200, 200]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("png encoding should succeed");
        bytes
    }

    #[tokio::test]
    async fn recognize_live_frame_without_expected_code_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let pipeline = pipeline_at(
            dir.path(),
            simulated_detector(),
            Arc::new(FixedScanner(None)),
            None,
        );

        let outcome = pipeline.recognize(&[], "").await;

        assert!(outcome.success);
        assert_eq!(outcome.message, RECOGNIZED);
        assert_eq!(outcome.confidence, 0.95);
        assert_eq!(outcome.product_code, "");
        assert_eq!(outcome.trace_code, "");
        let path = Path::new(&outcome.image_path);
        assert!(path.exists());
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("archived file should have a name");
        assert!(name.starts_with("unknown_"));
    }

    #[tokio::test]
    async fn recognize_reports_missing_vaccine_without_archiving() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let pipeline = pipeline_at(
            dir.path(),
            missing_detector(),
            Arc::new(FixedScanner(Some(trace_code()))),
            None,
        );

        let outcome = pipeline.recognize(&[], "").await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, NO_VACCINE);
        assert_eq!(outcome.image_path, "");
        let entries = std::fs::read_dir(dir.path()).expect("root should list").count();
        assert_eq!(entries, 0);
    }

    #[tokio::test]
    async fn recognize_rejects_malformed_image_bytes() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let pipeline = pipeline_at(
            dir.path(),
            simulated_detector(),
            Arc::new(FixedScanner(None)),
            None,
        );

        let outcome = pipeline.recognize(b"not an image", "").await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, IMAGE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn recognize_mismatch_still_reports_trace_and_archive() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let pipeline = pipeline_at(
            dir.path(),
            simulated_detector(),
            Arc::new(FixedScanner(Some(trace_code()))),
            None,
        );

        let outcome = pipeline.recognize(&[], "VAX-001").await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, PRODUCT_MISMATCH);
        assert_eq!(outcome.trace_code, CODE);
        assert_eq!(outcome.product_code, "");
        assert_eq!(outcome.confidence, 0.0);
        assert!(Path::new(&outcome.image_path).exists());
        assert!(outcome.image_path.contains(CODE));
    }

    #[tokio::test]
    async fn recognize_matches_product_code_loosely() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let pipeline = pipeline_at(
            dir.path(),
            simulated_detector(),
            Arc::new(FixedScanner(Some(trace_code()))),
            Some(Arc::new(FixedOcr("  vax-001  "))),
        );

        let outcome = pipeline.recognize(&[], "VAX-001").await;

        assert!(outcome.success);
        assert_eq!(outcome.product_code, "vax-001");
        assert_eq!(outcome.trace_code, CODE);
        assert_eq!(outcome.confidence, 0.95);
    }

    #[tokio::test]
    async fn recognize_without_ocr_rejects_whitespace_expectation() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let pipeline = pipeline_at(
            dir.path(),
            simulated_detector(),
            Arc::new(FixedScanner(Some(trace_code()))),
            None,
        );

        let outcome = pipeline.recognize(&[], "  ").await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, PRODUCT_MISMATCH);
        assert_eq!(outcome.product_code, "");
        assert_eq!(outcome.trace_code, CODE);
    }

    #[tokio::test]
    async fn recognize_survives_ocr_failure() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let pipeline = pipeline_at(
            dir.path(),
            simulated_detector(),
            Arc::new(FixedScanner(None)),
            Some(Arc::new(BrokenOcr)),
        );

        let outcome = pipeline.recognize(&[], "").await;

        assert!(outcome.success);
        assert_eq!(outcome.product_code, "");
    }

    #[tokio::test]
    async fn recognize_accepts_supplied_png() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let pipeline = pipeline_at(
            dir.path(),
            simulated_detector(),
            Arc::new(FixedScanner(None)),
            None,
        );

        let outcome = pipeline.recognize(&png_bytes(), "").await;

        assert!(outcome.success);
        assert_eq!(outcome.message, RECOGNIZED);
    }

    #[tokio::test]
    async fn scan_barcode_reports_code() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let pipeline = pipeline_at(
            dir.path(),
            simulated_detector(),
            Arc::new(FixedScanner(Some(trace_code()))),
            None,
        );

        let outcome = pipeline.scan_barcode(&[]).await;

        assert!(outcome.success);
        assert_eq!(outcome.message, SCANNED);
        assert_eq!(outcome.trace_code, CODE);
    }

    #[tokio::test]
    async fn scan_barcode_reports_no_barcode() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let pipeline = pipeline_at(
            dir.path(),
            simulated_detector(),
            Arc::new(FixedScanner(None)),
            None,
        );

        let outcome = pipeline.scan_barcode(&[]).await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, NO_BARCODE);
        assert_eq!(outcome.trace_code, "");
    }

    #[tokio::test]
    async fn scan_barcode_rejects_malformed_bytes_without_scanning() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let scanner = Arc::new(CountingScanner::new(1));
        let pipeline = pipeline_at(dir.path(), simulated_detector(), scanner.clone(), None);

        let outcome = pipeline.scan_barcode(b"not an image").await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, IMAGE_UNAVAILABLE);
        assert_eq!(scanner.calls(), 0);
    }

    #[tokio::test]
    async fn scan_barcode_never_archives() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let pipeline = pipeline_at(
            dir.path(),
            simulated_detector(),
            Arc::new(FixedScanner(Some(trace_code()))),
            None,
        );

        pipeline.scan_barcode(&[]).await;

        let entries = std::fs::read_dir(dir.path()).expect("root should list").count();
        assert_eq!(entries, 0);
    }

    #[tokio::test]
    async fn verify_passes_on_exact_match() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let scanner = Arc::new(CountingScanner::new(1));
        let pipeline = pipeline_at(dir.path(), simulated_detector(), scanner.clone(), None);

        let outcome = pipeline.verify(&[], CODE).await;

        assert!(outcome.matched);
        assert_eq!(outcome.message, VERIFIED);
        assert_eq!(outcome.actual_trace_code, CODE);
        assert_eq!(outcome.confidence, 1.0);
        assert!(Path::new(&outcome.image_path).exists());
        assert_eq!(scanner.calls(), 1);
    }

    #[tokio::test]
    async fn verify_reports_mismatch_with_actual_code() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let pipeline = pipeline_at(
            dir.path(),
            simulated_detector(),
            Arc::new(FixedScanner(Some(trace_code()))),
            None,
        );

        let outcome = pipeline.verify(&[], "00000000000000000000").await;

        assert!(!outcome.matched);
        assert_eq!(outcome.message, TRACE_MISMATCH);
        assert_eq!(outcome.actual_trace_code, CODE);
        assert_eq!(outcome.confidence, 0.0);
        assert!(Path::new(&outcome.image_path).exists());
    }

    #[tokio::test]
    async fn verify_retries_live_capture_until_code_found() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let (camera, captures) = counting_camera().await;
        let scanner = Arc::new(CountingScanner::new(2));
        let pipeline = pipeline_with(
            dir.path(),
            camera,
            simulated_detector(),
            scanner.clone(),
            None,
        );

        let outcome = pipeline.verify(&[], CODE).await;

        assert!(outcome.matched);
        assert_eq!(scanner.calls(), 2);
        assert_eq!(captures.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn verify_exhausts_retries_then_reports_unreadable() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let (camera, captures) = counting_camera().await;
        let scanner = Arc::new(CountingScanner::new(usize::MAX));
        let pipeline = pipeline_with(
            dir.path(),
            camera,
            simulated_detector(),
            scanner.clone(),
            None,
        );

        let outcome = pipeline.verify(&[], CODE).await;

        assert!(!outcome.matched);
        assert_eq!(outcome.message, TRACE_UNREADABLE);
        assert_eq!(outcome.actual_trace_code, "");
        assert_eq!(outcome.image_path, "");
        assert_eq!(scanner.calls(), 3);
        // The initial grab plus one recapture per backoff: three captures
        // means two waits, both between attempts, none after the last.
        assert_eq!(captures.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn verify_scans_supplied_image_exactly_once() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let (camera, captures) = counting_camera().await;
        let scanner = Arc::new(CountingScanner::new(usize::MAX));
        let pipeline = pipeline_with(
            dir.path(),
            camera,
            simulated_detector(),
            scanner.clone(),
            None,
        );

        let outcome = pipeline.verify(&png_bytes(), CODE).await;

        assert!(!outcome.matched);
        assert_eq!(outcome.message, TRACE_UNREADABLE);
        assert_eq!(scanner.calls(), 1);
        assert_eq!(captures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn verify_with_empty_expected_code_is_a_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let pipeline = pipeline_at(
            dir.path(),
            simulated_detector(),
            Arc::new(FixedScanner(Some(trace_code()))),
            None,
        );

        let outcome = pipeline.verify(&[], "").await;

        assert!(!outcome.matched);
        assert_eq!(outcome.message, TRACE_MISMATCH);
    }

    #[tokio::test]
    async fn real_decoder_finds_nothing_in_offline_frame() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let pipeline = pipeline_at(
            dir.path(),
            simulated_detector(),
            Arc::new(BarcodeDecoder::new()),
            None,
        );

        let outcome = pipeline.scan_barcode(&[]).await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, NO_BARCODE);
    }
}
