//! Frame analysis for the inspection pipeline.
//!
//! The pieces here are synchronous and stateless where possible: a
//! [`Detector`] over an optional ONNX backend, a two-pass
//! [`BarcodeDecoder`], the [`OcrEngine`] seam, and the best-effort
//! [`Archiver`]. Callers move the heavy paths onto blocking tasks.

pub mod archive;
pub mod barcode;
pub mod config;
pub mod detector;
pub mod model;
pub mod ocr;
pub mod onnx;

pub use archive::Archiver;
pub use barcode::{BarcodeDecoder, TraceScanner};
pub use config::{ArchiveConfig, BarcodeConfig, DetectionConfig};
pub use detector::Detector;
pub use model::{DetectionModel, RawDetection};
pub use ocr::OcrEngine;
pub use onnx::OnnxModel;
