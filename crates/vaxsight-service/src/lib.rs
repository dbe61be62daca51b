//! Recognition pipeline and gRPC surface for the inspection station.
//!
//! [`RecognitionPipeline`] wires the camera, detector, trace scanner, OCR
//! seam, and archiver into the three station operations. [`grpc`] exposes
//! those operations as the wire service with lifecycle management.

pub mod grpc;
pub mod pipeline;

pub use grpc::{ServerState, VisionGrpcServer};
pub use pipeline::RecognitionPipeline;
