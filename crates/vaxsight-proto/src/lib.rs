//! Generated protobuf and gRPC bindings for the vaxsight vision service.

/// Namespace for all generated protobuf packages.
pub mod vaxsight {
    pub mod vision {
        tonic::include_proto!("vaxsight.vision");
    }
}

pub use vaxsight::vision;
