//! Core domain types for the vaxsight inspection pipeline.

pub mod error;
pub mod outcome;
pub mod types;

pub use error::*;
pub use outcome::*;
pub use types::*;
