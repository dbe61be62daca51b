use serde::{Deserialize, Serialize};

/// Terminal result of a Recognize operation. Empty string fields mean the
/// value was not produced; outcomes are built once and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionOutcome {
    pub success: bool,
    pub message: String,
    pub product_code: String,
    pub trace_code: String,
    pub confidence: f32,
    pub image_path: String,
}

impl RecognitionOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Terminal result of a ScanBarcode operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub success: bool,
    pub message: String,
    pub trace_code: String,
}

impl ScanOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Terminal result of a Verify operation. `actual_trace_code` is populated
/// whenever a code was decoded, matched or not, for audit purposes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub matched: bool,
    pub message: String,
    pub actual_trace_code: String,
    pub confidence: f32,
    pub image_path: String,
}

impl VerifyOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}
