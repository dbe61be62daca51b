use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of a valid traceability code, in ASCII digits.
pub const TRACE_CODE_LEN: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TraceCodeError {
    #[error("trace code must be {TRACE_CODE_LEN} digits, got {0} bytes")]
    Length(usize),
    #[error("trace code must contain only ASCII digits")]
    NonDigit,
}

/// 20-digit traceability identifier decoded from a package barcode.
///
/// Any decoded payload that is not exactly 20 ASCII digits is rejected;
/// it is not a trace code candidate regardless of barcode symbology.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceCode(String);

impl TraceCode {
    pub fn parse(payload: impl AsRef<str>) -> Result<Self, TraceCodeError> {
        let payload = payload.as_ref();
        if payload.len() != TRACE_CODE_LEN {
            return Err(TraceCodeError::Length(payload.len()));
        }
        if !payload.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TraceCodeError::NonDigit);
        }
        Ok(Self(payload.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TraceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compares two product codes, ignoring case and surrounding whitespace.
/// A side that trims to blank matches nothing.
pub fn product_code_matches(a: impl AsRef<str>, b: impl AsRef<str>) -> bool {
    let a = a.as_ref().trim();
    let b = b.as_ref().trim();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.to_uppercase() == b.to_uppercase()
}

/// Axis-aligned box in pixel coordinates with `x1 < x2` and `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }
}

/// Best-candidate output of the single-detection operation.
///
/// When `detected` is false the box and class are absent; `confidence` is
/// always populated and is 0.0 when inference could not run at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detected: bool,
    pub confidence: f32,
    pub bbox: Option<BoundingBox>,
    pub class_name: Option<String>,
}

impl DetectionResult {
    pub fn miss(confidence: f32) -> Self {
        Self {
            detected: false,
            confidence,
            bbox: None,
            class_name: None,
        }
    }

    pub fn hit(confidence: f32, bbox: BoundingBox, class_name: impl Into<String>) -> Self {
        Self {
            detected: true,
            confidence,
            bbox: Some(bbox),
            class_name: Some(class_name.into()),
        }
    }
}

/// One entry of the all-detections operation. Used for visualization and
/// debugging, never for verification decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

#[cfg(test)]
mod tests {
    use super::{product_code_matches, BoundingBox, DetectionResult, TraceCode, TraceCodeError};

    #[test]
    fn trace_code_accepts_exactly_twenty_digits() {
        let code = TraceCode::parse("20241229001234567890").expect("20 digits should parse");
        assert_eq!(code.as_str(), "20241229001234567890");
    }

    #[test]
    fn trace_code_rejects_wrong_length() {
        assert_eq!(
            TraceCode::parse("1234567890").expect_err("short payload must fail"),
            TraceCodeError::Length(10)
        );
        assert_eq!(
            TraceCode::parse("202412290012345678901").expect_err("long payload must fail"),
            TraceCodeError::Length(21)
        );
        assert_eq!(
            TraceCode::parse("").expect_err("empty payload must fail"),
            TraceCodeError::Length(0)
        );
    }

    #[test]
    fn trace_code_rejects_non_digits() {
        assert_eq!(
            TraceCode::parse("2024122900123456789X").expect_err("letter must fail"),
            TraceCodeError::NonDigit
        );
        assert_eq!(
            TraceCode::parse("20241229 01234567890").expect_err("space must fail"),
            TraceCodeError::NonDigit
        );
    }

    #[test]
    fn trace_code_rejects_non_ascii_digits() {
        // Full-width digits are digits in some locales but not trace codes.
        let err = TraceCode::parse("２０２４１２２９００１２３４５６７８９０")
            .expect_err("full-width digits must fail");
        assert!(matches!(err, TraceCodeError::Length(_)));
    }

    #[test]
    fn product_code_match_ignores_case_and_whitespace() {
        assert!(product_code_matches(" A1 ", "a1"));
        assert!(product_code_matches("VX-20", "vx-20 "));
        assert!(!product_code_matches("VX-20", "VX-21"));
    }

    #[test]
    fn product_code_match_is_commutative() {
        for (a, b) in [(" A1 ", "a1"), ("VX-20", "vx-21"), ("", "  ")] {
            assert_eq!(product_code_matches(a, b), product_code_matches(b, a));
        }
    }

    #[test]
    fn blank_product_code_matches_nothing() {
        assert!(!product_code_matches("", "  "));
        assert!(!product_code_matches("  ", ""));
        assert!(!product_code_matches("", "VX-20"));
        assert!(!product_code_matches("", ""));
    }

    #[test]
    fn detection_miss_has_no_box_or_class() {
        let miss = DetectionResult::miss(0.4);
        assert!(!miss.detected);
        assert_eq!(miss.confidence, 0.4);
        assert!(miss.bbox.is_none());
        assert!(miss.class_name.is_none());
    }

    #[test]
    fn bounding_box_dimensions() {
        let bbox = BoundingBox {
            x1: 480,
            y1: 270,
            x2: 1440,
            y2: 810,
        };
        assert_eq!(bbox.width(), 960);
        assert_eq!(bbox.height(), 540);
    }
}
