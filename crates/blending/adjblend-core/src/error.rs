//! Error and warning types for adjustment blending.
//!
//! Errors abort only the call that raised them; caches and layer stacks are left
//! untouched. Warnings never abort and are returned next to successful results.

use serde::{Deserialize, Serialize};

use adjblend_api_core::{ValueError, ValueKind};

use crate::ids::LayerId;

/// Every failure a core operation can report.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AdjustError {
    /// Bad sampling request (empty range, too few samples, unordered times).
    #[error("Invalid sampling range: {reason}")]
    InvalidRange { reason: String },

    /// Inverted thresholds, non-positive falloff, non-finite values.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Operation on a layer id that is not in the stack.
    #[error("Unknown layer: {id}")]
    UnknownLayer { id: LayerId },

    /// Unrecognized blend mode tag.
    #[error("Unsupported blend mode: {tag}")]
    UnsupportedBlendMode { tag: String },

    /// Unrecognized layer kind tag.
    #[error("Unsupported layer kind: {tag}")]
    UnsupportedLayerKind { tag: String },

    /// Two samples that must share a shape do not.
    #[error("Value shape mismatch: expected {expected:?}[{expected_len}], got {actual:?}[{actual_len}]")]
    ShapeMismatch {
        expected: ValueKind,
        expected_len: usize,
        actual: ValueKind,
        actual_len: usize,
    },

    /// A curve violates its structural invariants.
    #[error("Invalid curve: {reason}")]
    InvalidCurve { reason: String },

    /// The host has no channel with this name.
    #[error("Unknown channel: {channel}")]
    UnknownChannel { channel: String },

    /// A batch was cancelled before this unit ran.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },
}

impl AdjustError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub(crate) fn range(reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            reason: reason.into(),
        }
    }

    pub(crate) fn curve(reason: impl Into<String>) -> Self {
        Self::InvalidCurve {
            reason: reason.into(),
        }
    }

    /// Error category for logging.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidRange { .. } | Self::InvalidConfig { .. } | Self::InvalidCurve { .. } => {
                "validation"
            }
            Self::UnknownLayer { .. } | Self::UnknownChannel { .. } => "lookup",
            Self::UnsupportedBlendMode { .. }
            | Self::UnsupportedLayerKind { .. }
            | Self::ShapeMismatch { .. } => "blend",
            Self::Cancelled => "cancelled",
            Self::Serialization { .. } => "serialization",
        }
    }
}

impl From<ValueError> for AdjustError {
    fn from(err: ValueError) -> Self {
        match err {
            ValueError::ShapeMismatch {
                expected,
                expected_len,
                actual,
                actual_len,
            } => Self::ShapeMismatch {
                expected,
                expected_len,
                actual,
                actual_len,
            },
            ValueError::UnsupportedBlendMode(tag) => Self::UnsupportedBlendMode { tag },
        }
    }
}

impl From<serde_json::Error> for AdjustError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

/// Non-fatal report accumulated alongside a successful result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A contact phase shorter than `min_contact_frames` was left uncorrected.
    ShortContactPhase {
        channel: String,
        start_time: f32,
        end_time: f32,
        frames: usize,
        min_frames: usize,
    },
    /// The curve is too short for region/phase detection.
    TooFewSamples { channel: String, samples: usize },
    /// A layer curve did not share the base time base and was resampled.
    LayerResampled { layer: LayerId, name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_errors_map_onto_the_core_taxonomy() {
        let err: AdjustError = ValueError::UnsupportedBlendMode("screen".into()).into();
        assert_eq!(
            err,
            AdjustError::UnsupportedBlendMode {
                tag: "screen".into()
            }
        );
        assert_eq!(err.category(), "blend");
    }

    #[test]
    fn errors_serialize() {
        let err = AdjustError::config("falloff must be > 0");
        let json = serde_json::to_string(&err).unwrap();
        let back: AdjustError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn warnings_are_tagged() {
        let w = Warning::TooFewSamples {
            channel: "hips.z".into(),
            samples: 2,
        };
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["kind"], "too_few_samples");
    }
}
