//! Error types for session description handling

use thiserror::Error;

/// Result type for session description operations
pub type Result<T> = std::result::Result<T, SdpError>;

/// Errors raised while decoding a session description
///
/// Unknown attributes and line types never produce an error; only input
/// that lacks a field the model cannot do without is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdpError {
    /// A line was present but structurally malformed
    #[error("Malformed SDP line '{line}': {reason}")]
    Decode { line: String, reason: String },

    /// A mandatory field was never supplied
    #[error("Missing mandatory SDP field: {field}")]
    MissingField { field: String },
}

impl SdpError {
    /// Create a decode error for a specific line
    pub fn decode(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing-field error
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}
