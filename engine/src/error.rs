//! Error types for the FitSync engine.

use crate::DataKind;
use thiserror::Error;

/// All possible errors from the FitSync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("invalid {kind} record: {reason}")]
    InvalidRecord { kind: DataKind, reason: String },

    #[error("unknown data kind: {0}")]
    UnknownKind(String),

    // Codec errors
    #[error("malformed local {kind} collection: {reason}")]
    MalformedCollection { kind: DataKind, reason: String },

    #[error("malformed {kind} document '{id}': {reason}")]
    MalformedDocument {
        kind: DataKind,
        id: String,
        reason: String,
    },

    #[error("failed to encode {kind} data: {reason}")]
    Encode { kind: DataKind, reason: String },
}

impl Error {
    pub(crate) fn invalid(kind: DataKind, reason: impl Into<String>) -> Self {
        Error::InvalidRecord {
            kind,
            reason: reason.into(),
        }
    }

    pub(crate) fn encode(kind: DataKind, err: serde_json::Error) -> Self {
        Error::Encode {
            kind,
            reason: err.to_string(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::UnknownKind("steps".into());
        assert_eq!(err.to_string(), "unknown data kind: steps");

        let err = Error::invalid(DataKind::Routines, "name must not be blank");
        assert_eq!(
            err.to_string(),
            "invalid routines record: name must not be blank"
        );

        let err = Error::MalformedDocument {
            kind: DataKind::WorkoutLogs,
            id: "doc-1".into(),
            reason: "missing field `reps`".into(),
        };
        assert_eq!(
            err.to_string(),
            "malformed workoutLogs document 'doc-1': missing field `reps`"
        );
    }
}
