//! Error types for the knowledge-graph provisioner.
//!
//! Mirrors the error taxonomy of spec §7: not-found and validation failures
//! are returned as `Err`, a conflict-block during merge is a first-class
//! variant carrying the evidence payload (not a generic failure), and
//! external/integrity failures are handled by the caller (degrade-and-log,
//! see `tracing` call sites in `staging` and `gap_analysis`) rather than
//! surfaced here.

use thiserror::Error;

use crate::cluster::ConflictRecord;

/// Primary error type for the provisioner core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A cluster, entity, spoke, template, or candidate id did not resolve.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Input failed validation without mutating any state.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A `merge` hit an unresolved IDENTITY conflict. Non-destructive: the
    /// candidate entity was not touched. Caller must re-invoke with
    /// `confirm_merge` or resolve the conflicts first.
    #[error("merge blocked by {} identity conflict(s)", .conflicts.len())]
    ConflictBlocked {
        conflicts: Vec<ConflictRecord>,
        evidence: Vec<String>,
    },

    /// An action name or other caller-controlled enum value was unrecognized.
    /// This is a programming error the caller could have validated.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// Underlying I/O failure (reading/writing store records).
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unexpected internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound { kind, id: id.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message() {
        let err = Error::not_found("entity", "ENT-ZQ-001");
        assert_eq!(err.to_string(), "entity not found: ENT-ZQ-001");
    }

    #[test]
    fn conflict_blocked_message_counts_conflicts() {
        let err = Error::ConflictBlocked {
            conflicts: vec![],
            evidence: vec!["handle mismatch".into()],
        };
        assert!(err.to_string().contains("0 identity"));
    }

    #[test]
    fn json_error_converts() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("not json");
        let err: Error = bad.unwrap_err().into();
        matches!(err, Error::Serialization(_));
    }
}
