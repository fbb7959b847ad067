//! Safe-output pipeline errors
//!
//! All of these are per-item: the pipeline isolates failures and keeps
//! processing the rest of the stream. Nothing here aborts a run.

use thiserror::Error;
use warden_core::SafeOutputKind;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SafeOutputError {
    #[error("line {line}: malformed safe-output item: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("{kind}: missing required field '{field}'")]
    MissingField { kind: SafeOutputKind, field: String },

    #[error("unresolved reference '{placeholder}' (target not applied earlier in the stream)")]
    UnresolvedReference { placeholder: String },

    #[error("temporary id '{placeholder}' registered more than once")]
    DuplicateTemporaryId { placeholder: String },

    #[error("{kind} handler failed: {reason}")]
    Handler { kind: SafeOutputKind, reason: String },
}

pub type Result<T> = std::result::Result<T, SafeOutputError>;
