// src/error.rs

//! Crate-wide error type for deltaforge
//!
//! Every failure carries a machine-readable kind (see [`Error::kind`]) plus
//! human-readable detail, so callers can render structured error payloads
//! without parsing message strings.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Deltaforge error taxonomy
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed name, unreachable path, or empty input. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Path from an untrusted source attempted to escape its root
    #[error("path traversal attempt: {0}")]
    PathTraversal(String),

    /// Referenced version or patch does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate version name on creation; caller must pick a new name
    #[error("conflict: {0}")]
    Conflict(String),

    /// Patch file requested before its job reached Completed
    #[error("patch not ready: {0}")]
    NotReady(String),

    /// External diff/apply tool exited non-zero or produced no output
    #[error("tool failed with exit code {exit_code}: {stderr}")]
    Tool { exit_code: i32, stderr: String },

    /// External tool exceeded its timeout and was killed
    #[error("tool timed out after {0} seconds")]
    ToolTimeout(u64),

    /// Content hash did not match the recorded value
    #[error("hash mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Configuration file could not be read or parsed
    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Machine-readable error kind for structured payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::PathTraversal(_) => "path-traversal",
            Error::NotFound(_) => "not-found",
            Error::Conflict(_) => "conflict",
            Error::NotReady(_) => "not-ready",
            Error::Tool { .. } => "tool",
            Error::ToolTimeout(_) => "tool-timeout",
            Error::ChecksumMismatch { .. } => "checksum-mismatch",
            Error::Config(_) => "config",
            Error::Database(_) => "database",
            Error::Io(_) => "io",
        }
    }
}
