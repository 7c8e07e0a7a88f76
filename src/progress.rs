// src/progress.rs

//! Progress reporting for long-running client operations
//!
//! The update flow reports coarse stages through this seam so embedders
//! can surface them in a UI while the default CLI path just logs them.

use std::fmt;
use tracing::info;

/// Coarse stage of a download/install operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fetching bytes (full archive or patch file)
    DownloadStart,
    /// Extracting and verifying an install
    InstallStart,
    /// Operation finished
    Complete,
    /// Noteworthy mid-operation event, e.g. a fallback
    Diagnostic,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::DownloadStart => "download",
            Stage::InstallStart => "install",
            Stage::Complete => "complete",
            Stage::Diagnostic => "diagnostic",
        };
        write!(f, "{s}")
    }
}

/// Receives stage notifications during an update
pub trait ProgressTracker {
    fn stage(&self, stage: Stage, detail: &str);
}

/// Logs every stage through tracing
pub struct LogProgress;

impl ProgressTracker for LogProgress {
    fn stage(&self, stage: Stage, detail: &str) {
        info!("[{stage}] {detail}");
    }
}

/// Discards all notifications
pub struct SilentProgress;

impl ProgressTracker for SilentProgress {
    fn stage(&self, _stage: Stage, _detail: &str) {}
}

/// Forwards stages to a caller-supplied closure
pub struct CallbackProgress<F: Fn(Stage, &str)> {
    callback: F,
}

impl<F: Fn(Stage, &str)> CallbackProgress<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F: Fn(Stage, &str)> ProgressTracker for CallbackProgress<F> {
    fn stage(&self, stage: Stage, detail: &str) {
        (self.callback)(stage, detail)
    }
}
