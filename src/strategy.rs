// src/strategy.rs

//! Update strategy selection and execution
//!
//! Given the client's current install and a requested target version,
//! `decide` picks between doing nothing, downloading the full target
//! archive, and applying a binary patch to the locally retained archive.
//! A patch is worth using only when a completed one exists for the exact
//! (current, target) pair and its size is at most the configured fraction
//! of the full target archive.
//!
//! `execute` carries the chosen strategy out. Patch application is never
//! allowed to strand the client: a tool failure or a hash mismatch on the
//! patched result falls back to the full download.

use crate::client::{InstalledTracker, InstalledVersion};
use crate::db::models::{Patch, PatchStatus, Version};
use crate::engine::PatchEngine;
use crate::error::{Error, Result};
use crate::progress::{ProgressTracker, Stage};
use crate::tool::PatchTool;
use rusqlite::Connection;
use std::fmt;
use std::io::Write;
use tracing::{info, warn};

/// Why a full download was chosen over a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Nothing is installed locally
    NoCurrentVersion,
    /// The installed version is not in the catalog
    CurrentNotInCatalog,
    /// No completed patch exists for the (current, target) pair
    NoCompletedPatch,
    /// A patch exists but saves too little over the full archive
    PatchTooLarge,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reason::NoCurrentVersion => "no version installed",
            Reason::CurrentNotInCatalog => "installed version not in catalog",
            Reason::NoCompletedPatch => "no completed patch for this pair",
            Reason::PatchTooLarge => "patch too large to be worthwhile",
        };
        write!(f, "{s}")
    }
}

/// Chosen path from the current install to the target version
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Target is already installed and current
    NoUpdate,
    /// Download and install the full target archive
    FullDownload { target: Version, reason: Reason },
    /// Apply a patch to the retained current archive
    PatchUpdate {
        patch: Patch,
        current: InstalledVersion,
        target: Version,
    },
}

/// How an executed update actually got the target installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMethod {
    AlreadyCurrent,
    Full,
    Patch,
    /// Patch path was chosen but failed; full download completed the update
    FullAfterPatchFailure,
}

/// Result of executing an update
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub version: String,
    pub method: UpdateMethod,
}

/// Pick the cheapest safe path to `target_name`
///
/// Decision order: unknown target is an error; an already-current target
/// is a no-update; otherwise patch only when the pair has a completed
/// patch whose size is at most `patch_size_ratio` of the target archive.
pub fn decide(
    conn: &Connection,
    current: Option<&InstalledVersion>,
    target_name: &str,
    patch_size_ratio: f64,
) -> Result<Strategy> {
    let target = Version::find_by_name(conn, target_name)?
        .ok_or_else(|| Error::NotFound(format!("version {target_name}")))?;

    let Some(current) = current else {
        return Ok(Strategy::FullDownload {
            target,
            reason: Reason::NoCurrentVersion,
        });
    };

    if current.name == target.name {
        return Ok(Strategy::NoUpdate);
    }

    let Some(current_catalog) = Version::find_by_name(conn, &current.name)? else {
        return Ok(Strategy::FullDownload {
            target,
            reason: Reason::CurrentNotInCatalog,
        });
    };

    let (Some(current_id), Some(target_id)) = (current_catalog.id, target.id) else {
        return Ok(Strategy::FullDownload {
            target,
            reason: Reason::CurrentNotInCatalog,
        });
    };

    let patch = Patch::find_by_pair(conn, current_id, target_id)?;
    let Some(patch) = patch.filter(|p| p.status == PatchStatus::Completed) else {
        return Ok(Strategy::FullDownload {
            target,
            reason: Reason::NoCompletedPatch,
        });
    };

    let Some(patch_size) = patch.size else {
        return Ok(Strategy::FullDownload {
            target,
            reason: Reason::NoCompletedPatch,
        });
    };

    if patch_size as f64 > target.size as f64 * patch_size_ratio {
        info!(
            "Patch {} -> {} is {patch_size} bytes against a {} byte target, not worthwhile",
            current.name, target.name, target.size
        );
        return Ok(Strategy::FullDownload {
            target,
            reason: Reason::PatchTooLarge,
        });
    }

    Ok(Strategy::PatchUpdate {
        patch,
        current: current.clone(),
        target,
    })
}

/// Carry out a chosen strategy, installing the target as current
pub fn execute(
    conn: &Connection,
    engine: &PatchEngine,
    tracker: &InstalledTracker,
    runner: &dyn PatchTool,
    strategy: Strategy,
    progress: &dyn ProgressTracker,
) -> Result<UpdateOutcome> {
    match strategy {
        Strategy::NoUpdate => Ok(UpdateOutcome {
            version: tracker
                .get_current()?
                .map(|v| v.name)
                .unwrap_or_default(),
            method: UpdateMethod::AlreadyCurrent,
        }),

        Strategy::FullDownload { target, reason } => {
            info!("Full download of {}: {reason}", target.name);
            install_full(conn, engine, tracker, &target, progress)?;
            Ok(UpdateOutcome {
                version: target.name,
                method: UpdateMethod::Full,
            })
        }

        Strategy::PatchUpdate {
            patch,
            current,
            target,
        } => {
            let applied =
                try_patch_update(conn, engine, tracker, runner, &patch, &current, &target, progress)?;
            if applied {
                return Ok(UpdateOutcome {
                    version: target.name,
                    method: UpdateMethod::Patch,
                });
            }

            progress.stage(
                Stage::Diagnostic,
                &format!(
                    "patch update failed, falling back to full download of {}",
                    target.name
                ),
            );
            install_full(conn, engine, tracker, &target, progress)?;
            Ok(UpdateOutcome {
                version: target.name,
                method: UpdateMethod::FullAfterPatchFailure,
            })
        }
    }
}

fn install_full(
    conn: &Connection,
    engine: &PatchEngine,
    tracker: &InstalledTracker,
    target: &Version,
    progress: &dyn ProgressTracker,
) -> Result<()> {
    let Some(target_id) = target.id else {
        return Err(Error::NotFound(format!("version {}", target.name)));
    };

    progress.stage(Stage::DownloadStart, &format!("full archive of {}", target.name));
    let bytes = engine.fetch_version_file(conn, target_id)?;

    progress.stage(Stage::InstallStart, &target.name);
    tracker.install(&target.name, &bytes, Some(&target.hash), true)?;
    progress.stage(Stage::Complete, &target.name);
    Ok(())
}

/// Attempt the patch path; `Ok(false)` means fall back to a full download
fn try_patch_update(
    conn: &Connection,
    engine: &PatchEngine,
    tracker: &InstalledTracker,
    runner: &dyn PatchTool,
    patch: &Patch,
    current: &InstalledVersion,
    target: &Version,
    progress: &dyn ProgressTracker,
) -> Result<bool> {
    let Some(patch_id) = patch.id else {
        return Ok(false);
    };

    let source_archive = tracker.archive_path(&current.name);
    if !source_archive.exists() {
        warn!(
            "Retained archive for {} is missing, cannot apply patch",
            current.name
        );
        return Ok(false);
    }

    progress.stage(
        Stage::DownloadStart,
        &format!("patch {} -> {}", current.name, target.name),
    );
    let patch_bytes = engine.fetch_patch_file(conn, patch_id)?;

    let scratch = tempfile::TempDir::new()?;
    let patch_file = scratch.path().join("update.patch");
    let mut file = std::fs::File::create(&patch_file)?;
    file.write_all(&patch_bytes)?;
    file.sync_all()?;
    drop(file);

    let output = scratch.path().join("patched.tar.gz");
    if !runner.apply(&source_archive, &patch_file, &output)? {
        return Ok(false);
    }

    progress.stage(Stage::InstallStart, &target.name);
    let patched_bytes = std::fs::read(&output)?;
    match tracker.install(&target.name, &patched_bytes, Some(&target.hash), true) {
        Ok(_) => {
            progress.stage(Stage::Complete, &target.name);
            Ok(true)
        }
        Err(Error::ChecksumMismatch { expected, actual }) => {
            warn!(
                "Patched archive for {} hashed {actual}, expected {expected}",
                target.name
            );
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
