// src/engine/mod.rs

//! Patch job engine
//!
//! Owns the per-(source, target) job state machine and drives the external
//! diff tool through the [`PatchTool`] seam. Completed jobs are cached
//! forever: a later `generate` call for the same ordered pair returns the
//! existing record without re-invoking the tool. Failed and Pending jobs
//! are re-enterable.
//!
//! Concurrency: a per-key lock map serializes concurrent `generate` calls
//! on the same ordered pair, so the second caller observes the first
//! caller's Completed row and short-circuits. Distinct keys never contend;
//! generated files are immutable once written.

use crate::db::models::{Download, DownloadKind, Patch, PatchStatus, Version};
use crate::error::{Error, Result};
use crate::store::ArchiveStore;
use crate::tool::PatchTool;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Drives patch-generation jobs against the catalog and content store
pub struct PatchEngine {
    store: ArchiveStore,
    runner: Arc<dyn PatchTool>,
    locks: Mutex<HashMap<(i64, i64), Arc<Mutex<()>>>>,
}

impl PatchEngine {
    pub fn new(store: ArchiveStore, runner: Arc<dyn PatchTool>) -> Self {
        Self {
            store,
            runner,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Content store this engine writes patches into
    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    fn key_lock(&self, source_id: i64, target_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks
            .entry((source_id, target_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Generate (or return the cached) patch for an ordered version pair
    ///
    /// Fails with a not-found error if either version id is unknown. A tool
    /// failure is not an `Err`: it is recorded in the returned record's
    /// Failed status with the captured error text, and the job can be
    /// re-entered by a later call.
    pub fn generate(&self, conn: &Connection, source_id: i64, target_id: i64) -> Result<Patch> {
        let source = Version::require(conn, source_id)?;
        let target = Version::require(conn, target_id)?;

        let key_lock = self.key_lock(source_id, target_id);
        let _guard = key_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let existing = Patch::find_by_pair(conn, source_id, target_id)?;
        if let Some(patch) = &existing
            && patch.status == PatchStatus::Completed
        {
            debug!(
                "Patch {} -> {} already completed, returning cached record",
                source.name, target.name
            );
            return Ok(patch.clone());
        }

        let mut patch = match existing {
            Some(patch) => patch,
            None => {
                let mut patch = Patch::new(source_id, target_id);
                patch.insert(conn)?;
                patch
            }
        };

        // Persist Processing before invoking the tool so concurrent
        // observers never see a stale Pending
        patch.mark_processing(conn)?;
        info!("Generating patch {} -> {}", source.name, target.name);

        let result = self
            .runner
            .diff(Path::new(&source.archive_path), Path::new(&target.archive_path))
            .and_then(|bytes| self.store.store_patch(&source.name, &target.name, &bytes));

        match result {
            Ok((location, size)) => {
                patch.mark_completed(conn, location.display().to_string(), size as i64)?;
                info!(
                    "Patch {} -> {} completed ({} bytes, {:.1}% of full target)",
                    source.name,
                    target.name,
                    size,
                    if target.size > 0 {
                        size as f64 / target.size as f64 * 100.0
                    } else {
                        100.0
                    }
                );
            }
            Err(e) => {
                warn!("Patch {} -> {} failed: {e}", source.name, target.name);
                patch.mark_failed(conn, e.to_string())?;
            }
        }

        Ok(patch)
    }

    /// Generate patches between a newly registered version and every other
    /// version, in both directions
    ///
    /// The combined operation is not atomic: each pair's outcome is
    /// recorded independently and a failure in one pair does not roll back
    /// the others.
    pub fn generate_all_for_version(&self, conn: &Connection, new_id: i64) -> Result<Vec<Patch>> {
        let new_version = Version::require(conn, new_id)?;

        let mut results = Vec::new();
        for other in Version::list_all(conn)? {
            let Some(other_id) = other.id else { continue };
            if other_id == new_id {
                continue;
            }

            for (source_id, target_id) in [(other_id, new_id), (new_id, other_id)] {
                match self.generate(conn, source_id, target_id) {
                    Ok(patch) => results.push(patch),
                    Err(e) => warn!(
                        "Skipping patch pair ({source_id}, {target_id}) for {}: {e}",
                        new_version.name
                    ),
                }
            }
        }

        Ok(results)
    }

    /// Read a registered version's archive bytes, recording the download
    pub fn fetch_version_file(&self, conn: &Connection, version_id: i64) -> Result<Vec<u8>> {
        let version = Version::require(conn, version_id)?;
        let bytes = self.store.fetch(Path::new(&version.archive_path))?;
        Download::record(conn, DownloadKind::Version, version_id)?;
        Ok(bytes)
    }

    /// Read a completed patch's bytes, recording the download
    ///
    /// Fails with not-ready unless the job reached Completed.
    pub fn fetch_patch_file(&self, conn: &Connection, patch_id: i64) -> Result<Vec<u8>> {
        let patch = Patch::find_by_id(conn, patch_id)?
            .ok_or_else(|| Error::NotFound(format!("patch id {patch_id}")))?;

        if patch.status != PatchStatus::Completed {
            return Err(Error::NotReady(format!(
                "patch {patch_id} is {}",
                patch.status
            )));
        }

        let location = patch.patch_path.ok_or_else(|| {
            Error::NotReady(format!("patch {patch_id} completed without a file path"))
        })?;

        let bytes = self.store.fetch(Path::new(&location))?;
        Download::record(conn, DownloadKind::Patch, patch_id)?;
        Ok(bytes)
    }
}
