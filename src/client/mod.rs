// src/client/mod.rs

//! Client-side installed-version state
//!
//! Tracks which versions are present locally and which one is current.
//! Each install lives in its own directory with the extracted tree, the
//! original compressed archive (kept so later patch upgrades have a local
//! base), and a metadata record. A single pointer file names the current
//! version.
//!
//! Installs are staged: the archive is extracted and verified in a
//! temporary directory and renamed into place only once complete, so a
//! crash mid-install never leaves a half-extracted version looking
//! installed.

use crate::error::{Error, Result};
use crate::hash;
use crate::paths;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const META_FILE: &str = "meta.toml";
const CURRENT_FILE: &str = "current.toml";
const ARCHIVE_FILE: &str = "archive.tar.gz";
const DATA_DIR: &str = "data";

/// One locally installed version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledVersion {
    pub name: String,
    /// XOR-folded SHA-256 of the extracted tree
    pub hash: String,
    /// Total size of the extracted files in bytes
    pub size: u64,
    pub installed_at: DateTime<Utc>,
    /// Extracted tree location, derived from the tracker root
    #[serde(skip)]
    pub path: PathBuf,
}

/// Pointer file naming the current version
#[derive(Debug, Serialize, Deserialize)]
struct CurrentPointer {
    name: String,
}

/// Manages installed versions under a client state root
pub struct InstalledTracker {
    root: PathBuf,
    versions_dir: PathBuf,
}

impl InstalledTracker {
    /// Open (or initialize) the tracker rooted at `root`
    pub fn new(root: &Path) -> Result<Self> {
        let versions_dir = root.join("versions");
        if !versions_dir.exists() {
            fs::create_dir_all(&versions_dir)?;
            debug!("Created client state directory: {}", root.display());
        }

        Ok(Self {
            root: root.to_path_buf(),
            versions_dir,
        })
    }

    fn version_dir(&self, name: &str) -> PathBuf {
        self.versions_dir.join(name)
    }

    /// Retained compressed archive for an installed version
    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.version_dir(name).join(ARCHIVE_FILE)
    }

    /// Install a version from its compressed archive bytes
    ///
    /// Extracts into a staging directory, verifies the extracted tree hash
    /// against `expected_hash` when given, then renames the staged install
    /// into place. An existing install of the same name is replaced.
    pub fn install(
        &self,
        name: &str,
        archive_bytes: &[u8],
        expected_hash: Option<&str>,
        set_current: bool,
    ) -> Result<InstalledVersion> {
        paths::validate_name(name)?;

        // Staged in a sibling dir so the final rename stays on one filesystem
        let staged = tempfile::tempdir_in(&self.versions_dir)?;
        let data_dir = staged.path().join(DATA_DIR);
        fs::create_dir(&data_dir)?;

        let mut archive = tar::Archive::new(GzDecoder::new(archive_bytes));
        archive.unpack(&data_dir)?;

        let summary = hash::hash_tree(&data_dir)?;
        if let Some(expected) = expected_hash
            && summary.hash != expected
        {
            return Err(Error::ChecksumMismatch {
                expected: expected.to_string(),
                actual: summary.hash,
            });
        }

        fs::write(staged.path().join(ARCHIVE_FILE), archive_bytes)?;

        let record = InstalledVersion {
            name: name.to_string(),
            hash: summary.hash,
            size: summary.size,
            installed_at: Utc::now(),
            path: self.version_dir(name).join(DATA_DIR),
        };
        let meta = toml::to_string_pretty(&record)
            .map_err(|e| Error::Config(format!("cannot serialize install record: {e}")))?;
        fs::write(staged.path().join(META_FILE), meta)?;

        let final_dir = self.version_dir(name);
        if final_dir.exists() {
            debug!("Replacing existing install of {name}");
            fs::remove_dir_all(&final_dir)?;
        }

        let staged_path = staged.keep();
        if let Err(e) = fs::rename(&staged_path, &final_dir) {
            let _ = fs::remove_dir_all(&staged_path);
            return Err(e.into());
        }

        if set_current {
            self.set_current(name)?;
        }

        info!(
            "Installed {name} ({} bytes extracted, hash {})",
            record.size,
            &record.hash[..8]
        );
        Ok(record)
    }

    /// Point the current marker at an installed version
    pub fn set_current(&self, name: &str) -> Result<()> {
        if !self.version_dir(name).join(META_FILE).exists() {
            return Err(Error::NotFound(format!("installed version {name}")));
        }

        let pointer = CurrentPointer {
            name: name.to_string(),
        };
        let content = toml::to_string(&pointer)
            .map_err(|e| Error::Config(format!("cannot serialize current pointer: {e}")))?;
        fs::write(self.root.join(CURRENT_FILE), content)?;
        Ok(())
    }

    /// Load one installed version's record
    pub fn get(&self, name: &str) -> Result<Option<InstalledVersion>> {
        let meta_path = self.version_dir(name).join(META_FILE);
        if !meta_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&meta_path)?;
        let mut record: InstalledVersion = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("corrupt install record for {name}: {e}")))?;
        record.path = self.version_dir(name).join(DATA_DIR);
        Ok(Some(record))
    }

    /// The current installed version, if the pointer names a live install
    ///
    /// A pointer to a version whose directory has gone missing is treated
    /// as no current version, not an error.
    pub fn get_current(&self) -> Result<Option<InstalledVersion>> {
        let pointer_path = self.root.join(CURRENT_FILE);
        if !pointer_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&pointer_path)?;
        let pointer: CurrentPointer = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("corrupt current pointer: {e}")))?;

        match self.get(&pointer.name)? {
            Some(record) => Ok(Some(record)),
            None => {
                warn!(
                    "Current pointer names {} but it is not installed",
                    pointer.name
                );
                Ok(None)
            }
        }
    }

    /// List all installed versions, newest install first
    pub fn list_installed(&self) -> Result<Vec<InstalledVersion>> {
        let mut installed = Vec::new();
        for entry in fs::read_dir(&self.versions_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(record) = self.get(&name)? {
                installed.push(record);
            }
        }

        installed.sort_by(|a, b| b.installed_at.cmp(&a.installed_at));
        Ok(installed)
    }

    /// Remove an installed version, clearing the current pointer if it
    /// pointed here
    pub fn delete(&self, name: &str) -> Result<()> {
        let dir = self.version_dir(name);
        if !dir.exists() {
            return Err(Error::NotFound(format!("installed version {name}")));
        }

        let was_current = self
            .get_current()?
            .is_some_and(|current| current.name == name);

        fs::remove_dir_all(&dir)?;
        if was_current {
            fs::remove_file(self.root.join(CURRENT_FILE))?;
            debug!("Cleared current pointer after deleting {name}");
        }

        info!("Removed installed version {name}");
        Ok(())
    }
}
