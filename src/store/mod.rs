// src/store/mod.rs

//! Content store for version archives and generated patch files
//!
//! A registered version becomes a single compressed `.tar.gz` container
//! under `archives/`; generated patches live under `patches/`. Locations
//! are derived deterministically from validated names, so writes to
//! distinct versions never contend. All writes go to a temp file first and
//! are renamed into place, so a container is either fully present or
//! absent.

use crate::error::{Error, Result};
use crate::hash;
use crate::paths;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Result of registering a directory tree in the store
#[derive(Debug, Clone)]
pub struct StoredArchive {
    /// Location of the compressed container
    pub location: PathBuf,
    /// XOR-folded SHA-256 over the tree's files
    pub hash: String,
    /// Sum of all regular file sizes in the tree
    pub size: u64,
}

/// An archive written to scratch space but not yet published under a name
///
/// Archive locations are derived from names, so a container is only
/// renamed to its derived location after the caller has secured the name
/// (the catalog's UNIQUE constraint). Dropping a staged archive removes
/// the scratch file and leaves the store untouched.
pub struct StagedArchive {
    temp: NamedTempFile,
    /// XOR-folded SHA-256 over the tree's files
    pub hash: String,
    /// Sum of all regular file sizes in the tree
    pub size: u64,
    /// Number of regular files in the tree
    pub file_count: usize,
}

/// Store for version archives and patch files
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    archives_dir: PathBuf,
    patches_dir: PathBuf,
}

impl ArchiveStore {
    /// Create a store rooted at `root`, creating the `archives/` and
    /// `patches/` directories if they do not exist yet
    pub fn new(root: &Path) -> Result<Self> {
        let archives_dir = root.join("archives");
        let patches_dir = root.join("patches");

        for dir in [&archives_dir, &patches_dir] {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
                debug!("Created store directory: {}", dir.display());
            }
        }

        Ok(Self {
            archives_dir,
            patches_dir,
        })
    }

    /// Deterministic archive location for a version name
    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.archives_dir.join(format!("{name}.tar.gz"))
    }

    /// Deterministic patch location for an ordered version pair
    pub fn patch_path(&self, source_name: &str, target_name: &str) -> PathBuf {
        self.patches_dir
            .join(format!("{source_name}__{target_name}.patch"))
    }

    /// Archive a directory tree into scratch space under a validated name
    ///
    /// Computes the tree hash and total size and writes the compressed
    /// container to a temp file in the archives directory. Nothing at the
    /// name's derived location is touched until [`Self::publish`].
    pub fn stage(&self, source_dir: &Path, name: &str) -> Result<StagedArchive> {
        paths::validate_name(name)?;
        let source_dir = paths::canonical_dir(source_dir)?;

        let summary = hash::hash_tree(&source_dir)?;

        let temp = NamedTempFile::new_in(&self.archives_dir)?;
        let encoder = GzEncoder::new(temp, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all(".", &source_dir)?;
        let encoder = builder.into_inner()?;
        let temp = encoder.finish()?;
        temp.as_file().sync_all()?;

        debug!(
            "Staged archive for {name} ({} files, {} bytes, hash {})",
            summary.file_count,
            summary.size,
            &summary.hash[..8]
        );

        Ok(StagedArchive {
            temp,
            hash: summary.hash,
            size: summary.size,
            file_count: summary.file_count,
        })
    }

    /// Rename a staged archive into its derived location
    ///
    /// An existing container for the same name is replaced atomically.
    pub fn publish(&self, staged: StagedArchive, name: &str) -> Result<StoredArchive> {
        let location = self.archive_path(name);
        staged
            .temp
            .persist(&location)
            .map_err(|e| Error::Io(e.error))?;

        info!(
            "Registered archive {} ({} files, {} bytes, hash {})",
            location.display(),
            staged.file_count,
            staged.size,
            &staged.hash[..8]
        );

        Ok(StoredArchive {
            location,
            hash: staged.hash,
            size: staged.size,
        })
    }

    /// Archive a directory tree under a validated name in one step
    pub fn register(&self, source_dir: &Path, name: &str) -> Result<StoredArchive> {
        let staged = self.stage(source_dir, name)?;
        self.publish(staged, name)
    }

    /// Store generated patch bytes for an ordered version pair
    ///
    /// Returns the patch location and byte size. Same atomic-replace
    /// discipline as archives.
    pub fn store_patch(
        &self,
        source_name: &str,
        target_name: &str,
        bytes: &[u8],
    ) -> Result<(PathBuf, u64)> {
        paths::validate_name(source_name)?;
        paths::validate_name(target_name)?;

        let location = self.patch_path(source_name, target_name);

        let mut temp = NamedTempFile::new_in(&self.patches_dir)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(&location)
            .map_err(|e| Error::Io(e.error))?;

        debug!(
            "Stored patch {} ({} bytes)",
            location.display(),
            bytes.len()
        );

        Ok((location, bytes.len() as u64))
    }

    /// Read a stored object's bytes
    pub fn fetch(&self, location: &Path) -> Result<Vec<u8>> {
        if !location.exists() {
            return Err(Error::NotFound(format!(
                "stored object missing: {}",
                location.display()
            )));
        }
        Ok(fs::read(location)?)
    }

    /// Check whether a stored object exists
    pub fn exists(&self, location: &Path) -> bool {
        location.exists()
    }

    /// Delete a stored object; deleting a missing object is not an error
    pub fn delete(&self, location: &Path) -> Result<()> {
        match fs::remove_file(location) {
            Ok(()) => {
                debug!("Deleted stored object: {}", location.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
