// src/paths.rs

//! Name validation and path sanitization
//!
//! Version names and file paths flow into archive locations and external
//! tool invocations, so everything user-supplied is validated here before
//! it touches the filesystem or a subprocess argument array.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Maximum length of a version name
pub const MAX_NAME_LEN: usize = 200;

/// Characters never allowed in a version name
///
/// Covers path separators, shell-sensitive characters, and characters
/// reserved by common filesystems.
const FORBIDDEN_NAME_CHARS: &[char] = &[
    '/', '\\', ':', '*', '?', '"', '<', '>', '|', ';', '&', '$', '`', '\'', ' ',
];

/// Validate a version name from an untrusted source
///
/// Rejects empty names, names longer than [`MAX_NAME_LEN`], names that are
/// `.` or `..`, and names containing control or filesystem-reserved
/// characters. Names end up as archive file names and subprocess arguments,
/// so this check is security-bearing, not cosmetic.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("version name is empty".to_string()));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "version name exceeds {} characters: {}",
            MAX_NAME_LEN,
            name.len()
        )));
    }

    if name == "." || name == ".." {
        return Err(Error::Validation(format!("invalid version name: {name}")));
    }

    if let Some(c) = name
        .chars()
        .find(|c| c.is_control() || FORBIDDEN_NAME_CHARS.contains(c))
    {
        return Err(Error::Validation(format!(
            "version name contains forbidden character {c:?}: {name}"
        )));
    }

    Ok(())
}

/// Reject paths that contain parent-directory components
///
/// Applied to caller-supplied paths *before* canonicalization, so a
/// traversal attempt is reported as such rather than silently resolved.
fn reject_traversal(path: &Path) -> Result<()> {
    for component in path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(Error::PathTraversal(path.display().to_string()));
        }
    }
    Ok(())
}

/// Resolve an untrusted path to an existing regular file
///
/// The path must contain no `..` segments and must canonicalize to a
/// regular file. Used for every path handed to the external diff/apply
/// tools.
pub fn canonical_file(path: &Path) -> Result<PathBuf> {
    reject_traversal(path)?;

    let resolved = path
        .canonicalize()
        .map_err(|_| Error::Validation(format!("file does not exist: {}", path.display())))?;

    if !resolved.is_file() {
        return Err(Error::Validation(format!(
            "not a regular file: {}",
            resolved.display()
        )));
    }

    Ok(resolved)
}

/// Resolve an untrusted path to an existing, readable directory
pub fn canonical_dir(path: &Path) -> Result<PathBuf> {
    reject_traversal(path)?;

    let resolved = path
        .canonicalize()
        .map_err(|_| Error::Validation(format!("directory does not exist: {}", path.display())))?;

    if !resolved.is_dir() {
        return Err(Error::Validation(format!(
            "not a directory: {}",
            resolved.display()
        )));
    }

    // A directory we cannot enumerate is as good as missing
    std::fs::read_dir(&resolved)
        .map_err(|e| Error::Validation(format!("directory not readable: {e}")))?;

    Ok(resolved)
}
