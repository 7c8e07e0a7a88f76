// src/hash.rs

//! Content hashing for versions and archives
//!
//! Individual files are hashed with SHA-256. A whole directory tree is
//! summarized by XOR-folding the per-file digests into a single 256-bit
//! value rendered as hex.
//!
//! # Why XOR-fold
//!
//! XOR is associative and commutative, so the combined hash depends only on
//! the *set* of file contents, not on traversal order. Two trees with the
//! same file contents hash identically even if the files live in different
//! directory layouts. This is intentionally NOT a Merkle-style ordered hash:
//! the trade-off favors a simple, order-independent identity over
//! tamper-evidence of structure. Per-file collision resistance still comes
//! from SHA-256.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use walkdir::WalkDir;

/// Digest width in bytes (SHA-256)
pub const DIGEST_LEN: usize = 32;

/// Summary of a hashed directory tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSummary {
    /// XOR-folded SHA-256 over all regular files, hex-encoded
    pub hash: String,
    /// Sum of all regular file sizes in bytes
    pub size: u64,
    /// Number of regular files hashed
    pub file_count: usize,
}

/// Compute SHA-256 of a byte slice, hex-encoded
pub fn sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute SHA-256 of data from a reader without loading it all into memory
pub fn sha256_reader<R: Read>(reader: &mut R) -> Result<[u8; DIGEST_LEN]> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize().into())
}

/// Compute SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> Result<[u8; DIGEST_LEN]> {
    let mut file = File::open(path)?;
    sha256_reader(&mut file)
}

/// Hash every regular file under `root` and fold the digests into one value
///
/// Files are visited in lexicographic relative-path order for deterministic
/// I/O, though the XOR fold makes the result independent of visit order.
pub fn hash_tree(root: &Path) -> Result<TreeSummary> {
    let mut combined = [0u8; DIGEST_LEN];
    let mut size: u64 = 0;
    let mut file_count = 0usize;

    let walker = WalkDir::new(root)
        .sort_by(|a, b| a.path().cmp(b.path()))
        .into_iter();

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let digest = sha256_file(entry.path())?;
        for (acc, byte) in combined.iter_mut().zip(digest.iter()) {
            *acc ^= byte;
        }

        size += entry.metadata().map_err(std::io::Error::from)?.len();
        file_count += 1;
    }

    Ok(TreeSummary {
        hash: hex::encode(combined),
        size,
        file_count,
    })
}
