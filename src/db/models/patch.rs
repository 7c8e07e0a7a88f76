// src/db/models/patch.rs

//! Patch model - delta-generation jobs keyed by ordered version pairs
//!
//! Each row is the full lifecycle of one patch:
//!
//! ```text
//! Pending --(work starts)--> Processing --(tool succeeds)--> Completed
//!                                     \--(tool fails)-----> Failed
//! ```
//!
//! Completed is sticky; Failed and Pending are re-enterable. The row is
//! never deleted on failure so the error stays inspectable.

use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a patch-generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchStatus::Pending => "pending",
            PatchStatus::Processing => "processing",
            PatchStatus::Completed => "completed",
            PatchStatus::Failed => "failed",
        }
    }

    /// Terminal states; only Completed is sticky
    pub fn is_terminal(&self) -> bool {
        matches!(self, PatchStatus::Completed | PatchStatus::Failed)
    }
}

impl fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PatchStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PatchStatus::Pending),
            "processing" => Ok(PatchStatus::Processing),
            "completed" => Ok(PatchStatus::Completed),
            "failed" => Ok(PatchStatus::Failed),
            _ => Err(format!("Invalid patch status: {s}")),
        }
    }
}

/// A directed delta edge from one version to another
#[derive(Debug, Clone)]
pub struct Patch {
    pub id: Option<i64>,
    pub source_version_id: i64,
    pub target_version_id: i64,
    pub status: PatchStatus,
    /// Location of the generated patch file, set when Completed
    pub patch_path: Option<String>,
    /// Patch file size in bytes, set when Completed
    pub size: Option<i64>,
    /// Captured tool error, set when Failed
    pub error: Option<String>,
    pub created_at: Option<String>,
}

impl Patch {
    /// Create a new Pending patch job (not yet persisted)
    pub fn new(source_version_id: i64, target_version_id: i64) -> Self {
        Self {
            id: None,
            source_version_id,
            target_version_id,
            status: PatchStatus::Pending,
            patch_path: None,
            size: None,
            error: None,
            created_at: None,
        }
    }

    /// Insert this patch job into the catalog
    ///
    /// The (source, target) ordered pair is unique; inserting a duplicate
    /// is a conflict.
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        let result = conn.execute(
            "INSERT INTO patches
             (source_version_id, target_version_id, status, patch_path, size, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.source_version_id,
                self.target_version_id,
                self.status.as_str(),
                &self.patch_path,
                &self.size,
                &self.error,
            ],
        );

        match result {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                self.id = Some(id);
                Ok(id)
            }
            Err(e) if super::version::is_constraint_violation(&e) => Err(Error::Conflict(format!(
                "patch already exists for pair ({}, {})",
                self.source_version_id, self.target_version_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Find a patch by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, source_version_id, target_version_id, status, patch_path, size, error, created_at
             FROM patches WHERE id = ?1",
        )?;

        let patch = stmt.query_row([id], Self::from_row).optional()?;
        Ok(patch)
    }

    /// Find the patch for a specific ordered version pair
    pub fn find_by_pair(conn: &Connection, source_id: i64, target_id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, source_version_id, target_version_id, status, patch_path, size, error, created_at
             FROM patches WHERE source_version_id = ?1 AND target_version_id = ?2",
        )?;

        let patch = stmt
            .query_row([source_id, target_id], Self::from_row)
            .optional()?;
        Ok(patch)
    }

    /// List all patches touching a version, in either direction
    pub fn find_touching_version(conn: &Connection, version_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, source_version_id, target_version_id, status, patch_path, size, error, created_at
             FROM patches
             WHERE source_version_id = ?1 OR target_version_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;

        let patches = stmt
            .query_map([version_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(patches)
    }

    /// List all patch jobs
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, source_version_id, target_version_id, status, patch_path, size, error, created_at
             FROM patches ORDER BY created_at DESC, id DESC",
        )?;

        let patches = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(patches)
    }

    /// Mark this job Processing and persist the transition so concurrent
    /// observers see it before the tool runs
    pub fn mark_processing(&mut self, conn: &Connection) -> Result<()> {
        self.status = PatchStatus::Processing;
        self.error = None;
        self.update_status(conn)
    }

    /// Mark this job Completed with the generated file path and size
    pub fn mark_completed(&mut self, conn: &Connection, patch_path: String, size: i64) -> Result<()> {
        self.status = PatchStatus::Completed;
        self.patch_path = Some(patch_path);
        self.size = Some(size);
        self.error = None;
        self.update_status(conn)
    }

    /// Mark this job Failed with the captured error detail
    ///
    /// The row is kept for inspection; a later generate call re-enters it.
    pub fn mark_failed(&mut self, conn: &Connection, error: String) -> Result<()> {
        self.status = PatchStatus::Failed;
        self.error = Some(error);
        self.update_status(conn)
    }

    fn update_status(&self, conn: &Connection) -> Result<()> {
        let id = self
            .id
            .ok_or_else(|| Error::NotFound("patch has no id".to_string()))?;

        conn.execute(
            "UPDATE patches SET status = ?1, patch_path = ?2, size = ?3, error = ?4 WHERE id = ?5",
            params![
                self.status.as_str(),
                &self.patch_path,
                &self.size,
                &self.error,
                id
            ],
        )?;
        Ok(())
    }

    /// Convert a database row to a Patch
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let status_str: String = row.get(3)?;
        let status = PatchStatus::from_str(&status_str).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("invalid patch status: {status_str}").into(),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            source_version_id: row.get(1)?,
            target_version_id: row.get(2)?,
            status,
            patch_path: row.get(4)?,
            size: row.get(5)?,
            error: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}
