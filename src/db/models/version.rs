// src/db/models/version.rs

//! Version model - immutable named build artifacts

use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

/// A registered version: a named, content-addressed build artifact
#[derive(Debug, Clone)]
pub struct Version {
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    /// XOR-folded SHA-256 over all files in the artifact tree
    pub hash: String,
    /// Total size of all regular files in bytes
    pub size: i64,
    /// Location of the compressed archive in the content store
    pub archive_path: String,
    pub created_at: Option<String>,
}

impl Version {
    /// Create a new Version (not yet persisted)
    pub fn new(name: String, hash: String, size: i64, archive_path: String) -> Self {
        Self {
            id: None,
            name,
            description: None,
            hash,
            size,
            archive_path,
            created_at: None,
        }
    }

    /// Insert this version into the catalog
    ///
    /// A duplicate name is reported as a conflict; the caller must choose a
    /// new name.
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        let result = conn.execute(
            "INSERT INTO versions (name, description, hash, size, archive_path)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &self.name,
                &self.description,
                &self.hash,
                &self.size,
                &self.archive_path,
            ],
        );

        match result {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                self.id = Some(id);
                Ok(id)
            }
            Err(e) if is_constraint_violation(&e) => Err(Error::Conflict(format!(
                "version name already exists: {}",
                self.name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Find a version by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, description, hash, size, archive_path, created_at
             FROM versions WHERE id = ?1",
        )?;

        let version = stmt.query_row([id], Self::from_row).optional()?;
        Ok(version)
    }

    /// Find a version by name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, description, hash, size, archive_path, created_at
             FROM versions WHERE name = ?1",
        )?;

        let version = stmt.query_row([name], Self::from_row).optional()?;
        Ok(version)
    }

    /// Fetch a version by id, failing if it does not exist
    pub fn require(conn: &Connection, id: i64) -> Result<Self> {
        Self::find_by_id(conn, id)?.ok_or_else(|| Error::NotFound(format!("version id {id}")))
    }

    /// List all versions, newest first
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, description, hash, size, archive_path, created_at
             FROM versions ORDER BY created_at DESC, id DESC",
        )?;

        let versions = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(versions)
    }

    /// Delete a version from the catalog
    ///
    /// Deletion is restricted while any patch references this version;
    /// the caller must remove the patches first.
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        let referencing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM patches
             WHERE source_version_id = ?1 OR target_version_id = ?1",
            [id],
            |row| row.get(0),
        )?;

        if referencing > 0 {
            return Err(Error::Conflict(format!(
                "version {id} is referenced by {referencing} patch(es)"
            )));
        }

        let affected = conn.execute("DELETE FROM versions WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(Error::NotFound(format!("version id {id}")));
        }
        Ok(())
    }

    /// Convert a database row to a Version
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            description: row.get(2)?,
            hash: row.get(3)?,
            size: row.get(4)?,
            archive_path: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

/// Check whether a rusqlite error is a constraint violation
pub(crate) fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
