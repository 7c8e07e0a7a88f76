// src/db/models/download.rs

//! Download audit records for served archives and patch files

use crate::error::Result;
use rusqlite::{Connection, Row, params};
use std::fmt;
use std::str::FromStr;

/// What kind of content was served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    Version,
    Patch,
}

impl DownloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadKind::Version => "version",
            DownloadKind::Patch => "patch",
        }
    }
}

impl fmt::Display for DownloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DownloadKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "version" => Ok(DownloadKind::Version),
            "patch" => Ok(DownloadKind::Patch),
            _ => Err(format!("Invalid download kind: {s}")),
        }
    }
}

/// One served download, referencing a version or patch by id
#[derive(Debug, Clone)]
pub struct Download {
    pub id: Option<i64>,
    pub kind: DownloadKind,
    pub item_id: i64,
    pub created_at: Option<String>,
}

impl Download {
    /// Record a download
    pub fn record(conn: &Connection, kind: DownloadKind, item_id: i64) -> Result<i64> {
        conn.execute(
            "INSERT INTO downloads (kind, item_id) VALUES (?1, ?2)",
            params![kind.as_str(), item_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List the most recent downloads, newest first
    pub fn list_recent(conn: &Connection, limit: usize) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, kind, item_id, created_at FROM downloads
             ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;

        let downloads = stmt
            .query_map([limit as i64], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(downloads)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind_str: String = row.get(1)?;
        let kind = DownloadKind::from_str(&kind_str).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("invalid download kind: {kind_str}").into(),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            kind,
            item_id: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}
