// src/db/schema.rs

//! Catalog schema definitions and migrations
//!
//! Defines the SQLite schema for the version/patch catalog and provides a
//! migration system to evolve it over time.

use crate::error::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!("Schema migration complete, now at version {SCHEMA_VERSION}");
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => panic!("Unknown migration version: {}", version),
    }
}

/// Initial schema - Version 1
///
/// Creates the core tables:
/// - versions: immutable named build artifacts with content hashes
/// - patches: one job per ordered (source, target) version pair
/// - downloads: audit entries for served archives and patch files
///
/// Patch endpoints use ON DELETE RESTRICT: a version cannot be removed
/// while any patch references it.
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        -- Versions: immutable named build artifacts
        CREATE TABLE versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            hash TEXT NOT NULL,
            size INTEGER NOT NULL,
            archive_path TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX idx_versions_name ON versions(name);

        -- Patches: one delta-generation job per ordered version pair
        CREATE TABLE patches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_version_id INTEGER NOT NULL,
            target_version_id INTEGER NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('pending', 'processing', 'completed', 'failed')),
            patch_path TEXT,
            size INTEGER,
            error TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(source_version_id, target_version_id),
            FOREIGN KEY (source_version_id) REFERENCES versions(id) ON DELETE RESTRICT,
            FOREIGN KEY (target_version_id) REFERENCES versions(id) ON DELETE RESTRICT
        );

        CREATE INDEX idx_patches_source ON patches(source_version_id);
        CREATE INDEX idx_patches_target ON patches(target_version_id);
        CREATE INDEX idx_patches_status ON patches(status);

        -- Downloads: audit trail for served content
        CREATE TABLE downloads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL CHECK(kind IN ('version', 'patch')),
            item_id INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX idx_downloads_kind ON downloads(kind, item_id);
        ",
    )?;

    debug!("Schema version 1 created");
    Ok(())
}
