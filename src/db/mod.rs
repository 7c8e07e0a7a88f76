// src/db/mod.rs

//! SQLite catalog for versions, patches, and download records
//!
//! The catalog is the single source of truth for which versions exist and
//! what state each patch job is in. Model structs live in [`models`],
//! schema migrations in [`schema`].

pub mod models;
pub mod schema;

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;
use tracing::debug;

/// Initialize the catalog database, creating parent directories and
/// applying any pending migrations
pub fn init(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = open(db_path)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Open an existing catalog database
///
/// Foreign keys are enforced on every connection; the patches table
/// restricts deletion of referenced versions.
pub fn open(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    debug!("Opened catalog database: {}", db_path.display());
    Ok(conn)
}

/// Run a closure inside a transaction, committing on success and rolling
/// back on error
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&rusqlite::Transaction) -> Result<T>,
{
    let tx = conn.transaction()?;
    let result = f(&tx)?;
    tx.commit()?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("nested/dir/catalog.db");

        let conn = init(&db_path).unwrap();
        assert!(db_path.exists());

        // Migrations applied
        let version = schema::get_schema_version(&conn).unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let temp = TempDir::new().unwrap();
        let mut conn = init(&temp.path().join("catalog.db")).unwrap();

        let result: Result<()> = transaction(&mut conn, |tx| {
            tx.execute(
                "INSERT INTO versions (name, hash, size, archive_path) VALUES ('v1', 'h', 1, 'p')",
                [],
            )?;
            Err(crate::Error::Validation("abort".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM versions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
