// src/commands.rs

//! Command implementations for the deltaforge CLI

use crate::client::InstalledTracker;
use crate::config::Config;
use crate::db;
use crate::db::models::{Download, Patch, PatchStatus, Version};
use crate::engine::PatchEngine;
use crate::error::{Error, Result};
use crate::progress::LogProgress;
use crate::store::ArchiveStore;
use crate::strategy;
use crate::tool::ToolRunner;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Server-side handles shared by most commands
pub struct Server {
    pub conn: Connection,
    pub engine: PatchEngine,
    pub runner: Arc<ToolRunner>,
}

impl Server {
    /// Open the catalog and content store under the configured root
    pub fn open(config: &Config) -> Result<Self> {
        let conn = db::init(&config.storage.db_path())?;
        let store = ArchiveStore::new(&config.storage.root)?;
        let runner = Arc::new(ToolRunner::from_config(&config.tools));
        let engine = PatchEngine::new(store, runner.clone());
        Ok(Self {
            conn,
            engine,
            runner,
        })
    }
}

pub fn init(config: &Config) -> Result<()> {
    let server = Server::open(config)?;
    drop(server);
    println!("Initialized storage at {}", config.storage.root.display());
    Ok(())
}

pub fn register(
    config: &Config,
    name: &str,
    source_dir: &Path,
    description: Option<String>,
    no_patches: bool,
) -> Result<()> {
    let server = Server::open(config)?;

    // The catalog insert is the claim on the name: the container is built
    // in scratch space and only renamed to its derived location after the
    // insert succeeds, so a losing registration never touches the
    // winner's archive
    let staged = server.engine.store().stage(source_dir, name)?;
    let location = server.engine.store().archive_path(name);

    let mut version = Version::new(
        name.to_string(),
        staged.hash.clone(),
        staged.size as i64,
        location.display().to_string(),
    );
    version.description = description;
    let id = version.insert(&server.conn)?;

    let stored = server.engine.store().publish(staged, name)?;

    println!("Registered {name} (id {id}, {} bytes, hash {})", stored.size, stored.hash);

    if no_patches {
        return Ok(());
    }

    let patches = server.engine.generate_all_for_version(&server.conn, id)?;
    if patches.is_empty() {
        println!("No other versions, no patches generated");
        return Ok(());
    }

    let completed = patches
        .iter()
        .filter(|p| p.status == PatchStatus::Completed)
        .count();
    println!("Generated {completed}/{} patches", patches.len());
    for patch in patches.iter().filter(|p| p.status != PatchStatus::Completed) {
        println!(
            "  pair ({}, {}) {}: {}",
            patch.source_version_id,
            patch.target_version_id,
            patch.status,
            patch.error.as_deref().unwrap_or("no detail")
        );
    }
    Ok(())
}

pub fn list(config: &Config) -> Result<()> {
    let server = Server::open(config)?;
    let versions = Version::list_all(&server.conn)?;

    if versions.is_empty() {
        println!("No versions registered");
        return Ok(());
    }

    println!("{:<6} {:<24} {:>12} {:<12} CREATED", "ID", "NAME", "SIZE", "HASH");
    for version in versions {
        println!(
            "{:<6} {:<24} {:>12} {:<12} {}",
            version.id.unwrap_or(0),
            version.name,
            version.size,
            &version.hash[..version.hash.len().min(12)],
            version.created_at.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub fn show(config: &Config, name: &str) -> Result<()> {
    let server = Server::open(config)?;
    let version = require_by_name(&server.conn, name)?;
    let id = version.id.unwrap_or(0);

    println!("Version:     {}", version.name);
    println!("Id:          {id}");
    println!("Hash:        {}", version.hash);
    println!("Size:        {} bytes", version.size);
    println!("Archive:     {}", version.archive_path);
    println!("Created:     {}", version.created_at.as_deref().unwrap_or("-"));
    if let Some(description) = &version.description {
        println!("Description: {description}");
    }

    let patches = Patch::find_touching_version(&server.conn, id)?;
    if patches.is_empty() {
        println!("No patches touch this version");
        return Ok(());
    }

    println!("\nPatches:");
    for patch in patches {
        let source = Version::require(&server.conn, patch.source_version_id)?;
        let target = Version::require(&server.conn, patch.target_version_id)?;
        println!(
            "  {} -> {} [{}]{}",
            source.name,
            target.name,
            patch.status,
            patch
                .size
                .map(|s| format!(" {s} bytes"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

pub fn delete(config: &Config, name: &str) -> Result<()> {
    let server = Server::open(config)?;
    let version = require_by_name(&server.conn, name)?;
    let id = version.id.unwrap_or(0);

    Version::delete(&server.conn, id)?;
    server
        .engine
        .store()
        .delete(Path::new(&version.archive_path))?;

    println!("Deleted {name}");
    Ok(())
}

pub fn gen_patch(config: &Config, source: &str, target: &str) -> Result<()> {
    let server = Server::open(config)?;
    let source_version = require_by_name(&server.conn, source)?;
    let target_version = require_by_name(&server.conn, target)?;

    let patch = server.engine.generate(
        &server.conn,
        source_version.id.unwrap_or(0),
        target_version.id.unwrap_or(0),
    )?;

    match patch.status {
        PatchStatus::Completed => println!(
            "Patch {source} -> {target} completed ({} bytes)",
            patch.size.unwrap_or(0)
        ),
        status => println!(
            "Patch {source} -> {target} {status}: {}",
            patch.error.as_deref().unwrap_or("no detail")
        ),
    }
    Ok(())
}

pub fn patches(config: &Config, version: Option<&str>) -> Result<()> {
    let server = Server::open(config)?;

    let patches = match version {
        Some(name) => {
            let version = require_by_name(&server.conn, name)?;
            Patch::find_touching_version(&server.conn, version.id.unwrap_or(0))?
        }
        None => Patch::list_all(&server.conn)?,
    };

    if patches.is_empty() {
        println!("No patches");
        return Ok(());
    }

    println!("{:<6} {:<24} {:<24} {:<12} {:>12}", "ID", "SOURCE", "TARGET", "STATUS", "SIZE");
    for patch in patches {
        let source = Version::require(&server.conn, patch.source_version_id)?;
        let target = Version::require(&server.conn, patch.target_version_id)?;
        println!(
            "{:<6} {:<24} {:<24} {:<12} {:>12}",
            patch.id.unwrap_or(0),
            source.name,
            target.name,
            patch.status.to_string(),
            patch.size.map(|s| s.to_string()).unwrap_or_else(|| "-".into())
        );
        if let Some(error) = &patch.error {
            println!("       error: {error}");
        }
    }
    Ok(())
}

pub fn fetch(config: &Config, name: &str, output: &Path) -> Result<()> {
    let server = Server::open(config)?;
    let version = require_by_name(&server.conn, name)?;

    let bytes = server
        .engine
        .fetch_version_file(&server.conn, version.id.unwrap_or(0))?;
    std::fs::write(output, &bytes)?;

    println!("Wrote {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

pub fn fetch_patch(config: &Config, source: &str, target: &str, output: &Path) -> Result<()> {
    let server = Server::open(config)?;
    let source_version = require_by_name(&server.conn, source)?;
    let target_version = require_by_name(&server.conn, target)?;

    // Generating on demand: a pair nobody asked about yet gets its job
    // run now; anything short of Completed is then refused as not ready
    let source_id = source_version.id.unwrap_or(0);
    let target_id = target_version.id.unwrap_or(0);
    let patch = match Patch::find_by_pair(&server.conn, source_id, target_id)? {
        Some(patch) => patch,
        None => server.engine.generate(&server.conn, source_id, target_id)?,
    };

    let bytes = server
        .engine
        .fetch_patch_file(&server.conn, patch.id.unwrap_or(0))?;
    std::fs::write(output, &bytes)?;

    println!("Wrote {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

pub fn install(config: &Config, name: &str, no_current: bool) -> Result<()> {
    let server = Server::open(config)?;
    let tracker = InstalledTracker::new(&config.client.root)?;
    let version = require_by_name(&server.conn, name)?;

    let bytes = server
        .engine
        .fetch_version_file(&server.conn, version.id.unwrap_or(0))?;
    let installed = tracker.install(name, &bytes, Some(&version.hash), !no_current)?;

    println!(
        "Installed {name} ({} bytes){}",
        installed.size,
        if no_current { "" } else { " as current" }
    );
    Ok(())
}

pub fn update(config: &Config, name: &str) -> Result<()> {
    let server = Server::open(config)?;
    let tracker = InstalledTracker::new(&config.client.root)?;

    let current = tracker.get_current()?;
    let chosen = strategy::decide(
        &server.conn,
        current.as_ref(),
        name,
        config.update.patch_size_ratio,
    )?;

    let outcome = strategy::execute(
        &server.conn,
        &server.engine,
        &tracker,
        server.runner.as_ref(),
        chosen,
        &LogProgress,
    )?;

    match outcome.method {
        strategy::UpdateMethod::AlreadyCurrent => {
            println!("{} is already current", outcome.version)
        }
        strategy::UpdateMethod::Full => {
            println!("Updated to {} via full download", outcome.version)
        }
        strategy::UpdateMethod::Patch => println!("Updated to {} via patch", outcome.version),
        strategy::UpdateMethod::FullAfterPatchFailure => println!(
            "Updated to {} via full download after a failed patch attempt",
            outcome.version
        ),
    }
    Ok(())
}

pub fn status(config: &Config) -> Result<()> {
    let tracker = InstalledTracker::new(&config.client.root)?;

    match tracker.get_current()? {
        Some(current) => println!(
            "Current: {} (hash {})",
            current.name,
            &current.hash[..current.hash.len().min(12)]
        ),
        None => println!("Current: none"),
    }

    let installed = tracker.list_installed()?;
    if installed.is_empty() {
        println!("No versions installed");
        return Ok(());
    }

    println!("\nInstalled:");
    for version in installed {
        println!(
            "  {:<24} {:>12} bytes  {}",
            version.name,
            version.size,
            version.installed_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

pub fn downloads(config: &Config, limit: usize) -> Result<()> {
    let server = Server::open(config)?;
    let recent = Download::list_recent(&server.conn, limit)?;

    if recent.is_empty() {
        println!("No downloads recorded");
        return Ok(());
    }

    println!("{:<6} {:<10} {:<8} SERVED", "ID", "KIND", "ITEM");
    for download in recent {
        println!(
            "{:<6} {:<10} {:<8} {}",
            download.id.unwrap_or(0),
            download.kind.to_string(),
            download.item_id,
            download.created_at.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn require_by_name(conn: &Connection, name: &str) -> Result<Version> {
    info!("Looking up version {name}");
    Version::find_by_name(conn, name)?.ok_or_else(|| Error::NotFound(format!("version {name}")))
}
