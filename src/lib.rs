// src/lib.rs

//! deltaforge - versioned build-artifact store with binary delta updates
//!
//! A registered version is a named, content-addressed snapshot of a
//! directory tree, stored as a compressed archive. Between any two
//! versions the patch engine can generate a binary delta with an external
//! diff tool; clients then update by applying that delta to their locally
//! retained archive instead of re-downloading the whole target, falling
//! back to a full download whenever the patch path is unavailable or not
//! worthwhile.
//!
//! Layout:
//! - [`store`]    - content store for archives and patch files
//! - [`db`]       - SQLite catalog of versions, patch jobs, and downloads
//! - [`engine`]   - patch-generation job engine
//! - [`tool`]     - external diff/apply tool execution
//! - [`strategy`] - update strategy selection and execution
//! - [`client`]   - local installed-version state
//! - [`hash`]     - content hashing (XOR-folded SHA-256 tree hash)

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod hash;
pub mod paths;
pub mod progress;
pub mod store;
pub mod strategy;
pub mod tool;

pub use error::{Error, Result};
