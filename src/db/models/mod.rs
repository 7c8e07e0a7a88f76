// src/db/models/mod.rs

//! Model structs for catalog tables
//!
//! One struct per table, with `insert`/`find_*`/`delete` methods taking a
//! `&Connection`. Patch holds two non-owning version ids; Version owns
//! nothing back, so there is no cyclic ownership between the two.

mod download;
mod patch;
mod version;

pub use download::{Download, DownloadKind};
pub use patch::{Patch, PatchStatus};
pub use version::Version;
