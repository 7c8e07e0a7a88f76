// src/cli.rs

//! Command-line interface definitions

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "deltaforge")]
#[command(author, version, about = "Versioned artifact store with binary delta updates")]
pub struct Cli {
    /// Configuration file (defaults to /etc/deltaforge/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the storage root and catalog database
    Init,

    /// Register a directory tree as a new version
    Register {
        /// Version name (unique)
        name: String,

        /// Directory tree to archive
        source_dir: PathBuf,

        /// Free-form description stored with the version
        #[arg(long)]
        description: Option<String>,

        /// Skip patch generation against existing versions
        #[arg(long)]
        no_patches: bool,
    },

    /// List registered versions
    List,

    /// Show one version and its patches
    Show {
        /// Version name
        name: String,
    },

    /// Delete a version from the catalog and store
    Delete {
        /// Version name
        name: String,
    },

    /// Generate (or re-run) the patch for a version pair
    GenPatch {
        /// Source version name
        source: String,

        /// Target version name
        target: String,
    },

    /// List patch jobs
    Patches {
        /// Only patches touching this version
        #[arg(long)]
        version: Option<String>,
    },

    /// Download a version's archive to a file
    Fetch {
        /// Version name
        name: String,

        /// Where to write the archive
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Download a completed patch to a file
    FetchPatch {
        /// Source version name
        source: String,

        /// Target version name
        target: String,

        /// Where to write the patch
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Install a version into the local client state
    Install {
        /// Version name
        name: String,

        /// Install without making it the current version
        #[arg(long)]
        no_current: bool,
    },

    /// Update the local install to a target version, by patch when worthwhile
    Update {
        /// Target version name
        name: String,
    },

    /// Show local client state
    Status,

    /// Show recently served downloads
    Downloads {
        /// Maximum entries to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}
