// tests/common/mod.rs

//! Shared helpers for integration tests

use deltaforge::config::{ClientSection, Config, StorageSection, ToolsSection, UpdateSection};
use deltaforge::db;
use deltaforge::db::models::Version;
use deltaforge::engine::PatchEngine;
use deltaforge::store::ArchiveStore;
use deltaforge::tool::ToolRunner;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Stub diff/apply script honoring the `-f <a> <b> <out>` contract: the
/// "patch" it produces is simply the full second input, and applying such
/// a patch is copying it to the output.
pub const COPY_TOOL: &str = "#!/bin/sh\ncp \"$3\" \"$4\"\n";

/// Stub tool that always fails with a message on stderr
pub const FAILING_TOOL: &str = "#!/bin/sh\necho 'stub tool failure' >&2\nexit 2\n";

#[cfg(unix)]
pub fn write_stub_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Materialize a directory tree from (relative path, content) pairs
pub fn sample_tree(files: &[(&str, &[u8])]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (rel, content) in files {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    dir
}

/// A server-side environment backed by stub tools
pub struct ServerEnv {
    pub temp: TempDir,
    pub conn: Connection,
    pub engine: PatchEngine,
    pub runner: Arc<ToolRunner>,
}

#[cfg(unix)]
impl ServerEnv {
    pub fn new() -> Self {
        Self::with_tools(COPY_TOOL, COPY_TOOL)
    }

    pub fn with_tools(diff_script: &str, apply_script: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let bin = temp.path().join("bin");
        fs::create_dir(&bin).unwrap();

        let runner = Arc::new(ToolRunner::new(
            write_stub_tool(&bin, "stub-diff", diff_script),
            write_stub_tool(&bin, "stub-apply", apply_script),
            Duration::from_secs(10),
        ));

        let conn = db::init(&temp.path().join("server/catalog.db")).unwrap();
        let store = ArchiveStore::new(&temp.path().join("server")).unwrap();
        let engine = PatchEngine::new(store, runner.clone());

        Self {
            temp,
            conn,
            engine,
            runner,
        }
    }

    /// Archive a tree and register it in the catalog, returning its id
    pub fn register(&self, name: &str, files: &[(&str, &[u8])]) -> i64 {
        let tree = sample_tree(files);
        let stored = self.engine.store().register(tree.path(), name).unwrap();
        let mut version = Version::new(
            name.to_string(),
            stored.hash,
            stored.size as i64,
            stored.location.display().to_string(),
        );
        version.insert(&self.conn).unwrap()
    }

    /// Client state root inside this environment's temp dir
    pub fn client_root(&self) -> PathBuf {
        self.temp.path().join("client")
    }

    /// Config pointing the command layer at this environment's store,
    /// stub tools, and client root
    pub fn config(&self) -> Config {
        Config {
            storage: StorageSection {
                root: self.temp.path().join("server"),
            },
            tools: ToolsSection {
                diff_tool: self.temp.path().join("bin/stub-diff"),
                apply_tool: self.temp.path().join("bin/stub-apply"),
                timeout_secs: 10,
            },
            client: ClientSection {
                root: self.client_root(),
            },
            update: UpdateSection {
                patch_size_ratio: 0.8,
            },
        }
    }
}

/// Read every regular file under `root` keyed by relative path
pub fn tree_snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            if entry.file_type().unwrap().is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .into_owned();
                out.insert(rel, fs::read(&path).unwrap());
            }
        }
    }

    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}
