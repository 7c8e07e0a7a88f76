// tests/workflow.rs

//! End-to-end workflow tests: register versions, generate patches, and
//! update a client install through the patch and fallback paths.
//!
//! The stub diff tool emits the full target archive as the "patch", so a
//! patch-applied update must reproduce the target's extracted tree byte
//! for byte.

#![cfg(unix)]

mod common;

use common::{FAILING_TOOL, ServerEnv, sample_tree, tree_snapshot};
use deltaforge::client::InstalledTracker;
use deltaforge::commands;
use deltaforge::db::models::{Download, Patch, PatchStatus, Version};
use deltaforge::progress::SilentProgress;
use deltaforge::strategy::{self, Reason, Strategy, UpdateMethod};
use std::fs;

// Large compressible payload so the stub's full-archive "patch" stays
// well under the size threshold against the extracted tree size
const BLOB: &[u8] = &[0x5a; 200_000];

const V1_FILES: &[(&str, &[u8])] = &[
    ("bin/app", b"application version one"),
    ("cfg/settings.toml", b"shared config"),
    ("data/blob", BLOB),
];

const V2_FILES: &[(&str, &[u8])] = &[
    ("bin/app", b"application version two, somewhat larger"),
    ("cfg/settings.toml", b"shared config"),
    ("data/blob", BLOB),
    ("docs/CHANGES", b"v2 notes"),
];

const V3_FILES: &[(&str, &[u8])] = &[
    ("bin/app", b"application version three"),
    ("cfg/settings.toml", b"updated config"),
    ("data/blob", BLOB),
];

fn install_from_server(env: &ServerEnv, tracker: &InstalledTracker, name: &str) {
    let version = Version::find_by_name(&env.conn, name).unwrap().unwrap();
    let bytes = env
        .engine
        .fetch_version_file(&env.conn, version.id.unwrap())
        .unwrap();
    tracker
        .install(name, &bytes, Some(&version.hash), true)
        .unwrap();
}

/// Update the tracker to `target`, returning how the update was performed.
/// Ratio 1.0 keeps the stub's full-archive "patch" eligible.
fn update_to(env: &ServerEnv, tracker: &InstalledTracker, target: &str) -> UpdateMethod {
    let current = tracker.get_current().unwrap();
    let chosen = strategy::decide(&env.conn, current.as_ref(), target, 1.0).unwrap();
    strategy::execute(
        &env.conn,
        &env.engine,
        tracker,
        env.runner.as_ref(),
        chosen,
        &SilentProgress,
    )
    .unwrap()
    .method
}

#[test]
fn test_register_generates_bidirectional_patches() {
    let env = ServerEnv::new();
    let v1 = env.register("v1", V1_FILES);
    let v2 = env.register("v2", V2_FILES);

    let patches = env.engine.generate_all_for_version(&env.conn, v2).unwrap();
    assert_eq!(patches.len(), 2);
    for patch in &patches {
        assert_eq!(patch.status, PatchStatus::Completed);
    }

    // Both directions exist with distinct files
    let forward = Patch::find_by_pair(&env.conn, v1, v2).unwrap().unwrap();
    let backward = Patch::find_by_pair(&env.conn, v2, v1).unwrap().unwrap();
    assert_ne!(forward.patch_path, backward.patch_path);

    // The stub's patch is the target archive, so sizes match the archives
    let v2_archive = env.engine.fetch_version_file(&env.conn, v2).unwrap();
    let forward_bytes = env
        .engine
        .fetch_patch_file(&env.conn, forward.id.unwrap())
        .unwrap();
    assert_eq!(forward_bytes, v2_archive);
}

#[test]
fn test_end_to_end_patch_update_reproduces_target() {
    let env = ServerEnv::new();
    let v1 = env.register("v1", V1_FILES);
    let v2 = env.register("v2", V2_FILES);
    env.engine.generate(&env.conn, v1, v2).unwrap();

    // Client starts on v1
    let tracker = InstalledTracker::new(&env.client_root()).unwrap();
    let v1_record = Version::require(&env.conn, v1).unwrap();
    let v1_bytes = env.engine.fetch_version_file(&env.conn, v1).unwrap();
    tracker
        .install("v1", &v1_bytes, Some(&v1_record.hash), true)
        .unwrap();

    // Ratio 1.0 so the stub's full-size "patch" still qualifies
    let current = tracker.get_current().unwrap().unwrap();
    let chosen = strategy::decide(&env.conn, Some(&current), "v2", 1.0).unwrap();
    assert!(matches!(chosen, Strategy::PatchUpdate { .. }));

    let outcome = strategy::execute(
        &env.conn,
        &env.engine,
        &tracker,
        env.runner.as_ref(),
        chosen,
        &SilentProgress,
    )
    .unwrap();
    assert_eq!(outcome.method, UpdateMethod::Patch);

    // Extracted tree is byte-identical to the registered v2 tree
    let installed = tracker.get_current().unwrap().unwrap();
    assert_eq!(installed.name, "v2");
    for (rel, content) in V2_FILES {
        assert_eq!(fs::read(installed.path.join(rel)).unwrap(), *content);
    }
    // Exactly the target's top-level entries, nothing lingering from v1
    assert_eq!(
        fs::read_dir(&installed.path).unwrap().count(),
        4 // bin, cfg, data, docs
    );
}

#[test]
fn test_update_without_patch_falls_back_to_full() {
    let env = ServerEnv::new();
    let v1 = env.register("v1", V1_FILES);
    env.register("v2", V2_FILES);

    let tracker = InstalledTracker::new(&env.client_root()).unwrap();
    let v1_record = Version::require(&env.conn, v1).unwrap();
    let v1_bytes = env.engine.fetch_version_file(&env.conn, v1).unwrap();
    tracker
        .install("v1", &v1_bytes, Some(&v1_record.hash), true)
        .unwrap();

    // No patch was ever generated for this pair
    let current = tracker.get_current().unwrap().unwrap();
    let chosen = strategy::decide(&env.conn, Some(&current), "v2", 1.0).unwrap();
    match &chosen {
        Strategy::FullDownload { reason, .. } => assert_eq!(*reason, Reason::NoCompletedPatch),
        other => panic!("expected FullDownload, got {other:?}"),
    }

    let outcome = strategy::execute(
        &env.conn,
        &env.engine,
        &tracker,
        env.runner.as_ref(),
        chosen,
        &SilentProgress,
    )
    .unwrap();
    assert_eq!(outcome.method, UpdateMethod::Full);
    assert_eq!(tracker.get_current().unwrap().unwrap().name, "v2");
}

#[test]
fn test_fresh_client_full_download() {
    let env = ServerEnv::new();
    env.register("v1", V1_FILES);

    let tracker = InstalledTracker::new(&env.client_root()).unwrap();
    assert!(tracker.get_current().unwrap().is_none());

    let chosen = strategy::decide(&env.conn, None, "v1", 0.8).unwrap();
    match &chosen {
        Strategy::FullDownload { reason, .. } => assert_eq!(*reason, Reason::NoCurrentVersion),
        other => panic!("expected FullDownload, got {other:?}"),
    }

    let outcome = strategy::execute(
        &env.conn,
        &env.engine,
        &tracker,
        env.runner.as_ref(),
        chosen,
        &SilentProgress,
    )
    .unwrap();
    assert_eq!(outcome.method, UpdateMethod::Full);

    let installed = tracker.get_current().unwrap().unwrap();
    for (rel, content) in V1_FILES {
        assert_eq!(fs::read(installed.path.join(rel)).unwrap(), *content);
    }
}

#[test]
fn test_failed_generation_is_recorded_and_retryable() {
    let env = ServerEnv::with_tools(FAILING_TOOL, common::COPY_TOOL);
    let v1 = env.register("v1", V1_FILES);
    let v2 = env.register("v2", V2_FILES);

    let failed = env.engine.generate(&env.conn, v1, v2).unwrap();
    assert_eq!(failed.status, PatchStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("stub tool failure"));

    // Fetching a failed patch is refused
    let err = env
        .engine
        .fetch_patch_file(&env.conn, failed.id.unwrap())
        .unwrap_err();
    assert_eq!(err.kind(), "not-ready");

    // A fixed tool on the same catalog completes the same job row
    let retry_runner = std::sync::Arc::new(deltaforge::tool::ToolRunner::new(
        common::write_stub_tool(env.temp.path(), "good-diff", common::COPY_TOOL),
        common::write_stub_tool(env.temp.path(), "good-apply", common::COPY_TOOL),
        std::time::Duration::from_secs(10),
    ));
    let retry_store = deltaforge::store::ArchiveStore::new(&env.temp.path().join("server")).unwrap();
    let retry_engine = deltaforge::engine::PatchEngine::new(retry_store, retry_runner);
    let retried = retry_engine.generate(&env.conn, v1, v2).unwrap();
    assert_eq!(retried.id, failed.id);
    assert_eq!(retried.status, PatchStatus::Completed);
}

#[test]
fn test_register_replaces_nothing_on_name_conflict() {
    let env = ServerEnv::new();
    env.register("v1", V1_FILES);

    // Same catalog name again is a conflict at insert time
    let tree = sample_tree(V2_FILES);
    let stored = env.engine.store().register(tree.path(), "v1-other").unwrap();
    let mut dup = Version::new(
        "v1".to_string(),
        stored.hash,
        stored.size as i64,
        stored.location.display().to_string(),
    );
    assert_eq!(dup.insert(&env.conn).unwrap_err().kind(), "conflict");

    // Original row is untouched
    let original = Version::find_by_name(&env.conn, "v1").unwrap().unwrap();
    assert!(env.engine.store().exists(std::path::Path::new(&original.archive_path)));
}

#[test]
fn test_sequential_patch_updates_match_direct() {
    let env = ServerEnv::new();
    env.register("v1", V1_FILES);
    let v2 = env.register("v2", V2_FILES);
    let v3 = env.register("v3", V3_FILES);
    env.engine.generate_all_for_version(&env.conn, v2).unwrap();
    env.engine.generate_all_for_version(&env.conn, v3).unwrap();

    // One client walks v1 -> v2 -> v3, the other jumps v1 -> v3
    let stepwise = InstalledTracker::new(&env.client_root()).unwrap();
    let direct = InstalledTracker::new(&env.temp.path().join("client-direct")).unwrap();
    install_from_server(&env, &stepwise, "v1");
    install_from_server(&env, &direct, "v1");

    assert_eq!(update_to(&env, &stepwise, "v2"), UpdateMethod::Patch);
    assert_eq!(update_to(&env, &stepwise, "v3"), UpdateMethod::Patch);
    assert_eq!(update_to(&env, &direct, "v3"), UpdateMethod::Patch);

    // Both routes end on a byte-identical v3 tree
    let stepwise_tree = tree_snapshot(&stepwise.get_current().unwrap().unwrap().path);
    let direct_tree = tree_snapshot(&direct.get_current().unwrap().unwrap().path);
    assert_eq!(stepwise_tree, direct_tree);
    for (rel, content) in V3_FILES {
        assert_eq!(stepwise_tree.get(*rel).unwrap(), content);
    }
    assert_eq!(stepwise_tree.len(), V3_FILES.len());
}

#[test]
fn test_backward_patch_restores_original() {
    let env = ServerEnv::new();
    env.register("v1", V1_FILES);
    let v2 = env.register("v2", V2_FILES);
    env.engine.generate_all_for_version(&env.conn, v2).unwrap();

    let tracker = InstalledTracker::new(&env.client_root()).unwrap();
    install_from_server(&env, &tracker, "v1");
    let original = tree_snapshot(&tracker.get_current().unwrap().unwrap().path);

    assert_eq!(update_to(&env, &tracker, "v2"), UpdateMethod::Patch);
    let upgraded = tree_snapshot(&tracker.get_current().unwrap().unwrap().path);
    assert!(upgraded.contains_key("docs/CHANGES"));

    // The backward patch rolls the file set back exactly: v2-only files
    // gone, v1 contents byte-identical
    assert_eq!(update_to(&env, &tracker, "v1"), UpdateMethod::Patch);
    let restored = tree_snapshot(&tracker.get_current().unwrap().unwrap().path);
    assert_eq!(restored, original);
    assert!(!restored.contains_key("docs/CHANGES"));
}

#[test]
fn test_fetch_patch_generates_on_demand() {
    let env = ServerEnv::new();
    let v1 = env.register("v1", V1_FILES);
    let v2 = env.register("v2", V2_FILES);
    assert!(Patch::find_by_pair(&env.conn, v1, v2).unwrap().is_none());

    // Asking for a never-generated pair runs the job right then
    let out = env.temp.path().join("v1_to_v2.patch");
    commands::fetch_patch(&env.config(), "v1", "v2", &out).unwrap();

    let patch = Patch::find_by_pair(&env.conn, v1, v2).unwrap().unwrap();
    assert_eq!(patch.status, PatchStatus::Completed);

    // The stub's patch is the full target archive
    let expected = env
        .engine
        .store()
        .fetch(&env.engine.store().archive_path("v2"))
        .unwrap();
    assert_eq!(fs::read(&out).unwrap(), expected);
}

#[test]
fn test_fetch_patch_failed_generation_is_not_ready() {
    let env = ServerEnv::with_tools(FAILING_TOOL, common::COPY_TOOL);
    let v1 = env.register("v1", V1_FILES);
    let v2 = env.register("v2", V2_FILES);

    let out = env.temp.path().join("v1_to_v2.patch");
    let err = commands::fetch_patch(&env.config(), "v1", "v2", &out).unwrap_err();
    assert_eq!(err.kind(), "not-ready");
    assert!(!out.exists());

    // The failed job is recorded for inspection
    let patch = Patch::find_by_pair(&env.conn, v1, v2).unwrap().unwrap();
    assert_eq!(patch.status, PatchStatus::Failed);
    assert!(patch.error.as_deref().unwrap().contains("stub tool failure"));
}

#[test]
fn test_register_conflict_preserves_existing_archive() {
    let env = ServerEnv::new();
    let config = env.config();

    let first = sample_tree(V1_FILES);
    commands::register(&config, "v1", first.path(), None, true).unwrap();

    let location = env.engine.store().archive_path("v1");
    let original_bytes = env.engine.store().fetch(&location).unwrap();
    let recorded = Version::find_by_name(&env.conn, "v1").unwrap().unwrap();

    // A second registration with the same name loses the name claim and
    // must leave the published container alone
    let second = sample_tree(V2_FILES);
    let err = commands::register(&config, "v1", second.path(), None, true).unwrap_err();
    assert_eq!(err.kind(), "conflict");

    assert_eq!(env.engine.store().fetch(&location).unwrap(), original_bytes);
    let after = Version::find_by_name(&env.conn, "v1").unwrap().unwrap();
    assert_eq!(after.hash, recorded.hash);
    assert_eq!(after.id, recorded.id);
}

#[test]
fn test_status_tolerates_short_recorded_hash() {
    let env = ServerEnv::new();
    let client = env.client_root();

    // Hand-edited metadata with a truncated hash must not break status
    fs::create_dir_all(client.join("versions/v1")).unwrap();
    fs::write(
        client.join("versions/v1/meta.toml"),
        "name = \"v1\"\nhash = \"abc\"\nsize = 3\ninstalled_at = \"2026-08-27T00:00:00Z\"\n",
    )
    .unwrap();
    fs::write(client.join("current.toml"), "name = \"v1\"\n").unwrap();

    commands::status(&env.config()).unwrap();
}

#[test]
fn test_downloads_are_audited() {
    let env = ServerEnv::new();
    let v1 = env.register("v1", V1_FILES);
    let v2 = env.register("v2", V2_FILES);
    let patch = env.engine.generate(&env.conn, v1, v2).unwrap();

    env.engine.fetch_version_file(&env.conn, v1).unwrap();
    env.engine.fetch_version_file(&env.conn, v2).unwrap();
    env.engine
        .fetch_patch_file(&env.conn, patch.id.unwrap())
        .unwrap();

    let recent = Download::list_recent(&env.conn, 10).unwrap();
    assert_eq!(recent.len(), 3);
}

#[test]
fn test_version_deletion_restricted_by_patches() {
    let env = ServerEnv::new();
    let v1 = env.register("v1", V1_FILES);
    let v2 = env.register("v2", V2_FILES);
    env.engine.generate(&env.conn, v1, v2).unwrap();

    // Referenced by a patch: refused
    assert_eq!(Version::delete(&env.conn, v1).unwrap_err().kind(), "conflict");

    conn_clear_patches(&env);
    Version::delete(&env.conn, v1).unwrap();
    assert!(Version::find_by_id(&env.conn, v1).unwrap().is_none());
}

fn conn_clear_patches(env: &ServerEnv) {
    env.conn.execute("DELETE FROM patches", []).unwrap();
}
