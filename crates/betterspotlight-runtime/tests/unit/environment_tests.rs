//! Orphan runtime-directory reconciliation.

use betterspotlight_runtime::{cleanup_orphan_runtime_directories, RuntimeContext};
use serde_json::json;

fn context_in(root: &std::path::Path) -> RuntimeContext {
    let runtime_dir = root.join("live-instance");
    std::fs::create_dir_all(&runtime_dir).unwrap();
    RuntimeContext {
        runtime_root: root.to_path_buf(),
        instance_id: "live-instance".to_owned(),
        runtime_dir: runtime_dir.clone(),
        socket_dir: runtime_dir.join("sockets"),
        pid_dir: runtime_dir.join("pids"),
        metadata_path: runtime_dir.join("instance.json"),
    }
}

fn write_sibling(root: &std::path::Path, name: &str, app_pid: i64) -> std::path::PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    let metadata = json!({"instance_id": name, "app_pid": app_pid});
    std::fs::write(dir.join("instance.json"), metadata.to_string()).unwrap();
    dir
}

#[test]
fn removes_only_siblings_with_dead_pids() {
    let root = tempfile::tempdir().unwrap();
    let context = context_in(root.path());

    // A sibling recorded against a pid that is certainly dead.
    let dead = write_sibling(root.path(), "dead-instance", 999_999_999);
    // A sibling recorded against our own (alive) pid.
    let alive = write_sibling(root.path(), "alive-instance", i64::from(std::process::id()));
    // A sibling with no metadata at all stays untouched.
    let no_meta = root.path().join("no-metadata");
    std::fs::create_dir_all(&no_meta).unwrap();

    let removed = cleanup_orphan_runtime_directories(&context);

    assert_eq!(removed, vec![dead.clone()]);
    assert!(!dead.exists());
    assert!(alive.exists());
    assert!(no_meta.exists());
    assert!(context.runtime_dir.exists(), "live instance is never removed");
}

#[test]
fn never_removes_the_live_instance_even_with_dead_pid_metadata() {
    let root = tempfile::tempdir().unwrap();
    let context = context_in(root.path());
    std::fs::write(
        &context.metadata_path,
        json!({"instance_id": "live-instance", "app_pid": 999_999_999}).to_string(),
    )
    .unwrap();

    let removed = cleanup_orphan_runtime_directories(&context);
    assert!(removed.is_empty());
    assert!(context.runtime_dir.exists());
}
