//! Sync engine tests against the in-memory mock session
//!
//! Covers staleness detection, idempotence, lazy directory creation, and
//! ignore/VCS pruning.

use std::fs;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tempfile::TempDir;

use remote_run::mock::MockSession;
use remote_run::sync::SyncEngine;
use remote_run::{Reporter, Session};

/// A small project tree:
/// ```text
/// main.py
/// data.txt
/// src/util.py
/// ```
fn make_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("main.py"), "print('hi')\n").unwrap();
    fs::write(dir.path().join("data.txt"), "1 2 3\n").unwrap();
    fs::create_dir(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/util.py"), "pass\n").unwrap();
    dir
}

fn workspace() -> PathBuf {
    PathBuf::from("remote-run/proj_ab12cd34")
}

fn sync(session: &mut MockSession, root: &Path, ws: &Path) -> remote_run::SyncStats {
    let reporter = Reporter::silent();
    SyncEngine::new(&reporter).sync(session, root, ws).unwrap()
}

#[test]
fn test_initial_sync_uploads_everything() {
    let tree = make_tree();
    let mut session = MockSession::new();
    let ws = workspace();

    let stats = sync(&mut session, tree.path(), &ws);

    assert_eq!(stats.files_uploaded, 3);
    assert_eq!(stats.files_skipped, 0);

    let state = session.state();
    let state = state.lock().unwrap();
    assert!(state.upload_log.contains(&ws.join("main.py")));
    assert!(state.upload_log.contains(&ws.join("data.txt")));
    assert!(state.upload_log.contains(&ws.join("src/util.py")));
}

#[test]
fn test_second_sync_uploads_nothing() {
    let tree = make_tree();
    let mut session = MockSession::new();
    let ws = workspace();

    sync(&mut session, tree.path(), &ws);
    let stats = sync(&mut session, tree.path(), &ws);

    assert_eq!(stats.files_uploaded, 0, "unchanged tree must re-upload nothing");
    assert_eq!(stats.files_skipped, 3);
}

#[test]
fn test_newer_local_file_is_uploaded() {
    let tree = make_tree();
    let mut session = MockSession::new();
    let ws = workspace();

    sync(&mut session, tree.path(), &ws);

    // Touch one file into the future relative to the recorded upload time.
    let future = FileTime::from_unix_time(FileTime::now().unix_seconds() + 1000, 0);
    filetime::set_file_mtime(tree.path().join("main.py"), future).unwrap();

    let stats = sync(&mut session, tree.path(), &ws);
    assert_eq!(stats.files_uploaded, 1);

    let state = session.state();
    let state = state.lock().unwrap();
    let uploads: Vec<_> = state
        .upload_log
        .iter()
        .filter(|p| p.ends_with("main.py"))
        .collect();
    assert_eq!(uploads.len(), 2, "main.py uploaded once per stale sync");
}

#[test]
fn test_older_local_file_is_skipped() {
    let tree = make_tree();
    let mut session = MockSession::new();
    let ws = workspace();

    sync(&mut session, tree.path(), &ws);

    // Remote copy recorded far in the future: local can never be newer.
    {
        let state = session.state();
        let mut state = state.lock().unwrap();
        state.set_remote_mtime(&ws, "data.txt", i64::MAX);
    }
    let future = FileTime::from_unix_time(FileTime::now().unix_seconds() + 10, 0);
    filetime::set_file_mtime(tree.path().join("data.txt"), future).unwrap();

    let stats = sync(&mut session, tree.path(), &ws);
    assert_eq!(stats.files_uploaded, 0);
}

#[test]
fn test_file_missing_remotely_is_always_uploaded() {
    let tree = make_tree();
    let mut session = MockSession::new();
    let ws = workspace();

    sync(&mut session, tree.path(), &ws);

    // Simulate the remote copy disappearing.
    {
        let state = session.state();
        let mut state = state.lock().unwrap();
        state.dirs.get_mut(&ws).unwrap().remove("data.txt");
    }

    let stats = sync(&mut session, tree.path(), &ws);
    assert_eq!(stats.files_uploaded, 1);
}

#[test]
fn test_remote_directories_created_lazily() {
    let tree = make_tree();
    let mut session = MockSession::new();
    let ws = workspace();

    let stats = sync(&mut session, tree.path(), &ws);
    // Workspace root comes from `mkdir -p`; only src/ goes through the
    // list-create-list recovery.
    assert_eq!(stats.dirs_created, 1);

    let state = session.state();
    let state = state.lock().unwrap();
    assert!(state.dirs.contains_key(&ws.join("src")));
    assert!(state.exec_log[0].starts_with("mkdir -p "));
}

#[test]
fn test_gitignored_file_not_uploaded() {
    let tree = make_tree();
    fs::write(tree.path().join(".gitignore"), "*.log\n").unwrap();
    fs::write(tree.path().join("debug.log"), "noise\n").unwrap();

    let mut session = MockSession::new();
    let ws = workspace();
    sync(&mut session, tree.path(), &ws);

    let state = session.state();
    let state = state.lock().unwrap();
    assert!(!state.upload_log.iter().any(|p| p.ends_with("debug.log")));
    // The ignore file itself is ordinary content and does sync.
    assert!(state.upload_log.iter().any(|p| p.ends_with(".gitignore")));
}

#[test]
fn test_gitignored_directory_never_touched() {
    let tree = make_tree();
    fs::write(tree.path().join(".gitignore"), "build/\n").unwrap();
    fs::create_dir(tree.path().join("build")).unwrap();
    fs::write(tree.path().join("build/out.bin"), "bin\n").unwrap();

    let mut session = MockSession::new();
    let ws = workspace();
    sync(&mut session, tree.path(), &ws);

    let state = session.state();
    let state = state.lock().unwrap();
    assert!(
        !state.list_log.iter().any(|p| p.starts_with(ws.join("build"))),
        "pruned directory must never be listed"
    );
    assert!(!state.dirs.contains_key(&ws.join("build")));
    assert!(!state.upload_log.iter().any(|p| p.starts_with(ws.join("build"))));
}

#[test]
fn test_negated_pattern_keeps_file() {
    let tree = make_tree();
    fs::write(tree.path().join(".gitignore"), "*.log\n!keep.log\n").unwrap();
    fs::write(tree.path().join("debug.log"), "noise\n").unwrap();
    fs::write(tree.path().join("keep.log"), "wanted\n").unwrap();

    let mut session = MockSession::new();
    let ws = workspace();
    sync(&mut session, tree.path(), &ws);

    let state = session.state();
    let state = state.lock().unwrap();
    assert!(state.upload_log.iter().any(|p| p.ends_with("keep.log")));
    assert!(!state.upload_log.iter().any(|p| p.ends_with("debug.log")));
}

#[test]
fn test_git_directory_pruned() {
    let tree = make_tree();
    fs::create_dir(tree.path().join(".git")).unwrap();
    fs::write(tree.path().join(".git/config"), "[core]\n").unwrap();

    let mut session = MockSession::new();
    let ws = workspace();
    sync(&mut session, tree.path(), &ws);

    let state = session.state();
    let state = state.lock().unwrap();
    assert!(!state.list_log.iter().any(|p| p.starts_with(ws.join(".git"))));
    assert!(!state.upload_log.iter().any(|p| p.starts_with(ws.join(".git"))));
}

#[test]
fn test_transport_fault_during_sync_aborts() {
    let tree = make_tree();
    let mut session = MockSession::new().fail_on("mkdir -p");
    let ws = workspace();

    let reporter = Reporter::silent();
    let result = SyncEngine::new(&reporter).sync(&mut session as &mut dyn Session, tree.path(), &ws);
    assert!(result.is_err());
}
