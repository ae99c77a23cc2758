//! Incremental workspace sync
//!
//! Walks the local tree top-down, mirrors the directory structure under
//! the remote workspace, and uploads files whose local mtime is strictly
//! newer than the remote copy's. No checksums, no compression, and no
//! remote deletion: sync is one-directional and non-destructive by
//! design, so stale remote files simply persist.
//!
//! The mtime-only comparison means clock skew between hosts can produce
//! false positives or negatives; that is an accepted limitation of the
//! protocol, not something this module tries to correct.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::{DirEntry, WalkDir};

use crate::run::{shell_quote, Reporter};
use crate::session::{Session, SessionError};

mod ignore;

pub use self::ignore::{IgnoreFilter, IGNORE_FILE};

/// Relative paths starting with this prefix are never synced.
const VCS_PREFIX: &str = ".git";

/// Mtime recorded for files with no remote counterpart: always stale.
const MTIME_MISSING: i64 = i64::MIN;

/// Sync errors. Session faults are fatal and abort the run; the only
/// recovered condition is a missing remote directory, handled inline by
/// creating it.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("ignore rules error: {0}")]
    IgnoreRules(#[from] ::ignore::Error),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Counters for one sync pass.
///
/// `files_uploaded == 0` on a re-run with no local changes is the
/// engine's idempotence guarantee, and what the tests assert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub files_uploaded: usize,
    pub files_skipped: usize,
    pub dirs_created: usize,
}

/// Uploads a local tree into a remote workspace.
pub struct SyncEngine<'a> {
    reporter: &'a Reporter,
}

impl<'a> SyncEngine<'a> {
    pub fn new(reporter: &'a Reporter) -> Self {
        Self { reporter }
    }

    /// Sync `local_root` into `workspace`, loading ignore rules from the
    /// root's `.gitignore` if present.
    pub fn sync(
        &self,
        session: &mut dyn Session,
        local_root: &Path,
        workspace: &Path,
    ) -> Result<SyncStats, SyncError> {
        let filter = IgnoreFilter::load(local_root)?;
        self.sync_filtered(session, local_root, workspace, &filter)
    }

    /// Sync with an explicit ignore filter.
    pub fn sync_filtered(
        &self,
        session: &mut dyn Session,
        local_root: &Path,
        workspace: &Path,
        filter: &IgnoreFilter,
    ) -> Result<SyncStats, SyncError> {
        self.ensure_workspace(session, workspace)?;
        self.reporter.note(">> Copy local files to remote");

        let mut stats = SyncStats::default();
        // One remote listing per visited directory, keyed by relative path.
        let mut listings: HashMap<PathBuf, HashMap<String, i64>> = HashMap::new();

        let walker = WalkDir::new(local_root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| keep_entry(filter, local_root, entry));

        for entry in walker {
            let entry = entry?;
            let Ok(rel) = entry.path().strip_prefix(local_root) else {
                continue;
            };
            let rel = rel.to_path_buf();

            if entry.file_type().is_dir() {
                let remote_dir = join_remote(workspace, &rel);
                let listing = self.list_or_create(session, &remote_dir, &mut stats)?;
                listings.insert(rel, listing);
            } else if entry.file_type().is_file() {
                self.sync_file(session, &entry, &rel, workspace, &listings, &mut stats)?;
            }
        }

        Ok(stats)
    }

    /// Create the workspace root (with parents) via one shell invocation.
    fn ensure_workspace(
        &self,
        session: &mut dyn Session,
        workspace: &Path,
    ) -> Result<(), SessionError> {
        let command = format!("mkdir -p {}", shell_quote(&workspace.to_string_lossy()));
        session.exec_streamed(&command, &mut |_| {}, &mut |_| {})?;
        Ok(())
    }

    /// List a remote directory, creating it lazily on first need.
    fn list_or_create(
        &self,
        session: &mut dyn Session,
        remote_dir: &Path,
        stats: &mut SyncStats,
    ) -> Result<HashMap<String, i64>, SyncError> {
        let entries = match session.list_dir(remote_dir) {
            Ok(entries) => entries,
            Err(SessionError::NotFound(_)) => {
                session.mkdir(remote_dir)?;
                stats.dirs_created += 1;
                session.list_dir(remote_dir)?
            }
            Err(err) => return Err(err.into()),
        };

        Ok(entries
            .into_iter()
            .map(|entry| (entry.name, entry.mtime))
            .collect())
    }

    fn sync_file(
        &self,
        session: &mut dyn Session,
        entry: &DirEntry,
        rel: &Path,
        workspace: &Path,
        listings: &HashMap<PathBuf, HashMap<String, i64>>,
        stats: &mut SyncStats,
    ) -> Result<(), SyncError> {
        let name = entry.file_name().to_string_lossy().into_owned();
        let parent_rel = rel.parent().unwrap_or(Path::new("")).to_path_buf();

        let remote_mtime = listings
            .get(&parent_rel)
            .and_then(|listing| listing.get(&name))
            .copied()
            .unwrap_or(MTIME_MISSING);

        let local_mtime = local_mtime(entry)?;

        if local_mtime > remote_mtime {
            self.reporter.note_fragment(&format!("./{}... ", rel.display()));
            session.upload(entry.path(), &join_remote(workspace, rel))?;
            self.reporter.note("uploaded");
            stats.files_uploaded += 1;
        } else {
            self.reporter.note(&format!("./{} skipped", rel.display()));
            stats.files_skipped += 1;
        }

        Ok(())
    }
}

/// Traversal predicate: prune ignored subtrees and version-control
/// directories; exclude ignored files. The sync root itself always passes.
fn keep_entry(filter: &IgnoreFilter, root: &Path, entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let Ok(rel) = entry.path().strip_prefix(root) else {
        return true;
    };
    let is_dir = entry.file_type().is_dir();

    if is_dir && rel.to_string_lossy().starts_with(VCS_PREFIX) {
        return false;
    }
    !filter.should_ignore(rel, is_dir)
}

/// Local mtime in whole seconds since the epoch.
fn local_mtime(entry: &DirEntry) -> Result<i64, SyncError> {
    let modified = entry.metadata()?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0))
}

fn join_remote(workspace: &Path, rel: &Path) -> PathBuf {
    if rel.as_os_str().is_empty() {
        workspace.to_path_buf()
    } else {
        workspace.join(rel)
    }
}
