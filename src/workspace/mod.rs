//! Remote workspace path derivation
//!
//! Maps a local project root to a stable directory name under the remote
//! work dir, so repeated runs of the same project land in the same place
//! and previously uploaded files can be reused.

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the project-root digest.
///
/// The hash is a naming convenience that keeps two checkouts with the same
/// basename apart; it is not a uniqueness guarantee.
const HASH_LEN: usize = 8;

/// Derive the remote workspace path for a local project root.
///
/// The result is `<work_dir>/<basename>_<hash>` with spaces replaced by
/// underscores and the path lexically normalized. Pure function: same
/// inputs always yield the same path, across calls and across processes.
///
/// `local_root` should be absolute so the digest is stable regardless of
/// where the process was started from.
pub fn resolve(local_root: &Path, work_dir: &Path) -> PathBuf {
    let root_str = local_root.to_string_lossy();
    let digest = Sha256::digest(root_str.as_bytes());
    let short_hash = &hex::encode(digest)[..HASH_LEN];

    let basename = local_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workspace".to_string());

    let dirpath = work_dir.join(format!("{}_{}", basename, short_hash));
    let flattened = dirpath.to_string_lossy().replace(' ', "_");

    normalize(Path::new(&flattened))
}

/// Lexically normalize a path: drop `.` components and resolve `..`
/// against preceding components where possible. No filesystem access.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let ends_normal =
                    matches!(out.components().next_back(), Some(Component::Normal(_)));
                if ends_normal {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }

    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}
