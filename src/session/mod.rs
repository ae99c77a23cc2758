//! Remote session abstraction
//!
//! Abstracts the SSH/SFTP channel for testability. Provides:
//! - Session trait: command execution plus the file-transfer primitives
//!   the sync engine needs
//! - SshSession: real ssh2-backed connection for production
//!
//! The in-process test double lives in [`crate::mock`].

use std::path::{Path, PathBuf};

pub mod ssh;

pub use ssh::SshSession;

/// A single entry from a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Bare filename, no directory part
    pub name: String,
    /// Last-modified time in seconds since the epoch
    pub mtime: i64,
}

/// Transport errors
///
/// Anything here except `NotFound` is fatal to the current run: there is
/// no retry or backoff. `NotFound` is distinguished so the sync engine can
/// recover from a missing remote directory by creating it.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("authentication rejected for {0}")]
    AuthRejected(String),

    #[error("remote path not found: {0}")]
    NotFound(PathBuf),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One opened command-execution and file-transfer channel.
///
/// A session is owned by a single runner for its whole lifetime and is
/// used strictly sequentially: uploads complete before any command runs,
/// and no two operations are ever in flight at once. `close` releases the
/// wire channel; calling it more than once is a no-op.
pub trait Session {
    /// Execute a shell command remotely, streaming output line by line.
    ///
    /// `on_stdout` and `on_stderr` receive each line without its trailing
    /// newline, as the streams are drained. The exit status is read only
    /// after both streams are closed, and is returned as data: a nonzero
    /// exit is not an error. Only transport faults produce `Err`.
    fn exec_streamed(
        &mut self,
        command: &str,
        on_stdout: &mut dyn FnMut(&str),
        on_stderr: &mut dyn FnMut(&str),
    ) -> Result<i32, SessionError>;

    /// Create a single remote directory (parent must exist).
    fn mkdir(&mut self, path: &Path) -> Result<(), SessionError>;

    /// List a remote directory, yielding filename and mtime per entry.
    ///
    /// Returns `SessionError::NotFound` when the directory does not exist.
    fn list_dir(&mut self, path: &Path) -> Result<Vec<RemoteEntry>, SessionError>;

    /// Upload one file, overwriting any remote copy. No partial transfer.
    fn upload(&mut self, local: &Path, remote: &Path) -> Result<(), SessionError>;

    /// Close the underlying channel. Idempotent.
    fn close(&mut self) -> Result<(), SessionError>;
}
