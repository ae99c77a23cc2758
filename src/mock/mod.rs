//! Mock session implementation
//!
//! In-process stand-in for [`crate::session::SshSession`]: an in-memory
//! remote filesystem plus scripted command results, with a shared state
//! handle so tests can inspect what happened after the runner consumed
//! the session.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::session::{RemoteEntry, Session, SessionError};

/// Scripted outcome for a matching exec command.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResult {
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl ScriptedResult {
    /// Exit 0, no output.
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_exit(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_stdout(mut self, lines: &[&str]) -> Self {
        self.stdout = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_stderr(mut self, lines: &[&str]) -> Self {
        self.stderr = lines.iter().map(|l| l.to_string()).collect();
        self
    }
}

/// Observable state of the mock remote host.
#[derive(Debug, Default)]
pub struct MockState {
    /// Remote directories: path -> (filename -> mtime)
    pub dirs: HashMap<PathBuf, HashMap<String, i64>>,
    /// Every command passed to `exec_streamed`, in order
    pub exec_log: Vec<String>,
    /// Every directory passed to `list_dir`, in order
    pub list_log: Vec<PathBuf>,
    /// Every remote path written by `upload`, in order
    pub upload_log: Vec<PathBuf>,
    pub closed: bool,
    pub close_count: usize,
}

impl MockState {
    /// Position of the first exec command containing `needle`.
    pub fn exec_index(&self, needle: &str) -> Option<usize> {
        self.exec_log.iter().position(|cmd| cmd.contains(needle))
    }

    /// Recorded mtime for a remote file, if present.
    pub fn remote_mtime(&self, dir: &Path, name: &str) -> Option<i64> {
        self.dirs.get(dir).and_then(|d| d.get(name)).copied()
    }

    /// Overwrite a remote file's recorded mtime (creating the entry).
    pub fn set_remote_mtime(&mut self, dir: &Path, name: &str, mtime: i64) {
        self.dirs
            .entry(dir.to_path_buf())
            .or_default()
            .insert(name.to_string(), mtime);
    }
}

/// Configurable mock session.
///
/// Exec commands are matched by substring against registered scripts,
/// first match wins; unmatched commands succeed silently with exit 0.
/// `mkdir -p <path>` commands are interpreted so the sync engine's
/// workspace bootstrap works against the in-memory filesystem.
pub struct MockSession {
    state: Arc<Mutex<MockState>>,
    scripts: Vec<(String, ScriptedResult)>,
    fail_needle: Option<String>,
}

impl MockSession {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            scripts: Vec::new(),
            fail_needle: None,
        }
    }

    /// Shared handle for inspecting state after the session is moved.
    pub fn state(&self) -> Arc<Mutex<MockState>> {
        Arc::clone(&self.state)
    }

    /// Script the result for any exec command containing `needle`.
    pub fn script(mut self, needle: &str, result: ScriptedResult) -> Self {
        self.scripts.push((needle.to_string(), result));
        self
    }

    /// Make any exec command containing `needle` raise a transport fault.
    pub fn fail_on(mut self, needle: &str) -> Self {
        self.fail_needle = Some(needle.to_string());
        self
    }

    fn now_secs() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Session for MockSession {
    fn exec_streamed(
        &mut self,
        command: &str,
        on_stdout: &mut dyn FnMut(&str),
        on_stderr: &mut dyn FnMut(&str),
    ) -> Result<i32, SessionError> {
        let mut state = self.state.lock().unwrap();
        state.exec_log.push(command.to_string());

        if let Some(needle) = &self.fail_needle {
            if command.contains(needle.as_str()) {
                return Err(SessionError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "injected transport fault",
                )));
            }
        }

        if let Some(raw) = command.strip_prefix("mkdir -p ") {
            let path = PathBuf::from(raw.trim().trim_matches('\''));
            state.dirs.entry(path).or_default();
            return Ok(0);
        }

        let script = self
            .scripts
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_default();

        drop(state);

        for line in &script.stdout {
            on_stdout(line);
        }
        for line in &script.stderr {
            on_stderr(line);
        }
        Ok(script.exit_code)
    }

    fn mkdir(&mut self, path: &Path) -> Result<(), SessionError> {
        let mut state = self.state.lock().unwrap();
        state.dirs.entry(path.to_path_buf()).or_default();
        Ok(())
    }

    fn list_dir(&mut self, path: &Path) -> Result<Vec<RemoteEntry>, SessionError> {
        let mut state = self.state.lock().unwrap();
        state.list_log.push(path.to_path_buf());
        match state.dirs.get(path) {
            Some(files) => Ok(files
                .iter()
                .map(|(name, mtime)| RemoteEntry {
                    name: name.clone(),
                    mtime: *mtime,
                })
                .collect()),
            None => Err(SessionError::NotFound(path.to_path_buf())),
        }
    }

    fn upload(&mut self, _local: &Path, remote: &Path) -> Result<(), SessionError> {
        let mut state = self.state.lock().unwrap();
        let parent = remote.parent().unwrap_or(Path::new("")).to_path_buf();
        let name = remote
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        // Like a real upload, the remote copy's mtime is the write time.
        let now = Self::now_secs();
        state.dirs.entry(parent).or_default().insert(name, now);
        state.upload_log.push(remote.to_path_buf());
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.close_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unscripted_command_succeeds_silently() {
        let mut session = MockSession::new();
        let code = session
            .exec_streamed("true", &mut |_| {}, &mut |_| {})
            .unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn test_scripted_command_streams_output() {
        let mut session = MockSession::new().script(
            "echo hi",
            ScriptedResult::ok().with_stdout(&["hi"]),
        );
        let mut out = Vec::new();
        let code = session
            .exec_streamed("cd ws && echo hi", &mut |l| out.push(l.to_string()), &mut |_| {})
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(out, vec!["hi"]);
    }

    #[test]
    fn test_mkdir_p_creates_remote_dir() {
        let mut session = MockSession::new();
        session
            .exec_streamed("mkdir -p 'remote-run/ws_00000000'", &mut |_| {}, &mut |_| {})
            .unwrap();
        assert!(session
            .list_dir(Path::new("remote-run/ws_00000000"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_list_dir_missing_is_not_found() {
        let mut session = MockSession::new();
        assert!(matches!(
            session.list_dir(Path::new("nope")),
            Err(SessionError::NotFound(_))
        ));
    }
}
