//! Remote task runner
//!
//! Ties the pieces together: one session, one sync pass, then either a
//! direct command execution or a containerized build/run/cleanup
//! sequence. The two strategies share the same sync and exec machinery
//! and are selected by configuration, not subclassing.

use std::path::PathBuf;

use crate::config::{ConfigError, RunnerConfig};
use crate::docker::{DockerConfig, DockerRun};
use crate::run::{CommandExecutor, CommandResult, Reporter, Verbosity};
use crate::session::{Session, SessionError, SshSession};
use crate::sync::{SyncEngine, SyncError};
use crate::workspace;

/// Top-level runner errors.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How to execute the user command once the workspace is synced.
#[derive(Debug, Clone)]
pub enum RunMode {
    /// Run the command directly in the synced workspace
    Direct,
    /// Build a disposable image from the workspace and run inside it
    Container(DockerConfig),
}

/// Remote task runner over a single SSH session.
///
/// Owns the session for its whole lifetime: construction opens it, and
/// it is released exactly once, by [`RemoteRunner::close`] or by drop,
/// whichever comes first. Each [`RemoteRunner::run`] call recomputes the
/// workspace path fresh and performs sync before execution.
pub struct RemoteRunner {
    session: Box<dyn Session>,
    local_root: PathBuf,
    work_dir: PathBuf,
    mode: RunMode,
    reporter: Reporter,
    remote_label: String,
    closed: bool,
}

impl RemoteRunner {
    /// Open an SSH session using `config` and wrap it in a runner.
    ///
    /// The local project root is the current directory. Connection or
    /// authentication failures propagate unmodified; nothing is retried.
    pub fn connect(config: RunnerConfig, mode: RunMode) -> Result<Self, RunnerError> {
        let reporter = Reporter::new(config.verbosity, config.color);
        let remote_label = config.remote_label();
        reporter.note(&format!(
            ">> Connecting to {} using {}",
            remote_label,
            config.auth.describe()
        ));

        let session = SshSession::connect(&config)?;
        let local_root = std::env::current_dir()?;

        Ok(Self::with_session(
            Box::new(session),
            local_root,
            config.work_dir,
            mode,
            reporter,
            remote_label,
        ))
    }

    /// Wrap an already opened session. Used by tests and by callers that
    /// bring their own transport.
    pub fn with_session(
        session: Box<dyn Session>,
        local_root: PathBuf,
        work_dir: PathBuf,
        mode: RunMode,
        reporter: Reporter,
        remote_label: impl Into<String>,
    ) -> Self {
        Self {
            session,
            local_root,
            work_dir,
            mode,
            reporter,
            remote_label: remote_label.into(),
            closed: false,
        }
    }

    /// Sync the workspace, then execute `command` under the configured
    /// run mode. The returned exit code is the remote command's own;
    /// only transport faults produce `Err`.
    pub fn run(&mut self, command: &str) -> Result<CommandResult, RunnerError> {
        let ws = workspace::resolve(&self.local_root, &self.work_dir);

        let reporter = &self.reporter;
        let session = self.session.as_mut();

        reporter.note(&format!(">> Using working directory: {}", ws.display()));
        SyncEngine::new(reporter).sync(session, &self.local_root, &ws)?;
        reporter.note("===============================================");

        let executor = CommandExecutor::new(reporter, self.remote_label.clone());
        let result = match &self.mode {
            RunMode::Direct => executor.exec(session, &ws, command, Verbosity::Result)?,
            RunMode::Container(docker) => {
                DockerRun::new(&executor, docker).run(session, &self.work_dir, &ws, command)?
            }
        };

        Ok(result)
    }

    /// Release the session. Safe to skip; drop closes it as well.
    pub fn close(mut self) -> Result<(), SessionError> {
        self.closed = true;
        self.session.close()
    }
}

impl Drop for RemoteRunner {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.session.close();
        }
    }
}

/// Connect, run one command in the synced workspace, and close.
pub fn remote_run(command: &str, config: RunnerConfig) -> Result<CommandResult, RunnerError> {
    run_with_mode(command, config, RunMode::Direct)
}

/// Connect, run one command inside a disposable container, and close.
pub fn remote_run_docker(
    command: &str,
    config: RunnerConfig,
    docker: DockerConfig,
) -> Result<CommandResult, RunnerError> {
    run_with_mode(command, config, RunMode::Container(docker))
}

fn run_with_mode(
    command: &str,
    config: RunnerConfig,
    mode: RunMode,
) -> Result<CommandResult, RunnerError> {
    let mut runner = RemoteRunner::connect(config, mode)?;
    let outcome = runner.run(command);
    // The session is released whether the run succeeded or not.
    let closed = runner.close();
    let result = outcome?;
    closed?;
    Ok(result)
}
