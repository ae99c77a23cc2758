//! remote-run - run tasks in a remote worker over SSH
//!
//! Pushes the local project tree to a deterministic workspace on a remote
//! host (incremental, mtime-based, gitignore-aware), executes a command
//! there, and returns its exit code with captured stdout/stderr. The
//! command can optionally run inside a disposable Docker image built from
//! the synced workspace.

pub mod config;
pub mod docker;
pub mod mock;
pub mod run;
pub mod runner;
pub mod session;
pub mod sync;
pub mod workspace;

pub use config::{ConfigError, FileConfig, RunnerConfig, SshAuth, SshUrl};
pub use docker::{DockerBuildSpec, DockerConfig};
pub use mock::{MockSession, ScriptedResult};
pub use run::{CommandExecutor, CommandResult, Reporter, Verbosity};
pub use runner::{remote_run, remote_run_docker, RemoteRunner, RunMode, RunnerError};
pub use session::{RemoteEntry, Session, SessionError, SshSession};
pub use sync::{SyncEngine, SyncStats};
