//! Remote command execution
//!
//! The executor runs one shell command per invocation inside a remote
//! workspace, streaming output back while accumulating it for the caller.
//! Console echo is a side channel controlled by an explicit [`Reporter`]
//! configuration, not global state.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::session::{Session, SessionError};
use crate::workspace;

/// How much of the run to narrate on the local console.
///
/// Orchestration steps (sync progress, docker build chatter) narrate at
/// `Verbose`; the output of the command the user actually asked for is
/// surfaced at `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Print nothing
    Silent,
    /// Print only the main command's output
    Result,
    /// Print everything, including sync and orchestration steps
    Verbose,
}

impl Verbosity {
    /// Map the numeric log level from the CLI (0, 1, 2+).
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Verbosity::Silent,
            1 => Verbosity::Result,
            _ => Verbosity::Verbose,
        }
    }
}

/// Console output configuration: verbosity gate plus color switch.
///
/// Passed explicitly to everything that prints, so two runners in one
/// process can narrate differently.
#[derive(Debug, Clone)]
pub struct Reporter {
    verbosity: Verbosity,
    color: bool,
}

impl Reporter {
    pub fn new(verbosity: Verbosity, color: bool) -> Self {
        Self { verbosity, color }
    }

    /// Reporter that prints nothing; used by tests.
    pub fn silent() -> Self {
        Self::new(Verbosity::Silent, false)
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    fn enabled(&self, tier: Verbosity) -> bool {
        tier != Verbosity::Silent && self.verbosity >= tier
    }

    /// Narration line (connection banners, sync progress). Verbose tier.
    pub fn note(&self, message: &str) {
        if self.enabled(Verbosity::Verbose) {
            println!("{}", message);
        }
    }

    /// Narration fragment without a trailing newline, for `path... uploaded`
    /// style progress lines.
    pub fn note_fragment(&self, message: &str) {
        if self.enabled(Verbosity::Verbose) {
            use std::io::Write;
            print!("{}", message);
            let _ = std::io::stdout().flush();
        }
    }

    /// Echo one line of remote stdout at the given tier.
    pub fn remote_stdout(&self, tier: Verbosity, line: &str) {
        if self.enabled(tier) {
            if self.color {
                println!("{}", line.blue());
            } else {
                println!("{}", line);
            }
        }
    }

    /// Echo one line of remote stderr at the given tier.
    pub fn remote_stderr(&self, tier: Verbosity, line: &str) {
        if self.enabled(tier) {
            if self.color {
                eprintln!("{}", line.red());
            } else {
                eprintln!("{}", line);
            }
        }
    }
}

/// Outcome of one remote command: exit status plus captured output.
///
/// A nonzero exit code is ordinary data here, never an `Err`; callers
/// decide how to react.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Quote a string for safe interpolation into a remote `sh` command line.
///
/// Uses the `'\''` idiom for embedded single quotes. Plain words pass
/// through unquoted to keep narrated command lines readable.
pub fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '/' | '_' | '-' | ':' | '='));
    if plain {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Runs shell commands in a remote workspace over a [`Session`].
pub struct CommandExecutor<'a> {
    reporter: &'a Reporter,
    /// `user@host:port`, used to label narrated command lines
    remote_label: String,
}

impl<'a> CommandExecutor<'a> {
    pub fn new(reporter: &'a Reporter, remote_label: impl Into<String>) -> Self {
        Self {
            reporter,
            remote_label: remote_label.into(),
        }
    }

    /// Execute `command` with the (normalized) workspace as working
    /// directory, in a single remote shell invocation.
    ///
    /// Output is echoed line by line at `tier` while being accumulated
    /// into the returned [`CommandResult`]. The exit status is read only
    /// after both output streams are drained.
    pub fn exec(
        &self,
        session: &mut dyn Session,
        workspace: &Path,
        command: &str,
        tier: Verbosity,
    ) -> Result<CommandResult, SessionError> {
        let workspace = workspace::normalize(workspace);
        self.reporter.note(&format!(
            "[{}:~/{}] $ {}",
            self.remote_label,
            workspace.display(),
            command
        ));

        let full_command = format!(
            "cd {} && {}",
            shell_quote(&workspace.to_string_lossy()),
            command
        );

        let mut stdout = String::new();
        let mut stderr = String::new();
        let reporter = self.reporter;

        let exit_code = session.exec_streamed(
            &full_command,
            &mut |line| {
                reporter.remote_stdout(tier, line);
                stdout.push_str(line);
                stdout.push('\n');
            },
            &mut |line| {
                reporter.remote_stderr(tier, line);
                stderr.push_str(line);
                stderr.push('\n');
            },
        )?;

        Ok(CommandResult {
            exit_code,
            stdout,
            stderr,
        })
    }
}
