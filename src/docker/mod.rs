//! Docker orchestration for containerized runs
//!
//! Wraps a synced workspace in a disposable image: author a Dockerfile in
//! the parent work dir, build, run the user command inside the container,
//! then force-remove the image. Steps are strictly ordered and never
//! retried; only the run step's result is returned to the caller.

use std::path::Path;

use crate::run::{shell_quote, CommandExecutor, CommandResult, Verbosity};
use crate::session::{Session, SessionError};

/// User-facing container options.
#[derive(Debug, Clone, Default)]
pub struct DockerConfig {
    /// Base image for the generated Dockerfile (e.g. `python:3.11`)
    pub image: String,
    /// Extra arguments spliced into `docker run`, verbatim
    pub args: String,
    /// Use the `nvidia-docker` runtime binary instead of `docker`
    pub gpu: bool,
}

/// Everything derived for one containerized run: image tag, Dockerfile
/// name and content, run arguments. Computed fresh per call from the
/// workspace name and command text, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerBuildSpec {
    pub image_name: String,
    pub dockerfile_name: String,
    pub dockerfile_content: String,
    pub container_args: String,
    pub use_gpu_runtime: bool,
}

impl DockerBuildSpec {
    /// Derive the build spec for `command` run in `workspace`.
    ///
    /// Line breaks in the command are collapsed to spaces first: the
    /// generated `CMD` must be a single logical line.
    pub fn derive(config: &DockerConfig, workspace: &Path, command: &str) -> Self {
        let dirname = workspace
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
        let command = flatten_command(command);

        let dockerfile_content = format!(
            "FROM {}\nCOPY {} /usr/src/{}/\nWORKDIR /usr/src/{}/\nCMD {}\n",
            config.image, dirname, dirname, dirname, command
        );

        Self {
            image_name: format!("remote_run_{}", dirname).to_lowercase(),
            dockerfile_name: format!("{}.Dockerfile", dirname),
            dockerfile_content,
            container_args: config.args.clone(),
            use_gpu_runtime: config.gpu,
        }
    }

    fn engine_binary(&self) -> &'static str {
        if self.use_gpu_runtime {
            "nvidia-docker"
        } else {
            "docker"
        }
    }

    fn run_command(&self) -> String {
        let mut parts = vec![
            self.engine_binary().to_string(),
            "run".to_string(),
            "--rm".to_string(),
        ];
        if !self.container_args.is_empty() {
            parts.push(self.container_args.clone());
        }
        parts.push(shell_quote(&self.image_name));
        parts.join(" ")
    }
}

/// Collapse embedded CR/LF into spaces.
fn flatten_command(command: &str) -> String {
    command.replace('\r', " ").replace('\n', " ")
}

/// Containerized run strategy: build, run, clean up, in that order.
pub struct DockerRun<'a> {
    executor: &'a CommandExecutor<'a>,
    config: &'a DockerConfig,
}

impl<'a> DockerRun<'a> {
    pub fn new(executor: &'a CommandExecutor<'a>, config: &'a DockerConfig) -> Self {
        Self { executor, config }
    }

    /// Run `command` inside a freshly built image of the workspace.
    ///
    /// Dockerfile authoring and the build happen in the parent work dir
    /// (the build context must contain the workspace directory); the run
    /// step executes with the workspace as working directory and its
    /// result is the one returned. The image is force-removed after the
    /// run completes even when the contained command exits nonzero.
    ///
    /// Known gap, kept from the original protocol: a transport fault
    /// during build or run aborts immediately without removing the image.
    pub fn run(
        &self,
        session: &mut dyn Session,
        work_dir: &Path,
        workspace: &Path,
        command: &str,
    ) -> Result<CommandResult, SessionError> {
        let spec = DockerBuildSpec::derive(self.config, workspace, command);

        // Author the Dockerfile next to the workspace directory.
        self.executor.exec(
            session,
            work_dir,
            &format!(
                "echo {} > {}",
                shell_quote(&spec.dockerfile_content),
                shell_quote(&spec.dockerfile_name)
            ),
            Verbosity::Verbose,
        )?;

        self.executor.exec(
            session,
            work_dir,
            &format!(
                "docker build -f {} -t {} .",
                shell_quote(&spec.dockerfile_name),
                shell_quote(&spec.image_name)
            ),
            Verbosity::Verbose,
        )?;

        let result = self.executor.exec(
            session,
            workspace,
            &spec.run_command(),
            Verbosity::Result,
        )?;

        // Unconditional once the run step completed, even on nonzero exit.
        self.executor.exec(
            session,
            workspace,
            &format!("docker rmi -f {}", shell_quote(&spec.image_name)),
            Verbosity::Verbose,
        )?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(image: &str) -> DockerConfig {
        DockerConfig {
            image: image.to_string(),
            args: String::new(),
            gpu: false,
        }
    }

    #[test]
    fn test_dockerfile_has_exactly_four_lines() {
        let spec = DockerBuildSpec::derive(
            &config("python:3.11"),
            Path::new("remote-run/proj_ab12cd34"),
            "python --version",
        );

        let lines: Vec<&str> = spec.dockerfile_content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "FROM python:3.11");
        assert_eq!(lines[1], "COPY proj_ab12cd34 /usr/src/proj_ab12cd34/");
        assert_eq!(lines[2], "WORKDIR /usr/src/proj_ab12cd34/");
        assert_eq!(lines[3], "CMD python --version");
    }

    #[test]
    fn test_image_name_is_lowercased() {
        let spec = DockerBuildSpec::derive(
            &config("ubuntu:22.04"),
            Path::new("work/MyProj_AB12CD34"),
            "true",
        );
        assert_eq!(spec.image_name, "remote_run_myproj_ab12cd34");
        assert_eq!(spec.dockerfile_name, "MyProj_AB12CD34.Dockerfile");
    }

    #[test]
    fn test_multiline_command_collapsed() {
        let spec = DockerBuildSpec::derive(
            &config("python:3.11"),
            Path::new("work/proj_00000000"),
            "python -c 'x'\r\npython -m pytest",
        );
        assert!(!spec.dockerfile_content.contains("\r"));
        let cmd_line = spec.dockerfile_content.lines().last().unwrap();
        assert_eq!(cmd_line, "CMD python -c 'x'  python -m pytest");
    }

    #[test]
    fn test_run_command_plain() {
        let spec = DockerBuildSpec::derive(
            &config("python:3.11"),
            Path::new("work/proj_00000000"),
            "true",
        );
        assert_eq!(spec.run_command(), "docker run --rm remote_run_proj_00000000");
    }

    #[test]
    fn test_run_command_with_args_and_gpu() {
        let mut cfg = config("python:3.11");
        cfg.args = "-v /data:/data".to_string();
        cfg.gpu = true;
        let spec = DockerBuildSpec::derive(&cfg, Path::new("work/proj_00000000"), "true");
        assert_eq!(
            spec.run_command(),
            "nvidia-docker run --rm -v /data:/data remote_run_proj_00000000"
        );
    }
}
