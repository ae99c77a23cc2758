//! remote-run CLI
//!
//! Entry point for the `remote-run` command-line tool.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use dialoguer::Password;

use remote_run::config::{
    resolve_connection, ConnectionOverrides, FileConfig, RunnerConfig, SshAuth,
};
use remote_run::{remote_run, remote_run_docker, CommandResult, DockerConfig, Verbosity};

#[derive(Parser)]
#[command(name = "remote-run")]
#[command(about = "Run tasks in a remote worker over SSH", version)]
struct Cli {
    /// Command to execute in the remote workspace
    command: String,

    /// Connection URL in the form user[:password]@host[:port]
    ssh_url: Option<String>,

    /// Remote host (overrides the URL)
    #[arg(long)]
    host: Option<String>,

    /// SSH port (default 22)
    #[arg(long)]
    port: Option<u16>,

    /// SSH username (overrides the URL)
    #[arg(long, short = 'u')]
    username: Option<String>,

    /// SSH password; prompted interactively when neither this nor a key
    /// file is given
    #[arg(long)]
    password: Option<String>,

    /// Path to an SSH private key file
    #[arg(long, short = 'i')]
    key_filename: Option<PathBuf>,

    /// Remote directory holding the workspaces (default ./remote-run)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Run the command inside a container built from this base image
    #[arg(long)]
    docker_image: Option<String>,

    /// Extra arguments for `docker run`
    #[arg(long)]
    docker_args: Option<String>,

    /// Use the nvidia-docker GPU runtime
    #[arg(long)]
    gpu: bool,

    /// Console verbosity: 0 silent, 1 command output only, 2 everything
    #[arg(long, default_value_t = 2)]
    log_level: u8,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Print the result as JSON instead of echoing output
    #[arg(long)]
    json: bool,

    /// Path to a config file (default: ./.remote-run.toml if present)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => FileConfig::load(path),
        None => FileConfig::load_default(),
    };
    let file_config = match file_config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    let overrides = ConnectionOverrides {
        url: cli.ssh_url.clone(),
        host: cli.host.clone(),
        port: cli.port,
        username: cli.username.clone(),
        password: cli.password.clone(),
        key_filename: cli.key_filename.clone(),
    };

    let connection = match resolve_connection(&overrides, &file_config) {
        Ok(connection) => connection,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!();
            eprintln!(
                "Usage: remote-run COMMAND USERNAME:PASSWORD@HOST\n\
                 \x20      or\n\
                 \x20      remote-run COMMAND --host HOST --username USERNAME --password PASSWORD"
            );
            process::exit(1);
        }
    };

    // No password and no key: ask for a password rather than failing.
    let password = match (&connection.password, &connection.key_filename) {
        (None, None) => {
            eprintln!("Neither a password nor a key file was provided.");
            match Password::new().with_prompt("Enter password").interact() {
                Ok(password) => Some(password),
                Err(e) => {
                    eprintln!("Failed to read password: {}", e);
                    process::exit(1);
                }
            }
        }
        _ => connection.password.clone(),
    };

    let auth = match SshAuth::from_options(password, connection.key_filename.clone()) {
        Ok(auth) => auth,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let work_dir = cli.work_dir.clone().unwrap_or(connection.work_dir.clone());
    let verbosity = if cli.json {
        // JSON mode owns stdout; don't interleave narration with it.
        Verbosity::Silent
    } else {
        Verbosity::from_level(cli.log_level)
    };

    let runner_config = RunnerConfig::new(connection.host, connection.username, auth)
        .with_port(connection.port)
        .with_work_dir(work_dir)
        .with_verbosity(verbosity)
        .with_color(!cli.no_color);

    let docker_image = cli.docker_image.clone().or(file_config.docker.image);
    let result = match docker_image {
        Some(image) => {
            let docker = DockerConfig {
                image,
                args: cli
                    .docker_args
                    .clone()
                    .or(file_config.docker.args)
                    .unwrap_or_default(),
                gpu: cli.gpu || file_config.docker.gpu.unwrap_or(false),
            };
            remote_run_docker(&cli.command, runner_config, docker)
        }
        None => remote_run(&cli.command, runner_config),
    };

    match result {
        Ok(result) => finish(&result, cli.json),
        Err(e) => {
            eprintln!("remote-run: {}", e);
            process::exit(1);
        }
    }
}

fn finish(result: &CommandResult, json: bool) -> ! {
    if json {
        match serde_json::to_string_pretty(result) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
    }
    process::exit(result.exit_code);
}
