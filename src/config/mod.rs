//! Runner configuration
//!
//! Connection settings come from three layers, later wins:
//! 1. optional repo config file (`.remote-run.toml` at the sync root)
//! 2. a combined `user[:password]@host[:port]` URL
//! 3. individual CLI flags
//!
//! Credential validation happens here, before any session is opened: a
//! config without a password or key file never reaches the transport.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::run::Verbosity;

/// Default remote directory that hosts all workspaces.
pub const DEFAULT_WORK_DIR: &str = "./remote-run";

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Configuration errors, all fatal at construction time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("either a password or an ssh key file must be provided")]
    MissingAuth,

    #[error("missing connection host")]
    MissingHost,

    #[error("missing connection username")]
    MissingUsername,

    #[error("invalid ssh url '{0}': expected user[:password]@host[:port]")]
    InvalidUrl(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Authentication material for the SSH session.
///
/// Exactly one variant is always present; "no credentials" is rejected at
/// construction via [`SshAuth::from_options`].
#[derive(Debug, Clone)]
pub enum SshAuth {
    Password(String),
    KeyFile(PathBuf),
}

impl SshAuth {
    /// Build from optional CLI/file inputs. A password wins over a key
    /// when both are given; neither is a fatal configuration error.
    pub fn from_options(
        password: Option<String>,
        key_filename: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        match (password, key_filename) {
            (Some(password), _) => Ok(SshAuth::Password(password)),
            (None, Some(key)) => Ok(SshAuth::KeyFile(key)),
            (None, None) => Err(ConfigError::MissingAuth),
        }
    }

    /// Short human label for connection narration.
    pub fn describe(&self) -> &'static str {
        match self {
            SshAuth::Password(_) => "password",
            SshAuth::KeyFile(_) => "ssh key",
        }
    }
}

/// Full configuration for one [`crate::RemoteRunner`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SshAuth,
    /// Remote directory holding all workspaces
    pub work_dir: PathBuf,
    pub verbosity: Verbosity,
    pub color: bool,
}

impl RunnerConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>, auth: SshAuth) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            auth,
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            verbosity: Verbosity::Verbose,
            color: true,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// `user@host:port`, used in narration and error messages.
    pub fn remote_label(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Parsed `user[:password]@host[:port]` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshUrl {
    pub username: String,
    pub password: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl SshUrl {
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let (user_part, host_part) = url
            .split_once('@')
            .ok_or_else(|| ConfigError::InvalidUrl(url.to_string()))?;

        let (username, password) = match user_part.split_once(':') {
            Some((user, pass)) => (user, Some(pass.to_string())),
            None => (user_part, None),
        };

        let (host, port) = match host_part.split_once(':') {
            Some((host, port)) => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;
                (host, Some(port))
            }
            None => (host_part, None),
        };

        if username.is_empty() || host.is_empty() {
            return Err(ConfigError::InvalidUrl(url.to_string()));
        }

        Ok(Self {
            username: username.to_string(),
            password,
            host: host.to_string(),
            port,
        })
    }
}

/// Optional repo config file (`.remote-run.toml`).
///
/// Holds connection defaults only; passwords deliberately have no field
/// here and are never persisted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub key_filename: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    #[serde(default)]
    pub docker: DockerFileConfig,
}

/// `[docker]` section of the repo config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DockerFileConfig {
    pub image: Option<String>,
    pub args: Option<String>,
    pub gpu: Option<bool>,
}

impl FileConfig {
    pub const DEFAULT_PATH: &'static str = ".remote-run.toml";

    /// Load a config file; the file must exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `.remote-run.toml` from the current directory if present,
    /// otherwise fall back to empty defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Path::new(Self::DEFAULT_PATH);
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Raw connection inputs from the CLI, before layering.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOverrides {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub key_filename: Option<PathBuf>,
}

/// Fully layered connection settings, credentials still optional so the
/// CLI can decide to prompt for a password interactively.
#[derive(Debug, Clone)]
pub struct ResolvedConnection {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub key_filename: Option<PathBuf>,
    pub work_dir: PathBuf,
}

/// Merge file config, URL, and CLI flags (flags win, then URL, then file).
pub fn resolve_connection(
    overrides: &ConnectionOverrides,
    file: &FileConfig,
) -> Result<ResolvedConnection, ConfigError> {
    let url = overrides
        .url
        .as_deref()
        .map(SshUrl::parse)
        .transpose()?;

    let host = overrides
        .host
        .clone()
        .or_else(|| url.as_ref().map(|u| u.host.clone()))
        .or_else(|| file.host.clone())
        .ok_or(ConfigError::MissingHost)?;

    let username = overrides
        .username
        .clone()
        .or_else(|| url.as_ref().map(|u| u.username.clone()))
        .or_else(|| file.username.clone())
        .ok_or(ConfigError::MissingUsername)?;

    let port = overrides
        .port
        .or_else(|| url.as_ref().and_then(|u| u.port))
        .or(file.port)
        .unwrap_or(DEFAULT_PORT);

    let password = overrides
        .password
        .clone()
        .or_else(|| url.as_ref().and_then(|u| u.password.clone()));

    let key_filename = overrides
        .key_filename
        .clone()
        .or_else(|| file.key_filename.clone());

    let work_dir = file
        .work_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR));

    Ok(ResolvedConnection {
        host,
        port,
        username,
        password,
        key_filename,
        work_dir,
    })
}
