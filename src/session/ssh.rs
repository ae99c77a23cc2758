//! Production SSH session over the `ssh2` crate
//!
//! One TCP connection, one libssh2 session, one SFTP subsystem. Commands
//! each get a fresh exec channel; file operations go through SFTP.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::TcpStream;
use std::path::Path;

use ssh2::ErrorCode;

use crate::config::{RunnerConfig, SshAuth};

use super::{RemoteEntry, Session, SessionError};

/// SFTP status codes for a missing file / missing path (libssh2 FX codes).
const SFTP_NO_SUCH_FILE: i32 = 2;
const SFTP_NO_SUCH_PATH: i32 = 10;

/// Real SSH session for production use.
pub struct SshSession {
    session: ssh2::Session,
    sftp: ssh2::Sftp,
    closed: bool,
}

impl SshSession {
    /// Connect and authenticate using the configured credentials.
    ///
    /// Fails fast on connection refusal, handshake failure, or rejected
    /// authentication; no partial session is ever returned.
    pub fn connect(config: &RunnerConfig) -> Result<Self, SessionError> {
        let addr = format!("{}:{}", config.host, config.port);
        let tcp = TcpStream::connect(&addr).map_err(|source| SessionError::Connect {
            addr: addr.clone(),
            source,
        })?;

        let mut session = ssh2::Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;

        match &config.auth {
            SshAuth::Password(password) => {
                session.userauth_password(&config.username, password)?;
            }
            SshAuth::KeyFile(key_path) => {
                session.userauth_pubkey_file(&config.username, None, key_path, None)?;
            }
        }

        if !session.authenticated() {
            return Err(SessionError::AuthRejected(format!(
                "{}@{}",
                config.username, addr
            )));
        }

        let sftp = session.sftp()?;

        Ok(Self {
            session,
            sftp,
            closed: false,
        })
    }

    fn map_sftp_error(path: &Path, err: ssh2::Error) -> SessionError {
        match err.code() {
            ErrorCode::SFTP(SFTP_NO_SUCH_FILE) | ErrorCode::SFTP(SFTP_NO_SUCH_PATH) => {
                SessionError::NotFound(path.to_path_buf())
            }
            _ => SessionError::Ssh(err),
        }
    }
}

impl Session for SshSession {
    fn exec_streamed(
        &mut self,
        command: &str,
        on_stdout: &mut dyn FnMut(&str),
        on_stderr: &mut dyn FnMut(&str),
    ) -> Result<i32, SessionError> {
        let mut channel = self.session.channel_session()?;
        channel.exec(command)?;

        {
            let reader = BufReader::new(&mut channel);
            for line in reader.lines() {
                on_stdout(&line?);
            }
        }
        {
            let reader = BufReader::new(channel.stderr());
            for line in reader.lines() {
                on_stderr(&line?);
            }
        }

        // The exit status is only valid once the channel is fully closed.
        channel.wait_close()?;
        Ok(channel.exit_status()?)
    }

    fn mkdir(&mut self, path: &Path) -> Result<(), SessionError> {
        self.sftp
            .mkdir(path, 0o755)
            .map_err(|e| Self::map_sftp_error(path, e))
    }

    fn list_dir(&mut self, path: &Path) -> Result<Vec<RemoteEntry>, SessionError> {
        let entries = self
            .sftp
            .readdir(path)
            .map_err(|e| Self::map_sftp_error(path, e))?;

        Ok(entries
            .into_iter()
            .filter_map(|(entry_path, stat)| {
                let name = entry_path.file_name()?.to_string_lossy().into_owned();
                Some(RemoteEntry {
                    name,
                    mtime: stat.mtime.map(|m| m as i64).unwrap_or(0),
                })
            })
            .collect())
    }

    fn upload(&mut self, local: &Path, remote: &Path) -> Result<(), SessionError> {
        let mut source = File::open(local)?;
        let mut target = self
            .sftp
            .create(remote)
            .map_err(|e| Self::map_sftp_error(remote, e))?;
        io::copy(&mut source, &mut target)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.session
            .disconnect(None, "remote-run: session closed", None)?;
        Ok(())
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
