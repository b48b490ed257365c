//! libssh2 transport.
//!
//! Channels are switched to non-blocking mode after setup so the session can
//! poll them against its own deadlines. Setup, writes and teardown run in
//! blocking mode, bounded by the connect timeout.

use crate::transport::{Channel, Connector, Transport};
use execkit::{Error, Result};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

/// Terminal type requested for pty-backed channels.
const TERM: &str = "xterm";

/// Connects with public-key authentication.
#[derive(Debug, Clone)]
pub struct SshConnector {
    hostname: String,
    port: u16,
    user: String,
    key_file: PathBuf,
    connect_timeout: Duration,
}

impl SshConnector {
    /// Connector for `user@hostname:port` authenticating with `key_file`.
    pub fn new(
        hostname: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        key_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            user: user.into(),
            key_file: key_file.into(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Limit for TCP connect, handshake and blocking channel operations.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn connect_error(&self, message: impl ToString) -> Error {
        Error::Connect {
            hostname: self.hostname.clone(),
            message: message.to_string(),
        }
    }

    fn auth_error(&self, message: impl ToString) -> Error {
        Error::Auth {
            hostname: self.hostname.clone(),
            message: message.to_string(),
        }
    }
}

impl Connector for SshConnector {
    type Transport = SshTransport;

    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn connect(&self) -> Result<SshTransport> {
        if !self.key_file.exists() {
            return Err(self.auth_error(format!(
                "SSH key file not found: {}",
                self.key_file.display()
            )));
        }

        let addr = (self.hostname.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| self.connect_error(e))?
            .next()
            .ok_or_else(|| self.connect_error("no address for host"))?;

        let tcp = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|e| self.connect_error(e))?;

        let mut session = ssh2::Session::new().map_err(|e| self.connect_error(e))?;
        session.set_timeout(self.connect_timeout.as_millis() as u32);
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| self.connect_error(e))?;
        log::warn!(
            "{}",
            unverified_host_key(
                &self.hostname,
                session.host_key_hash(ssh2::HashType::Sha256)
            )
        );

        session
            .userauth_pubkey_file(&self.user, None, &self.key_file, None)
            .map_err(|e| self.auth_error(e))?;
        if !session.authenticated() {
            return Err(self.auth_error("public key not accepted"));
        }

        log::debug!("Authenticated to {} as {}", self.hostname, self.user);
        Ok(SshTransport { session })
    }
}

/// An authenticated libssh2 session.
pub struct SshTransport {
    session: ssh2::Session,
}

impl std::fmt::Debug for SshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTransport").finish_non_exhaustive()
    }
}

impl SshTransport {
    fn open(&self, pty: bool) -> Result<ssh2::Channel> {
        self.session.set_blocking(true);
        let mut channel = self.session.channel_session().map_err(transport_error)?;
        if pty {
            channel
                .request_pty(TERM, None, None)
                .map_err(transport_error)?;
        }
        Ok(channel)
    }

    fn wrap(&self, channel: ssh2::Channel) -> SshChannel {
        self.session.set_blocking(false);
        SshChannel {
            channel,
            session: self.session.clone(),
        }
    }
}

impl Transport for SshTransport {
    type Channel = SshChannel;

    fn exec(&mut self, command: &str, pty: bool) -> Result<SshChannel> {
        let mut channel = self.open(pty)?;
        channel.exec(command).map_err(transport_error)?;
        Ok(self.wrap(channel))
    }

    fn shell(&mut self) -> Result<SshChannel> {
        let mut channel = self.open(true)?;
        channel.shell().map_err(transport_error)?;
        Ok(self.wrap(channel))
    }

    fn disconnect(&mut self) -> Result<()> {
        self.session.set_blocking(true);
        self.session
            .disconnect(None, "updall finished", None)
            .map_err(transport_error)
    }
}

/// A libssh2 channel in non-blocking mode.
pub struct SshChannel {
    channel: ssh2::Channel,
    session: ssh2::Session,
}

impl SshChannel {
    fn blocking<T>(&mut self, op: impl FnOnce(&mut ssh2::Channel) -> Result<T>) -> Result<T> {
        self.session.set_blocking(true);
        let result = op(&mut self.channel);
        self.session.set_blocking(false);
        result
    }
}

impl Channel for SshChannel {
    fn read_stdout(&mut self, buf: &mut [u8]) -> Result<usize> {
        available(self.channel.read(buf))
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> Result<usize> {
        available(self.channel.stderr().read(buf))
    }

    fn write_input(&mut self, data: &[u8]) -> Result<()> {
        self.blocking(|channel| {
            channel.write_all(data)?;
            channel.flush()?;
            Ok(())
        })
    }

    fn exit_status(&mut self) -> Result<Option<i32>> {
        if !self.channel.eof() {
            return Ok(None);
        }
        self.blocking(|channel| {
            channel.wait_close().map_err(transport_error)?;
            channel.exit_status().map(Some).map_err(transport_error)
        })
    }

    fn close(&mut self) -> Result<()> {
        self.blocking(|channel| channel.close().map_err(transport_error))
    }
}

fn available(result: io::Result<usize>) -> Result<usize> {
    match result {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(Error::Transport(e.to_string())),
    }
}

/// Known-hosts checking is not performed; every connect says so.
fn unverified_host_key(hostname: &str, sha256: Option<&[u8]>) -> String {
    match sha256 {
        Some(hash) => {
            let fingerprint: Vec<String> = hash.iter().map(|b| format!("{b:02x}")).collect();
            format!(
                "Host key for {} is not verified (SHA256 {})",
                hostname,
                fingerprint.join(":")
            )
        }
        None => format!("Host key for {hostname} is not verified"),
    }
}

fn transport_error(e: ssh2::Error) -> Error {
    Error::Transport(e.to_string())
}
