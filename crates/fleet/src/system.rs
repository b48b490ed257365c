//! Target systems and locality.

use execkit::SudoConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Operating system family of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    /// Arch Linux (pacman/paru)
    Arch,
    /// Debian and derivatives (apt)
    Debian,
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flavor::Arch => write!(f, "arch"),
            Flavor::Debian => write!(f, "debian"),
        }
    }
}

/// Whether a system is this machine or reached over the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    /// Commands run on this machine
    Local,
    /// Commands run over an SSH session
    Remote,
}

impl fmt::Display for Locality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locality::Local => write!(f, "local"),
            Locality::Remote => write!(f, "remote"),
        }
    }
}

/// SSH credentials for a remote system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCredential {
    /// Login user
    pub user: String,
    /// Private key file
    pub key_file: PathBuf,
    /// SSH port
    pub port: u16,
}

/// A machine to update.
#[derive(Debug, Clone)]
pub struct TargetSystem {
    /// Name from the configuration
    pub name: String,
    /// Hostname or address
    pub hostname: String,
    /// OS family
    pub flavor: Flavor,
    /// Privilege configuration with the resolved secret
    pub sudo: SudoConfig,
    /// Update types in the order they run
    pub update_types: Vec<String>,
    /// Credentials used when the system is remote
    pub remote: Option<RemoteCredential>,
}

impl TargetSystem {
    /// Create a system with no update types and default sudo config.
    pub fn new(name: impl Into<String>, hostname: impl Into<String>, flavor: Flavor) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            flavor,
            sudo: SudoConfig::default(),
            update_types: Vec::new(),
            remote: None,
        }
    }

    /// Set the privilege configuration.
    pub fn with_sudo(mut self, sudo: SudoConfig) -> Self {
        self.sudo = sudo;
        self
    }

    /// Set the update types.
    pub fn with_update_types<I, S>(mut self, update_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_types = update_types.into_iter().map(Into::into).collect();
        self
    }

    /// Set the SSH credentials.
    pub fn with_remote(mut self, remote: RemoteCredential) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Locality, derived from the hostname.
    pub fn locality(&self) -> Locality {
        if is_local_hostname(&self.hostname) {
            Locality::Local
        } else {
            Locality::Remote
        }
    }

    /// Whether commands run on this machine.
    pub fn is_local(&self) -> bool {
        self.locality() == Locality::Local
    }

    /// Keep only the update types in `only`, preserving configured order.
    pub fn retain_update_types(&mut self, only: &[String]) {
        self.update_types.retain(|t| only.contains(t));
    }
}

/// Whether `hostname` refers to this machine.
pub fn is_local_hostname(hostname: &str) -> bool {
    let hostname = hostname.trim();
    if matches!(hostname, "localhost" | "127.0.0.1" | "::1") {
        return true;
    }
    current_hostname().is_some_and(|current| current.eq_ignore_ascii_case(hostname))
}

/// Hostname of this machine.
#[cfg(unix)]
pub fn current_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer is valid for its full length
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..len]).into_owned();
    (!name.is_empty()).then_some(name)
}

/// Hostname of this machine.
#[cfg(not(unix))]
pub fn current_hostname() -> Option<String> {
    None
}
