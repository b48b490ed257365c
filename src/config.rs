use crate::paths;
use anyhow::{Context, Result, bail, ensure};
use execkit::{RetryConfig, Secret, SudoConfig, SudoMethod};
use fleet::{CapabilityProvider, CapabilityTable, Flavor, RemoteCredential, TargetSystem, is_local_hostname};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Env var holding the sudo password when a system does not name one
pub const DEFAULT_PASSWORD_ENV: &str = "UPDATE_SUDO_PASS";

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub systems: BTreeMap<String, SystemConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.systems.is_empty(), "No systems configured");
        self.settings.validate().context("Invalid [settings]")?;

        for (name, system) in &self.systems {
            system
                .validate()
                .with_context(|| format!("Invalid system '{name}'"))?;
        }
        Ok(())
    }

    /// Systems to operate on, optionally narrowed to one.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<(&str, &SystemConfig)>> {
        match name {
            Some(name) => match self.systems.get_key_value(name) {
                Some((name, system)) => Ok(vec![(name.as_str(), system)]),
                None => {
                    let known = self.systems.keys().cloned().collect::<Vec<_>>().join(", ");
                    bail!("Unknown system '{name}' (configured: {known})")
                }
            },
            None => Ok(self
                .systems
                .iter()
                .map(|(name, system)| (name.as_str(), system))
                .collect()),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Log level used when -v is not given
    #[serde(default)]
    pub log_level: Option<String>,
    /// Per-command timeout in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,
    /// SSH connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay between connection attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    /// Delay multiplier per attempt; 1.0 keeps it constant
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: f64,
}

fn default_command_timeout() -> u64 {
    3600
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    5.0
}

fn default_retry_backoff() -> f64 {
    1.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: None,
            command_timeout: default_command_timeout(),
            connect_timeout: default_connect_timeout(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

impl Settings {
    fn validate(&self) -> Result<()> {
        ensure!(self.command_timeout > 0, "command_timeout must be greater than 0");
        ensure!(self.connect_timeout > 0, "connect_timeout must be greater than 0");
        ensure!(self.max_retries >= 1, "max_retries must be at least 1");
        ensure!(
            self.retry_delay.is_finite() && self.retry_delay >= 0.0,
            "retry_delay must not be negative"
        );
        ensure!(
            self.retry_backoff.is_finite() && self.retry_backoff >= 1.0,
            "retry_backoff must be at least 1.0"
        );
        if self.log_level.is_some() {
            self.log_level()?;
        }
        Ok(())
    }

    pub fn log_level(&self) -> Result<Option<log::LevelFilter>> {
        self.log_level
            .as_deref()
            .map(|level| {
                level
                    .parse::<log::LevelFilter>()
                    .map_err(|_| anyhow::anyhow!("log_level '{level}' is not a valid level"))
            })
            .transpose()
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_retries,
            Duration::from_secs_f64(self.retry_delay),
            self.retry_backoff,
        )
    }
}

// ============================================================================
// Systems
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SystemConfig {
    pub hostname: String,
    #[serde(rename = "type")]
    pub flavor: Flavor,
    #[serde(default)]
    pub updates: Vec<String>,
    #[serde(default)]
    pub sudo_method: SudoMethod,
    #[serde(default = "default_password_env")]
    pub sudo_password_env: String,
    #[serde(default)]
    pub allow_unattended_fallback: bool,
    #[serde(default)]
    pub ssh: Option<SshConfig>,
}

fn default_password_env() -> String {
    DEFAULT_PASSWORD_ENV.to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SshConfig {
    pub user: String,
    pub key_file: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

fn default_ssh_port() -> u16 {
    22
}

impl SystemConfig {
    fn validate(&self) -> Result<()> {
        ensure!(!self.hostname.trim().is_empty(), "hostname must not be empty");

        if !self.is_local() {
            let Some(ssh) = &self.ssh else {
                bail!("remote host {} needs an [ssh] table", self.hostname);
            };
            ensure!(!ssh.user.trim().is_empty(), "ssh.user must not be empty");
            ensure!(!ssh.key_file.trim().is_empty(), "ssh.key_file must not be empty");
            ensure!(ssh.port > 0, "ssh.port must not be 0");
        }

        let table = CapabilityTable::for_flavor(self.flavor);
        for update in &self.updates {
            ensure!(
                table.supports(update),
                "update type '{update}' is not available on {} (known: {})",
                self.flavor,
                table.update_types().join(", ")
            );
        }
        Ok(())
    }

    pub fn is_local(&self) -> bool {
        is_local_hostname(&self.hostname)
    }

    /// Build the target with an already resolved secret.
    pub fn to_target(&self, name: &str, secret: Option<Secret>) -> TargetSystem {
        let mut sudo = match self.sudo_method {
            SudoMethod::None => SudoConfig::none(),
            SudoMethod::Nopasswd => SudoConfig::nopasswd(),
            SudoMethod::Password => SudoConfig::password(secret),
        };
        if self.allow_unattended_fallback {
            sudo = sudo.with_unattended_fallback();
        }

        let mut target = TargetSystem::new(name, &self.hostname, self.flavor)
            .with_sudo(sudo)
            .with_update_types(self.updates.iter().cloned());

        if let Some(ssh) = &self.ssh {
            target = target.with_remote(RemoteCredential {
                user: ssh.user.clone(),
                key_file: paths::expand(&ssh.key_file),
                port: ssh.port,
            });
        }
        target
    }
}

// ============================================================================
// Tests
// ============================================================================
