//! Core types for command execution.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Exit code recorded for commands that exceeded their timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// How a system obtains elevated privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SudoMethod {
    /// The account already has the privileges it needs
    None,
    /// Passwordless sudo is configured
    Nopasswd,
    /// Sudo asks for a password
    #[default]
    Password,
}

impl fmt::Display for SudoMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SudoMethod::None => "none",
            SudoMethod::Nopasswd => "nopasswd",
            SudoMethod::Password => "password",
        };
        f.write_str(name)
    }
}

/// A sudo password held in memory for the duration of a run.
///
/// `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a password.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the password.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// The bytes written to a prompt: password followed by a newline.
    pub fn line(&self) -> Vec<u8> {
        let mut line = Vec::with_capacity(self.0.len() + 1);
        line.extend_from_slice(self.0.as_bytes());
        line.push(b'\n');
        line
    }

    /// Replace any echo of the password in `text`.
    pub fn mask(&self, text: &str) -> String {
        if self.0.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.0, "********")
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Privilege configuration for one system.
#[derive(Debug, Clone, Default)]
pub struct SudoConfig {
    /// Escalation method
    pub method: SudoMethod,
    /// Resolved password, if any
    pub secret: Option<Secret>,
    /// Use the unattended prefix when `method` is password but no secret resolved
    pub allow_unattended_fallback: bool,
}

impl SudoConfig {
    /// Config for an account that needs no escalation.
    pub fn none() -> Self {
        Self {
            method: SudoMethod::None,
            ..Default::default()
        }
    }

    /// Config for passwordless sudo.
    pub fn nopasswd() -> Self {
        Self {
            method: SudoMethod::Nopasswd,
            ..Default::default()
        }
    }

    /// Config for password sudo with an optional resolved secret.
    pub fn password(secret: Option<Secret>) -> Self {
        Self {
            method: SudoMethod::Password,
            secret,
            allow_unattended_fallback: false,
        }
    }

    /// Enable the unattended fallback for a missing password.
    pub fn with_unattended_fallback(mut self) -> Self {
        self.allow_unattended_fallback = true;
        self
    }
}

/// A command to run for an update type, as supplied by a capability lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Shell command text
    pub command: String,
    /// Whether the command needs elevated privileges
    pub needs_privilege: bool,
    /// Whether the tool elevates by itself (e.g. paru) and must not be wrapped
    pub handles_privilege_internally: bool,
}

impl CommandSpec {
    /// A user-level command.
    pub fn user(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            needs_privilege: false,
            handles_privilege_internally: false,
        }
    }

    /// A command that must be wrapped with sudo.
    pub fn privileged(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            needs_privilege: true,
            handles_privilege_internally: false,
        }
    }

    /// A command that needs privileges but asks for them itself.
    pub fn self_elevating(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            needs_privilege: true,
            handles_privilege_internally: true,
        }
    }

    /// The program name (first word of the command).
    pub fn program(&self) -> &str {
        self.command.split_whitespace().next().unwrap_or_default()
    }
}

/// The path a finalized command takes to obtain privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Elevation {
    /// Run as-is; any prefix is already in the command text
    Direct,
    /// `sudo -S` reads the secret from the command's input channel
    PipedSecret,
    /// The tool prompts by itself; watch the output and answer the prompt
    Interactive,
}

impl fmt::Display for Elevation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Elevation::Direct => "direct",
            Elevation::PipedSecret => "piped",
            Elevation::Interactive => "interactive",
        };
        f.write_str(name)
    }
}

/// A finalized command ready for an executor. Never contains the secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Final command text
    pub command: String,
    /// Elevation path
    pub elevation: Elevation,
    /// Wall-clock limit for the command
    pub timeout: Duration,
}

impl Invocation {
    /// Create an invocation.
    pub fn new(command: impl Into<String>, elevation: Elevation, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            elevation,
            timeout,
        }
    }
}

/// Outcome of one executed command.
///
/// `success` is derived from `exit_code` at construction and cannot be set
/// independently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    command: String,
    exit_code: i32,
    stdout: String,
    stderr: String,
    #[serde(serialize_with = "serialize_secs")]
    duration: Duration,
    success: bool,
}

impl CommandResult {
    /// Create a result from a finished command.
    pub fn new(
        command: impl Into<String>,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration,
            success: exit_code == 0,
        }
    }

    /// Result for a command killed after exceeding `timeout`.
    pub fn timed_out(
        command: impl Into<String>,
        stdout: impl Into<String>,
        stderr: &str,
        timeout: Duration,
        duration: Duration,
    ) -> Self {
        let diagnostic = format!("command timed out after {:.1}s", timeout.as_secs_f64());
        let stderr = if stderr.trim().is_empty() {
            diagnostic
        } else {
            format!("{}\n{diagnostic}", stderr.trim_end())
        };
        Self::new(command, TIMEOUT_EXIT_CODE, stdout, stderr, duration)
    }

    /// Result for a command that could not be dispatched.
    pub fn from_error(command: impl Into<String>, error: &crate::Error, duration: Duration) -> Self {
        Self::new(command, error.exit_code(), "", error.to_string(), duration)
    }

    /// Command text that ran.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Exit code.
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Captured standard output.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Captured standard error (or diagnostic).
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Wall-clock duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Whether the command was killed for exceeding its timeout.
    pub fn is_timeout(&self) -> bool {
        self.exit_code == TIMEOUT_EXIT_CODE
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts
    pub max_attempts: u32,
    /// Base delay between attempts
    pub base_delay: Duration,
    /// Multiplier for exponential backoff (1.0 keeps the delay constant)
    pub backoff_factor: f64,
    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            backoff_factor: 1.0,
            max_delay: Duration::from_secs(300), // 5 minutes max
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            max_delay: Duration::from_secs(300),
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}
