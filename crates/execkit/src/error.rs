//! Error types for command execution and session handling.
//!
//! Errors are categorized to enable retry decisions and actionable user
//! feedback. Command failures (non-zero exits, timeouts) are *not* errors:
//! they are recorded in a [`CommandResult`](crate::CommandResult). Only
//! conditions that prevent a command from being dispatched at all end up here.

use std::io;
use thiserror::Error;

/// Categories of failures, used for retry logic and hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Hostname could not be resolved
    Resolution,
    /// Remote host refused the connection
    Refused,
    /// Key or authentication failure
    Auth,
    /// Connection or operation timed out
    Timeout,
    /// Other network or transport issue
    Network,
    /// Sudo password missing or rejected
    Credential,
    /// Program is not installed on the target
    CommandNotFound,
    /// Permission denied while running a command
    Permission,
    /// Package database lock held by another process
    Locked,
    /// Invalid configuration (unknown update type, bad settings)
    Configuration,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get a user-friendly description of this category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Resolution => "Hostname resolution failed",
            Self::Refused => "Connection refused",
            Self::Auth => "Authentication failed",
            Self::Timeout => "Timed out",
            Self::Network => "Network connectivity issue",
            Self::Credential => "Sudo credential problem",
            Self::CommandNotFound => "Command not found",
            Self::Permission => "Permission denied",
            Self::Locked => "Package database locked",
            Self::Configuration => "Configuration error",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for this category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Resolution => "Check the hostname, DNS resolution or /etc/hosts entry",
            Self::Refused => "Check that sshd is running and the SSH port is open",
            Self::Auth => "Check key permissions (600) and that the key is authorized on the host",
            Self::Timeout => "Check network connectivity or raise the timeout in the config",
            Self::Network => "Check network connectivity to the host",
            Self::Credential => "Export the sudo password variable or configure NOPASSWD sudo",
            Self::CommandNotFound => "Install the missing tool or remove the update type",
            Self::Permission => "Check the sudo configuration for this user",
            Self::Locked => "Wait for the other package manager instance to finish",
            Self::Configuration => "Fix the configuration file and try again",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that prevent a command or session operation from completing.
#[derive(Debug, Error)]
pub enum Error {
    /// Session establishment failed after every retry
    #[error("failed to connect to {hostname} after {attempts} attempt(s): {message}")]
    ConnectionFailed {
        /// Host that could not be reached
        hostname: String,
        /// Number of attempts performed
        attempts: u32,
        /// Message from the last attempt
        message: String,
    },

    /// A single connection attempt failed
    #[error("cannot connect to {hostname}: {message}")]
    Connect {
        /// Host that could not be reached
        hostname: String,
        /// Transport error message
        message: String,
    },

    /// Key loading or authentication failed
    #[error("authentication to {hostname} failed: {message}")]
    Auth {
        /// Host that rejected the credential
        hostname: String,
        /// Details from the transport
        message: String,
    },

    /// Privilege escalation needs a password that is not available
    #[error("sudo password required but not provided ({context})")]
    CredentialRequired {
        /// Where the password was needed
        context: String,
    },

    /// The password was sent and the prompt came back
    #[error("sudo password was rejected")]
    CredentialRejected,

    /// Capability lookup for an unknown update type
    #[error("unknown update type: {0}")]
    UnknownUpdateType(String),

    /// Operation on a session that is not connected
    #[error("not connected to {0}")]
    NotConnected(String),

    /// Channel-level failure on an established session
    #[error("transport error: {0}")]
    Transport(String),

    /// Pseudo-terminal setup failure
    #[error("pty error: {0}")]
    Pty(String),

    /// The command could not be started
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        /// Command text that failed to start
        command: String,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category for retry logic and hints.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ConnectionFailed { message, .. } | Error::Connect { message, .. } => {
                classify_connection_message(message)
            }
            Error::Auth { .. } => ErrorCategory::Auth,
            Error::CredentialRequired { .. } | Error::CredentialRejected => {
                ErrorCategory::Credential
            }
            Error::UnknownUpdateType(_) => ErrorCategory::Configuration,
            Error::NotConnected(_) | Error::Transport(_) => ErrorCategory::Network,
            Error::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                ErrorCategory::CommandNotFound
            }
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is worth retrying.
    ///
    /// Every failed establishment attempt is retryable, authentication
    /// rejections included. An exhausted [`Error::ConnectionFailed`] is final,
    /// as is anything raised once the session is up.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connect { .. } | Error::Auth { .. })
    }

    /// Exit code recorded when this error replaces a command's own result.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound => 127,
            _ => 1,
        }
    }
}

/// Result type for execution operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categorize a transport error message.
pub fn classify_connection_message(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();

    if lower.contains("name resolution")
        || lower.contains("unknown host")
        || lower.contains("failed to lookup")
        || lower.contains("not known")
        || lower.contains("no address")
    {
        return ErrorCategory::Resolution;
    }

    if lower.contains("connection refused") {
        return ErrorCategory::Refused;
    }

    if lower.contains("authentication")
        || lower.contains("permission denied")
        || lower.contains("publickey")
    {
        return ErrorCategory::Auth;
    }

    if lower.contains("timed out") || lower.contains("timeout") {
        return ErrorCategory::Timeout;
    }

    ErrorCategory::Network
}

/// Diagnosis of a failed command, derived from its stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureHint {
    /// Category of the failure
    pub category: ErrorCategory,
    /// Suggested fix
    pub hint: String,
}

/// Categorize a failed command from its text and stderr.
///
/// Only substring scanning is done here; output is never parsed.
pub fn classify_command_failure(command: &str, stderr: &str) -> FailureHint {
    let lower = stderr.to_lowercase();

    if lower.contains("command not found") || lower.contains("no such file") {
        let program = command.split_whitespace().next().unwrap_or(command);
        let hint = match program {
            "rustup" | "cargo" => "Install the Rust toolchain with rustup".to_string(),
            "npm" => "Install Node.js and npm".to_string(),
            "sdk" => "Install SDKMAN! from https://sdkman.io".to_string(),
            "gcloud" => "Install the Google Cloud SDK".to_string(),
            "paru" => "Install the paru AUR helper".to_string(),
            _ => format!("Install the tool required by `{command}`"),
        };
        return FailureHint {
            category: ErrorCategory::CommandNotFound,
            hint,
        };
    }

    let category = if lower.contains("password") && lower.contains("required") {
        ErrorCategory::Credential
    } else if lower.contains("permission denied") || lower.contains("not in the sudoers") {
        ErrorCategory::Permission
    } else if lower.contains("lock") {
        ErrorCategory::Locked
    } else if lower.contains("network")
        || lower.contains("could not resolve")
        || lower.contains("failed to download")
        || lower.contains("temporary failure")
    {
        ErrorCategory::Network
    } else {
        ErrorCategory::Other
    };

    FailureHint {
        category,
        hint: category.advice().to_string(),
    }
}
