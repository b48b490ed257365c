//! # execkit
//!
//! Command execution with privilege escalation.
//!
//! This crate provides functionality for:
//! - Deciding how a command obtains root ([`privilege::prepare`])
//! - Running commands locally, buffered or under a pseudo-terminal
//! - Answering sudo password prompts of self-elevating tools ([`prompt::monitor`])
//! - Retrying failed connection attempts with backoff
//! - Classifying failures into actionable categories
//!
//! ## Example
//!
//! ```no_run
//! use execkit::{CommandSpec, Executor, LocalExecutor, SudoConfig, privilege};
//! use std::time::Duration;
//!
//! let spec = CommandSpec::privileged("apt update");
//! let invocation = privilege::prepare(&spec, &SudoConfig::nopasswd(), Duration::from_secs(300))
//!     .expect("nopasswd never needs a secret");
//! assert_eq!(invocation.command, "sudo -n apt update");
//!
//! let mut local = LocalExecutor::new();
//! let result = local.execute(&invocation, None).expect("failed to start");
//! println!("{} exited with {}", result.command(), result.exit_code());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod executor;
pub mod local;
pub mod privilege;
pub mod prompt;
pub mod retry;
pub mod types;

pub use error::{
    Error, ErrorCategory, FailureHint, Result, classify_command_failure,
    classify_connection_message,
};
pub use executor::Executor;
pub use local::LocalExecutor;
pub use prompt::{MonitorOptions, MonitorOutcome, PromptStream};
pub use retry::{LogCallback, NoCallback, RetryCallback, with_retry};
pub use types::{
    CommandResult, CommandSpec, Elevation, Invocation, RetryConfig, Secret, SudoConfig,
    SudoMethod, TIMEOUT_EXIT_CODE,
};
