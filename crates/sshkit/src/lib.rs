//! # sshkit
//!
//! Remote command sessions over SSH.
//!
//! A [`Session`] owns one connection to one host. Connecting retries every
//! failed attempt, authentication included, and validates every fresh
//! connection with an `echo` canary. Commands run in one of three ways, chosen by their
//! [`Elevation`](execkit::Elevation):
//!
//! - plain exec channel
//! - pty-backed exec channel with the sudo password written up front
//! - login shell watched for password prompts
//!
//! ## Example
//!
//! ```no_run
//! use execkit::{Elevation, Invocation, RetryConfig};
//! use sshkit::{Session, SshConnector};
//! use std::time::Duration;
//!
//! let connector = SshConnector::new("edge01", 22, "ops", "/home/ops/.ssh/id_ed25519");
//! let mut session = Session::new(connector);
//! session.connect(&RetryConfig::default()).expect("unreachable");
//!
//! let invocation = Invocation::new("uptime", Elevation::Direct, Duration::from_secs(30));
//! let result = session.execute(&invocation, None).expect("channel failed");
//! println!("{}", result.stdout());
//!
//! session.close().expect("close failed");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod session;
pub mod ssh;
pub mod transport;

pub use session::{Session, SessionState};
pub use ssh::{SshChannel, SshConnector, SshTransport};
pub use transport::{Channel, Connector, Transport};
