//! # fleet
//!
//! Update orchestration for a small set of machines.
//!
//! A [`TargetSystem`] names a host, its [`Flavor`], its sudo configuration
//! and the update types to run. The [`Orchestrator`] resolves each update
//! type through a [`CapabilityProvider`], finalizes every command with the
//! privilege strategy and dispatches it through an executor obtained from a
//! [`Backend`]. Results come back as a [`SystemResult`].
//!
//! ## Example
//!
//! ```no_run
//! use execkit::{Executor, LocalExecutor, SudoConfig};
//! use fleet::{Backend, CapabilityTable, Flavor, Orchestrator, TargetSystem};
//!
//! struct LocalOnly;
//!
//! impl Backend for LocalOnly {
//!     fn local(&self) -> Box<dyn Executor> {
//!         Box::new(LocalExecutor::new())
//!     }
//!
//!     fn connect(&self, system: &TargetSystem) -> execkit::Result<Box<dyn Executor>> {
//!         Err(execkit::Error::NotConnected(system.hostname.clone()))
//!     }
//! }
//!
//! let system = TargetSystem::new("build-box", "localhost", Flavor::Debian)
//!     .with_sudo(SudoConfig::nopasswd())
//!     .with_update_types(["system_packages", "rust"]);
//! let table = CapabilityTable::for_flavor(system.flavor);
//!
//! let result = Orchestrator::new(LocalOnly).run(&system, &table);
//! println!("{}", serde_json::to_string_pretty(&result).unwrap());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capability;
pub mod observer;
pub mod orchestrator;
pub mod result;
pub mod system;

pub use capability::{CapabilityProvider, CapabilityTable};
pub use observer::{LogObserver, NoObserver, RunObserver};
pub use orchestrator::{Backend, Orchestrator, PlannedCommand, PlannedUpdate};
pub use result::{SystemResult, UpdateStatus, UpdateTypeResult};
pub use system::{Flavor, Locality, RemoteCredential, TargetSystem, is_local_hostname};
