//! The seam between orchestration and the places commands actually run.

use crate::error::Result;
use crate::types::{CommandResult, Invocation, Secret};

/// Something that can run finalized commands: the local machine or a remote
/// session.
///
/// Non-zero exits and timeouts are reported through [`CommandResult`]. An
/// `Err` means the command could not be dispatched or its elevation failed.
pub trait Executor {
    /// Short description of where commands run, for logs.
    fn target(&self) -> &str;

    /// Run one command. `secret` is only consulted for the elevation paths
    /// that feed a password.
    fn execute(&mut self, invocation: &Invocation, secret: Option<&Secret>)
    -> Result<CommandResult>;

    /// Release any held resources. Must be safe to call more than once.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn target(&self) -> &str {
        (**self).target()
    }

    fn execute(
        &mut self,
        invocation: &Invocation,
        secret: Option<&Secret>,
    ) -> Result<CommandResult> {
        (**self).execute(invocation, secret)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
