//! Privilege escalation strategy.
//!
//! Decides the final command text and the [`Elevation`] path for a
//! [`CommandSpec`] given a system's [`SudoConfig`]. This is a pure function:
//! nothing runs here, and the secret itself never ends up in the command text.

use crate::error::{Error, Result};
use crate::types::{CommandSpec, Elevation, Invocation, SudoConfig, SudoMethod};
use std::time::Duration;

/// Prefix for unattended escalation: fails instead of prompting.
pub const UNATTENDED_PREFIX: &str = "sudo -n";

/// Prefix for escalation reading the password from the input channel.
pub const STDIN_PREFIX: &str = "sudo -S -p ''";

/// Finalize a command for execution.
///
/// - Commands that need no privilege, or elevate by themselves, keep their
///   text. Self-elevating tools are watched for a prompt when a secret is
///   available.
/// - `nopasswd` prefixes [`UNATTENDED_PREFIX`].
/// - `password` with a secret prefixes [`STDIN_PREFIX`] and feeds the secret
///   through the command's input.
/// - `password` without a secret is [`Error::CredentialRequired`], unless the
///   system opted into the unattended fallback.
pub fn prepare(spec: &CommandSpec, sudo: &SudoConfig, timeout: Duration) -> Result<Invocation> {
    if !spec.needs_privilege {
        return Ok(Invocation::new(&spec.command, Elevation::Direct, timeout));
    }

    if spec.handles_privilege_internally {
        let elevation = match (sudo.method, &sudo.secret) {
            (SudoMethod::Password, Some(_)) => Elevation::Interactive,
            (SudoMethod::Password, None) if !sudo.allow_unattended_fallback => {
                return Err(missing_secret(spec));
            }
            _ => Elevation::Direct,
        };
        return Ok(Invocation::new(&spec.command, elevation, timeout));
    }

    let (command, elevation) = match (sudo.method, &sudo.secret) {
        (SudoMethod::None, _) => (spec.command.clone(), Elevation::Direct),
        (SudoMethod::Nopasswd, _) => (unattended(&spec.command), Elevation::Direct),
        (SudoMethod::Password, Some(_)) => (
            format!("{STDIN_PREFIX} {}", spec.command),
            Elevation::PipedSecret,
        ),
        (SudoMethod::Password, None) if sudo.allow_unattended_fallback => {
            log::warn!(
                "No sudo password for `{}`, relying on a passwordless sudo policy",
                spec.command
            );
            (unattended(&spec.command), Elevation::Direct)
        }
        (SudoMethod::Password, None) => return Err(missing_secret(spec)),
    };

    Ok(Invocation::new(command, elevation, timeout))
}

fn unattended(command: &str) -> String {
    format!("{UNATTENDED_PREFIX} {command}")
}

fn missing_secret(spec: &CommandSpec) -> Error {
    Error::CredentialRequired {
        context: format!("`{}` needs sudo", spec.command),
    }
}
