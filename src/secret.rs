//! Sudo password resolution.
//!
//! The password comes from the env var the system names, or from a single
//! prompt when running attended. Nothing here ever logs the value.

use crate::config::SystemConfig;
use anyhow::{Context, Result};
use execkit::{Secret, SudoMethod};
use std::io::IsTerminal;

pub struct SecretResolver {
    prompt: bool,
}

impl SecretResolver {
    /// Prompt only when stdin is a terminal and prompting was not disabled.
    pub fn new(no_prompt: bool) -> Self {
        Self {
            prompt: !no_prompt && std::io::stdin().is_terminal(),
        }
    }

    /// Never prompt.
    pub fn unattended() -> Self {
        Self { prompt: false }
    }

    /// Secret for `system`, or `None` if it needs none or none is available.
    ///
    /// A prompt that fails or is interrupted is an error.
    pub fn resolve(&self, name: &str, system: &SystemConfig) -> Result<Option<Secret>> {
        if system.sudo_method != SudoMethod::Password {
            return Ok(None);
        }

        if let Some(secret) = from_env(&system.sudo_password_env) {
            log::debug!("Using sudo password for {} from {}", name, system.sudo_password_env);
            return Ok(Some(secret));
        }

        if !self.prompt {
            log::info!(
                "No sudo password for {} ({} is not set)",
                name,
                system.sudo_password_env
            );
            return Ok(None);
        }

        let password = dialoguer::Password::new()
            .with_prompt(format!("sudo password for {} ({})", name, system.hostname))
            .interact()
            .with_context(|| format!("Password prompt for {name} was aborted"))?;

        Ok(Some(Secret::new(password)))
    }
}

fn from_env(var: &str) -> Option<Secret> {
    std::env::var(var)
        .ok()
        .filter(|value| !value.is_empty())
        .map(Secret::new)
}
