//! Lifecycle events of a run.

use crate::result::{SystemResult, UpdateTypeResult};
use crate::system::TargetSystem;
use execkit::{CommandResult, Invocation};
use std::time::Duration;

/// Receives lifecycle events from the orchestrator.
///
/// Implement this trait to report progress; the orchestrator itself never
/// prints anything.
pub trait RunObserver {
    /// Called before a system is contacted
    fn on_system_start(&mut self, system: &TargetSystem);

    /// Called when an update type starts
    fn on_update_type_start(&mut self, update_type: &str);

    /// Called before a command is dispatched
    fn on_command_start(&mut self, invocation: &Invocation);

    /// Called with every command result, including dispatch failures
    fn on_command_complete(&mut self, result: &CommandResult);

    /// Called when an update type finishes
    fn on_update_type_complete(&mut self, update_type: &str, result: &UpdateTypeResult);

    /// Called when a system is done, reached or not
    fn on_system_complete(&mut self, system: &TargetSystem, result: &SystemResult, duration: Duration);
}

/// No-op observer
pub struct NoObserver;

impl RunObserver for NoObserver {
    fn on_system_start(&mut self, _system: &TargetSystem) {}
    fn on_update_type_start(&mut self, _update_type: &str) {}
    fn on_command_start(&mut self, _invocation: &Invocation) {}
    fn on_command_complete(&mut self, _result: &CommandResult) {}
    fn on_update_type_complete(&mut self, _update_type: &str, _result: &UpdateTypeResult) {}
    fn on_system_complete(&mut self, _system: &TargetSystem, _result: &SystemResult, _duration: Duration) {}
}

/// Forwards events to the `log` facade
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn on_system_start(&mut self, system: &TargetSystem) {
        log::info!(
            "Starting updates for system: {} ({}, {})",
            system.name,
            system.hostname,
            system.locality()
        );
    }

    fn on_update_type_start(&mut self, update_type: &str) {
        log::info!("Starting {} updates", update_type);
    }

    fn on_command_start(&mut self, invocation: &Invocation) {
        log::debug!("Executing command: {}", invocation.command);
    }

    fn on_command_complete(&mut self, result: &CommandResult) {
        let secs = result.duration().as_secs_f64();
        if result.success() {
            log::debug!("Command completed successfully: {} ({:.2}s)", result.command(), secs);
        } else {
            log::error!(
                "Command failed with exit code {}: {} ({:.2}s)",
                result.exit_code(),
                result.command(),
                secs
            );
        }
    }

    fn on_update_type_complete(&mut self, update_type: &str, result: &UpdateTypeResult) {
        if result.success() {
            log::info!("Successfully completed {} updates", update_type);
        } else {
            log::error!("Failed to complete {} updates ({})", update_type, result.status());
        }
    }

    fn on_system_complete(&mut self, system: &TargetSystem, result: &SystemResult, duration: Duration) {
        match result.connection_error_message() {
            Some(error) => log::error!("Could not update system {}: {}", system.name, error),
            None => log::info!(
                "Completed updates for system: {} in {:.2}s",
                system.name,
                duration.as_secs_f64()
            ),
        }
    }
}
