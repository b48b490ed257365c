//! Terminal progress for a run.

use colored::Colorize;
use execkit::{CommandResult, Invocation};
use fleet::{LogObserver, RunObserver, SystemResult, TargetSystem, UpdateTypeResult};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Shows a spinner for the running update type and forwards every event
/// to [`LogObserver`].
pub struct SpinnerObserver {
    log: LogObserver,
    bar: Option<ProgressBar>,
    system: String,
}

impl SpinnerObserver {
    pub fn new() -> Self {
        Self {
            log: LogObserver,
            bar: None,
            system: String::new(),
        }
    }

    fn finish(&mut self, line: String) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        eprintln!("{line}");
    }
}

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

impl RunObserver for SpinnerObserver {
    fn on_system_start(&mut self, system: &TargetSystem) {
        self.log.on_system_start(system);
        self.system = system.name.clone();
        eprintln!("{} ({})", system.name.cyan().bold(), system.hostname);
    }

    fn on_update_type_start(&mut self, update_type: &str) {
        self.log.on_update_type_start(update_type);
        self.bar = Some(spinner(format!("{} {}", self.system, update_type)));
    }

    fn on_command_start(&mut self, invocation: &Invocation) {
        self.log.on_command_start(invocation);
        if let Some(bar) = &self.bar {
            bar.set_message(invocation.command.clone());
        }
    }

    fn on_command_complete(&mut self, result: &CommandResult) {
        match &self.bar {
            Some(bar) => bar.suspend(|| self.log.on_command_complete(result)),
            None => self.log.on_command_complete(result),
        }
    }

    fn on_update_type_complete(&mut self, update_type: &str, result: &UpdateTypeResult) {
        let line = if result.success() {
            format!("  {} {}", "✓".green(), update_type)
        } else {
            format!("  {} {} ({})", "✗".red(), update_type, result.status())
        };
        self.finish(line);
        self.log.on_update_type_complete(update_type, result);
    }

    fn on_system_complete(&mut self, system: &TargetSystem, result: &SystemResult, duration: Duration) {
        if let Some(error) = result.connection_error_message() {
            self.finish(format!("  {} {}", "✗".red(), error));
        }
        self.log.on_system_complete(system, result, duration);
    }
}
