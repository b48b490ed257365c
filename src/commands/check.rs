use anyhow::Result;
use colored::Colorize;
use execkit::{Elevation, Executor, Invocation, SudoMethod, classify_command_failure};
use fleet::capability::{self, SDKMAN_INIT, sdkman_command};
use fleet::{Backend, CapabilityProvider, CapabilityTable, Flavor, TargetSystem};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::backend::SshBackend;
use crate::cli::CheckArgs;
use crate::config::{Config, SystemConfig};
use crate::paths;
use crate::report::format_duration;
use crate::secret::SecretResolver;
use crate::ui;

/// Limit for the short commands run during a check
const CHECK_TIMEOUT: Duration = Duration::from_secs(15);

/// What has to be present on a host before an update type can run.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    /// Programs looked up on PATH
    Programs(BTreeSet<String>),
    /// A file, with `$HOME` left for the host to expand
    File(&'static str),
}

/// Returns whether every selected system passed.
pub fn run(config: &Config, args: CheckArgs) -> Result<bool> {
    let backend = SshBackend::new(
        config.settings.retry_config(),
        config.settings.connect_timeout(),
    );
    let resolver = SecretResolver::unattended();

    ui::header("Configuration Check");

    let mut failed = 0;
    let mut total_estimate = Duration::ZERO;
    let selected = config.select(args.system.as_deref())?;
    for (name, system) in &selected {
        let secret = resolver.resolve(name, system)?;
        let target = system.to_target(name, secret);
        let (ready, estimate) = check_system(&backend, system, &target);
        if !ready {
            failed += 1;
        }
        total_estimate += estimate;
    }

    println!();
    if failed == 0 {
        ui::success(&format!("All {} system(s) ready", selected.len()));
    } else {
        ui::error(&format!("{failed}/{} system(s) have problems", selected.len()));
    }
    if !total_estimate.is_zero() {
        ui::kv("estimated duration", &format_duration(total_estimate));
    }
    Ok(failed == 0)
}

/// Whether the system is ready, and how long its available updates should take.
fn check_system(
    backend: &SshBackend,
    system: &SystemConfig,
    target: &TargetSystem,
) -> (bool, Duration) {
    ui::section(&format!(
        "{} ({}, {}, {})",
        target.name,
        target.hostname,
        target.locality(),
        target.flavor
    ));

    let mut executor = if target.is_local() {
        println!("  {} reachable: local", "✓".green());
        backend.local()
    } else {
        match backend.connect(target) {
            Ok(executor) => {
                println!("  {} reachable: ssh", "✓".green());
                executor
            }
            Err(e) => {
                let category = e.category();
                println!("  {} reachable: {}", "✗".red(), category.description());
                ui::dim(&e.to_string());
                ui::dim(category.advice());
                return (false, Duration::ZERO);
            }
        }
    };

    let mut ok = check_sudo(executor.as_mut(), system, target);

    let table = CapabilityTable::for_flavor(target.flavor);
    let mut estimate = Duration::ZERO;
    for update_type in &target.update_types {
        match check_tools(executor.as_mut(), target, &table, update_type) {
            Some(expected) => estimate += expected,
            None => ok = false,
        }
    }
    if !estimate.is_zero() {
        println!("  {} estimated duration: {}", "⏱".dimmed(), format_duration(estimate));
    }

    if let Err(e) = executor.close() {
        log::warn!("Cleanup for {} failed: {}", target.name, e);
    }
    (ok, estimate)
}

fn check_sudo(executor: &mut dyn Executor, system: &SystemConfig, target: &TargetSystem) -> bool {
    match target.sudo.method {
        SudoMethod::None => {
            println!("  {} sudo: not needed", "✓".green());
            true
        }
        SudoMethod::Nopasswd => {
            let check = Invocation::new("sudo -n true", Elevation::Direct, CHECK_TIMEOUT);
            match executor.execute(&check, None) {
                Ok(result) if result.success() => {
                    println!("  {} sudo: passwordless", "✓".green());
                    true
                }
                Ok(result) => {
                    println!("  {} sudo: passwordless sudo refused", "✗".red());
                    ui::dim(&classify_command_failure("sudo", result.stderr()).hint);
                    false
                }
                Err(e) => {
                    println!("  {} sudo: {}", "✗".red(), e);
                    false
                }
            }
        }
        SudoMethod::Password if target.sudo.secret.is_some() => {
            println!("  {} sudo: password from {}", "✓".green(), system.sudo_password_env);
            true
        }
        SudoMethod::Password if target.sudo.allow_unattended_fallback => {
            println!(
                "  {} sudo: {} not set, falling back to sudo -n",
                "⚠".yellow(),
                system.sudo_password_env
            );
            true
        }
        SudoMethod::Password => {
            println!(
                "  {} sudo: password required but {} is not set",
                "✗".red(),
                system.sudo_password_env
            );
            false
        }
    }
}

/// Returns the expected duration when the update type can run.
fn check_tools(
    executor: &mut dyn Executor,
    target: &TargetSystem,
    table: &CapabilityTable,
    update_type: &str,
) -> Option<Duration> {
    let requirement = match requirement_for(table, update_type) {
        Ok(requirement) => requirement,
        Err(e) => {
            println!("  {} {}: {}", "✗".red(), update_type, e);
            return None;
        }
    };

    let (label, missing) = match &requirement {
        Requirement::Programs(programs) => {
            let missing: Vec<&str> = programs
                .iter()
                .map(String::as_str)
                .filter(|program| !is_installed(executor, target, program))
                .collect();
            let label = programs.iter().cloned().collect::<Vec<_>>().join(", ");
            (label, missing)
        }
        Requirement::File(path) => {
            let missing = if file_exists(executor, target, path) {
                Vec::new()
            } else {
                vec![*path]
            };
            (path.to_string(), missing)
        }
    };

    if missing.is_empty() {
        println!("  {} {} {}", "✓".green(), update_type, format!("({label})").dimmed());
        if let Some(version) = version_command(table.flavor(), update_type)
            .and_then(|command| first_line(executor, target, &command))
        {
            ui::dim(&format!("  {version}"));
        }
        return Some(estimate(table.flavor(), update_type));
    }

    println!("  {} {}: missing {}", "✗".red(), update_type, missing.join(", "));
    if let Some(warning) = package_manager_warning(table.flavor(), &missing, |program| {
        is_installed(executor, target, program)
    }) {
        println!("  {} {}", "⚠".yellow(), warning);
    }
    for program in missing {
        ui::dim(&classify_command_failure(program, "command not found").hint);
    }
    None
}

fn requirement_for(table: &CapabilityTable, update_type: &str) -> execkit::Result<Requirement> {
    // `sdk` is a shell function; only its init script can be found
    if update_type == capability::SDKMAN {
        table.lookup(update_type)?;
        return Ok(Requirement::File(SDKMAN_INIT));
    }
    programs_for(table, update_type).map(Requirement::Programs)
}

/// Distinct programs an update type invokes, in name order.
fn programs_for(table: &CapabilityTable, update_type: &str) -> execkit::Result<BTreeSet<String>> {
    Ok(table
        .lookup(update_type)?
        .iter()
        .map(|spec| spec.program().to_string())
        .filter(|program| !program.is_empty())
        .collect())
}

/// Command whose first output line names the installed tool version.
fn version_command(flavor: Flavor, update_type: &str) -> Option<String> {
    let command = match update_type {
        capability::SYSTEM_PACKAGES => match flavor {
            Flavor::Arch => "paru --version".to_string(),
            Flavor::Debian => "apt --version".to_string(),
        },
        capability::RUST => "rustc --version".to_string(),
        capability::NODE => "node --version".to_string(),
        capability::SDKMAN => sdkman_command("version"),
        capability::GCLOUD => "gcloud --version".to_string(),
        _ => return None,
    };
    Some(command)
}

/// Typical wall time of one update type.
fn estimate(flavor: Flavor, update_type: &str) -> Duration {
    let secs = match update_type {
        capability::SYSTEM_PACKAGES => match flavor {
            Flavor::Arch => 120,
            Flavor::Debian => 180,
        },
        capability::RUST => 30,
        capability::NODE => 60,
        capability::SDKMAN => 45,
        capability::GCLOUD => 90,
        _ => 0,
    };
    Duration::from_secs(secs)
}

/// An Arch host with pacman but no paru cannot run the paru upgrade.
fn package_manager_warning(
    flavor: Flavor,
    missing: &[&str],
    mut installed: impl FnMut(&str) -> bool,
) -> Option<&'static str> {
    (flavor == Flavor::Arch && missing.contains(&"paru") && installed("pacman"))
        .then_some("Using pacman instead of paru is not supported; install paru to update packages")
}

fn is_installed(executor: &mut dyn Executor, target: &TargetSystem, program: &str) -> bool {
    if target.is_local() {
        return which::which(program).is_ok();
    }
    succeeds(executor, target, &format!("command -v {program}"))
}

fn file_exists(executor: &mut dyn Executor, target: &TargetSystem, path: &str) -> bool {
    if target.is_local() {
        return paths::expand(path).is_file();
    }
    succeeds(executor, target, &format!("test -f \"{path}\""))
}

fn succeeds(executor: &mut dyn Executor, target: &TargetSystem, command: &str) -> bool {
    let invocation = Invocation::new(command, Elevation::Direct, CHECK_TIMEOUT);
    match executor.execute(&invocation, None) {
        Ok(result) => result.success(),
        Err(e) => {
            log::debug!("`{}` on {} failed: {}", command, target.name, e);
            false
        }
    }
}

fn first_line(executor: &mut dyn Executor, target: &TargetSystem, command: &str) -> Option<String> {
    let invocation = Invocation::new(command, Elevation::Direct, CHECK_TIMEOUT);
    match executor.execute(&invocation, None) {
        Ok(result) if result.success() => result
            .stdout()
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string),
        Ok(_) => None,
        Err(e) => {
            log::debug!("Version lookup on {} failed: {}", target.name, e);
            None
        }
    }
}
