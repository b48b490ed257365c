use anyhow::{Result, ensure};
use colored::Colorize;
use fleet::{
    CapabilityProvider, CapabilityTable, LogObserver, Orchestrator, PlannedCommand, RunObserver,
    TargetSystem,
};
use std::io::IsTerminal;

use crate::Context;
use crate::backend::SshBackend;
use crate::cli::RunArgs;
use crate::config::Config;
use crate::progress::SpinnerObserver;
use crate::report::RunReport;
use crate::secret::SecretResolver;
use crate::ui;

/// Returns whether every selected system updated cleanly.
pub fn run(ctx: &Context, config: &Config, args: RunArgs) -> Result<bool> {
    let resolver = if args.dry_run {
        SecretResolver::unattended()
    } else {
        SecretResolver::new(args.no_prompt)
    };

    // Secrets are resolved for every system before anything runs, so an
    // aborted prompt leaves all systems untouched.
    let mut targets = Vec::new();
    for (name, system) in config.select(args.system.as_deref())? {
        let secret = resolver.resolve(name, system)?;
        targets.push(system.to_target(name, secret));
    }
    apply_only(&mut targets, &args.only)?;

    let backend = SshBackend::new(
        config.settings.retry_config(),
        config.settings.connect_timeout(),
    );

    if args.dry_run {
        let orchestrator =
            Orchestrator::new(backend).with_command_timeout(config.settings.command_timeout());
        dry_run(&orchestrator, &targets);
        return Ok(true);
    }

    let observer: Box<dyn RunObserver> =
        if args.json || ctx.quiet || ctx.verbose > 0 || !std::io::stderr().is_terminal() {
            Box::new(LogObserver)
        } else {
            Box::new(SpinnerObserver::new())
        };

    let mut orchestrator = Orchestrator::new(backend)
        .with_command_timeout(config.settings.command_timeout())
        .with_observer(observer);

    let mut report = RunReport::start();
    for target in &targets {
        let table = CapabilityTable::for_flavor(target.flavor);
        let result = orchestrator.run(target, &table);
        report.push(&target.name, result);
    }
    report.finish();

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        println!();
        report.print();
    }

    Ok(report.success())
}

/// Narrow every target to the update types in `only`.
fn apply_only(targets: &mut [TargetSystem], only: &[String]) -> Result<()> {
    if only.is_empty() {
        return Ok(());
    }

    for update_type in only {
        ensure!(
            targets
                .iter()
                .any(|t| CapabilityTable::for_flavor(t.flavor).supports(update_type)),
            "Unknown update type '{update_type}'"
        );
    }

    for target in targets.iter_mut() {
        target.retain_update_types(only);
        if target.update_types.is_empty() {
            ui::warn(&format!("{} has none of the requested update types", target.name));
        }
    }
    Ok(())
}

fn dry_run(orchestrator: &Orchestrator<SshBackend>, targets: &[TargetSystem]) {
    ui::header("Dry Run");

    for target in targets {
        ui::section(&format!(
            "{} ({}, {}, {})",
            target.name,
            target.hostname,
            target.locality(),
            target.flavor
        ));

        let table = CapabilityTable::for_flavor(target.flavor);
        let plan = orchestrator.plan(target, &table);
        if plan.is_empty() {
            ui::dim("no update types selected");
        }

        for planned in plan {
            println!("  {}", planned.update_type.bold());
            match planned.commands {
                Ok(commands) => {
                    for command in commands {
                        match command {
                            PlannedCommand::Ready(invocation) => println!(
                                "    {} {} {}",
                                "$".dimmed(),
                                invocation.command,
                                format!("[{}]", invocation.elevation).dimmed()
                            ),
                            PlannedCommand::Blocked { command, reason } => {
                                println!("    {} {} ({})", "✗".red(), command, reason);
                            }
                        }
                    }
                }
                Err(e) => println!("    {} {}", "✗".red(), e),
            }
        }
    }
}
