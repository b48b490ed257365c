mod backend;
mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod report;
mod secret;
mod ui;

use anyhow::{Context as _, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Config;
use std::fs::OpenOptions;
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "updall", &mut io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let path = paths::config_file(cli.config.as_deref())?;
    let config = Config::load(&path)?;
    init_logging(&cli, config.settings.log_level()?)?;
    log::debug!("Loaded config from {}", path.display());
    config.validate()?;

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let ok = match cli.command {
        Command::Run(args) => commands::run::run(&ctx, &config, args)?,
        Command::Check(args) => commands::check::run(&config, args)?,
        Command::List => {
            commands::list::run(&config)?;
            true
        }
        Command::Completions { .. } => true,
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Level from -v, falling back to the configured level, then warn.
fn init_logging(cli: &Cli, configured: Option<log::LevelFilter>) -> Result<()> {
    let log_level = match cli.verbose {
        0 => configured.unwrap_or(log::LevelFilter::Warn),
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None);

    if let Some(log_file) = &cli.log_file {
        let log_file = paths::expand(&log_file.to_string_lossy());
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("Could not open log file {}", log_file.display()))?;
        builder
            .target(env_logger::Target::Pipe(Box::new(file)))
            .format_timestamp_secs();
    }

    builder.init();
    Ok(())
}
