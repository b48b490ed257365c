use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "updall")]
#[command(author = "updall contributors")]
#[command(version)]
#[command(about = "Run package and toolchain updates across your machines", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (defaults to the first one found in the usual places)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write log records to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run updates on the configured systems
    Run(RunArgs),

    /// Check reachability, sudo readiness and installed tools
    Check(CheckArgs),

    /// List configured systems
    List,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Only update this system
    #[arg(short, long)]
    pub system: Option<String>,

    /// Only run these update types (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Show the commands that would run without executing them
    #[arg(long, conflicts_with = "json")]
    pub dry_run: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Never prompt for a sudo password
    #[arg(long)]
    pub no_prompt: bool,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Only check this system
    #[arg(short, long)]
    pub system: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_only_splits_on_commas() {
        let cli = Cli::parse_from(["updall", "run", "--only", "system_packages,rust", "-s", "laptop"]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.only, ["system_packages", "rust"]);
                assert_eq!(args.system.as_deref(), Some("laptop"));
                assert!(!args.dry_run);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["updall", "list", "-vv", "--config", "/tmp/u.toml"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/u.toml")));
    }
}
