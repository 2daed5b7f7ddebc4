//! Command line argument parsing for the monitor daemon

use crate::config::DEFAULT_CONFIG_PATH;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ROCK Pi SATA HAT monitor
///
/// Drives the top-board fan from the CPU temperature, rotates status pages
/// on the OLED and maps button gestures onto actions.
#[derive(Parser, Debug)]
#[command(name = "penta-monitor")]
#[command(about = "SATA HAT fan, display and button daemon")]
#[command(version)]
pub struct Args {
    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Also append log records to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the daemon (default)
    Run,
    /// Configuration file management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Print the fan duty the current thresholds give for a temperature
    Duty {
        /// Temperature in Celsius
        #[arg(allow_negative_numbers = true)]
        temp: f32,
    },
    /// Render every status page once to stdout
    Pages,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_runs_the_daemon() {
        let args = Args::try_parse_from(["penta-monitor"]).unwrap();
        assert_eq!(args.command, None);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(args.verbose, 0);
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let args =
            Args::try_parse_from(["penta-monitor", "config", "init", "--force", "-vv", "-c", "x.json"])
                .unwrap();
        assert_eq!(
            args.command,
            Some(Commands::Config {
                command: ConfigCommands::Init { force: true }
            })
        );
        assert_eq!(args.verbose, 2);
        assert_eq!(args.config, PathBuf::from("x.json"));
    }

    #[test]
    fn duty_accepts_negative_temperatures() {
        let args = Args::try_parse_from(["penta-monitor", "duty", "-5"]).unwrap();
        assert_eq!(args.command, Some(Commands::Duty { temp: -5.0 }));
    }
}
