//! CLI argument definitions using clap
//!
//! Commands:
//! - failoverd check-config --config <path>
//! - failoverd init --config <path>
//! - failoverd status --config <path>
//! - failoverd run --config <path> [--once]
//! - failoverd resolve --config <path> --primary <region>
//! - failoverd resume-cutover --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::observability::LogFormat;

/// failoverd - cross-region failover and traffic-cutover orchestrator
#[derive(Parser, Debug)]
#[command(name = "failoverd")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate the configuration file and exit
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./failoverd.json")]
        config: PathBuf,
    },

    /// Create the failover state record with the configured primary
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./failoverd.json")]
        config: PathBuf,
    },

    /// Print the failover state record
    Status {
        /// Path to configuration file
        #[arg(long, default_value = "./failoverd.json")]
        config: PathBuf,
    },

    /// Run the control loop until interrupted
    Run {
        /// Path to configuration file
        #[arg(long, default_value = "./failoverd.json")]
        config: PathBuf,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Clear a failed failover, naming the region that actually holds write authority
    Resolve {
        /// Path to configuration file
        #[arg(long, default_value = "./failoverd.json")]
        config: PathBuf,

        /// Region that is primary after manual remediation
        #[arg(long)]
        primary: String,
    },

    /// Finish a cutover left incomplete by an earlier run
    ResumeCutover {
        /// Path to configuration file
        #[arg(long, default_value = "./failoverd.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_once_parses() {
        let cli = Cli::try_parse_from(["failoverd", "run", "--config", "/etc/f.json", "--once"])
            .unwrap();
        match cli.command {
            Command::Run { config, once } => {
                assert_eq!(config, PathBuf::from("/etc/f.json"));
                assert!(once);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_resolve_requires_primary() {
        assert!(Cli::try_parse_from(["failoverd", "resolve"]).is_err());

        let cli = Cli::try_parse_from([
            "failoverd",
            "--log-format",
            "json",
            "resolve",
            "--primary",
            "us-east-1",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Command::Resolve { ref primary, .. } if primary == "us-east-1"));
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::try_parse_from(["failoverd", "status"]).unwrap();
        assert!(
            matches!(cli.command, Command::Status { ref config } if config == &PathBuf::from("./failoverd.json"))
        );
    }
}
