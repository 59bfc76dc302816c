//! CLI module for failoverd
//!
//! Provides command-line interface for:
//! - check-config: Validate the configuration file
//! - init: Create the failover state record
//! - status: Print the failover state record
//! - run: Control loop, or a single cycle
//! - resolve: Operator remediation of a failed failover
//! - resume-cutover: Finish a degraded cutover

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{
    check_config, init, resolve, resume_cutover, run, run_command, run_loop, status,
};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::write_response;
