//! Agent test harness.
//!
//! Runs scripted multi-turn test suites against the `claude` CLI (a task
//! attempt plus a reflection turn on the same session, per test), persists
//! one record per test immediately, and reduces the records into aggregate
//! statistics and ranked improvement suggestions.

mod cli;
mod depth;
mod exit_codes;
mod invoke;
mod logging;
mod process;
mod reflection;
mod report;
mod results;
mod runner;
mod stats;
mod suggestions;
mod suite;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "harness",
    version,
    about = "Multi-turn test harness for Claude Code agents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every test in a suite, then aggregate the results.
    Run {
        /// Path to the suite TOML file.
        suite: PathBuf,
        /// Per-test timeout in seconds.
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
        /// Wait indefinitely instead of enforcing a per-test timeout.
        #[arg(long)]
        no_timeout: bool,
    },
    /// Re-run the aggregation pass over an existing results directory.
    Aggregate {
        /// Path to a run-scoped results directory.
        results_dir: PathBuf,
    },
    /// Validate a suite file without running any tests.
    Validate {
        /// Path to the suite TOML file.
        suite: PathBuf,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Command::Run {
            suite,
            timeout_secs,
            no_timeout,
        } => {
            let timeout = if no_timeout {
                None
            } else {
                Some(Duration::from_secs(timeout_secs))
            };
            cli::run_suite(&suite, timeout)
        }
        Command::Aggregate { results_dir } => cli::aggregate_dir(&results_dir),
        Command::Validate { suite } => cli::validate_suite(&suite),
    }
}
