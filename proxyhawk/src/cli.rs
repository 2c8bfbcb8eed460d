//! Command-line surface (spec §6): `check` runs the full validation pipeline
//! over a candidate file, `validate-url` exercises just URL normalization and
//! policy validation (§4.A) on a single URL for scripting/debugging.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Validates candidate forward proxies", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a TOML config file; recognized keys are spec §6's configuration schema.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increases log verbosity; repeat for more (-v, -vv, -vvv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validates every candidate in a file, one proxy URL per line.
    Check {
        /// Candidate file (spec §6 "Candidate input").
        #[arg(long)]
        input: PathBuf,
        /// Destination for results; defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Overrides config.concurrency.
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Validates a single proxy URL's normalization and policy checks.
    ValidateUrl { url: String },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
