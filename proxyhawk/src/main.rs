//! ProxyHawk CLI: loads configuration, reads candidates, drives the core
//! Worker Pool, and renders results through a `ResultSink`.

mod cli;
mod input;
mod sink;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, OutputFormat};
use proxyhawk_core::{ProxyHawkConfig, Summary, WorkerPool};
use sink::{JsonSink, ResultSink, TextSink};
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;

/// Exit codes per the CLI's own contract: 0 success, 1 candidate-file I/O
/// error, 2 configuration error (process never starts the Worker Pool).
const EXIT_OK: u8 = 0;
const EXIT_IO_ERROR: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

fn load_config(path: Option<&std::path::Path>) -> Result<ProxyHawkConfig> {
    match path {
        Some(p) => {
            let raw = std::fs::read_to_string(p)
                .with_context(|| format!("reading config file {}", p.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing config file {}", p.display()))
        },
        None => Ok(ProxyHawkConfig::default()),
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder().with_max_level(level).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn make_sink(format: OutputFormat, output: Option<&std::path::Path>) -> Result<Box<dyn ResultSink>> {
    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?),
        None => Box::new(io::stdout()),
    };
    Ok(match format {
        OutputFormat::Text => Box::new(TextSink::new(writer)),
        OutputFormat::Json => Box::new(JsonSink::new(writer)),
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = match load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        },
    };

    match run(cli.command, cfg).await {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_IO_ERROR)
        },
    }
}

async fn run(command: Command, mut cfg: ProxyHawkConfig) -> Result<()> {
    match command {
        Command::Check { input, output, format, concurrency } => {
            if let Some(n) = concurrency {
                cfg.concurrency = n;
            }
            let candidates = input::load_candidates(&input)?;
            let pool = WorkerPool::new(Arc::new(cfg));
            let results = pool.run(candidates).await;

            let mut sink = make_sink(format, output.as_deref())?;
            for result in &results {
                sink.write_result(result)?;
            }
            sink.write_summary(&Summary::from_results(&results))?;
        },
        Command::ValidateUrl { url } => {
            let policy = proxyhawk_core::normalize::ValidationPolicySpec { allow_private: cfg.allow_private };
            let target = proxyhawk_core::normalize::normalize(&url)
                .and_then(|target| proxyhawk_core::normalize::validate(&target, &policy).map(|()| target));

            match target {
                Ok(target) => println!("OK {target}"),
                Err(e) => anyhow::bail!("{e}"),
            }
        },
    }
    Ok(())
}
