//! rump - copy every key from one Redis-compatible store to another
//!
//! Walks the source with SCAN, moves values with DUMP/RESTORE and prints
//! `>` per scanned batch and `.` per restored batch while it runs.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use rump::{
    migrate, ConsoleProgress, MissingKeyPolicy, NoProgress, Progress, TransferConfig,
    TransferReport,
};

/// rump - one-shot key migration between Redis-compatible stores
#[derive(Parser, Debug)]
#[command(name = "rump")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Source store URL (e.g., redis://127.0.0.1:6379/0)
    #[arg(long, value_name = "URL", env = "RUMP_FROM")]
    from: String,

    /// Destination store URL (e.g., redis://127.0.0.1:6379/1)
    #[arg(long, value_name = "URL", env = "RUMP_TO")]
    to: String,

    /// Log level: trace, debug, info, warn, error
    #[arg(
        short = 'l',
        long = "log-level",
        value_name = "LEVEL",
        env = "RUMP_LOG_LEVEL",
        default_value = "warn"
    )]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    /// Skip keys that disappear between SCAN and DUMP instead of failing
    #[arg(long)]
    skip_missing: bool,

    /// SCAN COUNT hint (store default when unset)
    #[arg(long, value_name = "N")]
    scan_count: Option<u64>,

    /// Do not print progress markers
    #[arg(short, long)]
    quiet: bool,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    /// Human-readable, multi-line
    Pretty,
    /// One JSON object per event
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    match run(&cli).await {
        Ok(report) => {
            if !cli.quiet {
                eprintln!();
            }
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("{} {}", "error:".red().bold(), e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                println!("{}", "Sync done.".green().bold());
                if !cli.quiet {
                    eprintln!("{report}");
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            if !cli.quiet {
                eprintln!();
            }
            eprintln!("{} {:#}", "error:".red().bold(), e);
            exit_code(&e)
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<TransferReport> {
    let config = TransferConfig {
        scan_count: cli.scan_count,
        missing_keys: if cli.skip_missing {
            MissingKeyPolicy::Skip
        } else {
            MissingKeyPolicy::Fail
        },
        ..Default::default()
    };

    let progress: Arc<dyn Progress> = if cli.quiet {
        Arc::new(NoProgress)
    } else {
        Arc::new(ConsoleProgress::stderr())
    };

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if interrupted_twice(tokio::signal::ctrl_c, token).await {
            eprintln!("{} interrupted twice, exiting", "error:".red().bold());
            std::process::exit(130);
        }
    });

    let report = migrate(&cli.from, &cli.to, &config, progress, cancel)
        .await
        .context("transfer failed")?;
    Ok(report)
}

/// The first interrupt cancels the run and lets queued batches drain. Returns
/// `true` on the second one; `false` if signals cannot be received.
async fn interrupted_twice<F, Fut>(mut interrupt: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    warn!("interrupted, finishing queued batches (press Ctrl-C again to abort)");
    cancel.cancel();
    interrupt().await.is_ok()
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<rump::Error>() {
        Some(e) => ExitCode::from(e.exit_code()),
        None => ExitCode::FAILURE,
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let layer = fmt::layer().with_writer(std::io::stderr);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.pretty())
                .init();
        }
    }
}
