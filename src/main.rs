mod aggregate;
mod audit;
mod classify;
mod cli;
mod commands;
mod extract;
mod lock;
mod masking;
mod model;
mod ocr;
mod report;
mod util;

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{Cli, Commands};
use crate::masking::CpfMasker;
use crate::util::{ensure_directory, local_date_string};

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.command);

    if let Err(err) = run(cli) {
        let masker = CpfMasker::new().ok();
        let safe = |text: String| match &masker {
            Some(masker) => masker.mask_cpf_in_text(&text),
            None => text,
        };
        error!(error = %safe(err.to_string()), "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %safe(cause.to_string()), "caused by");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Process(args) => commands::process::run(args),
        Commands::Inventory(args) => commands::inventory::run(args),
        Commands::Extract(args) => commands::extract::run(args),
        Commands::Status(args) => commands::status::run(args),
    }
}

/// Human-readable lines on stderr, plus a JSONL execution log for commands
/// that keep one.
fn init_tracing(command: &Commands) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (execution_log, log_error) = match command.execution_log_dir() {
        Some(dir) => match open_execution_log(&dir) {
            Ok(file) => (Some(file), None),
            Err(err) => (None, Some(err)),
        },
        None => (None, None),
    };
    let json_layer = execution_log.map(|file| {
        fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(json_layer)
        .init();

    if let Some(err) = log_error {
        let message = format!("{err:#}");
        let message = match CpfMasker::new() {
            Ok(masker) => masker.mask_cpf_in_text(&message),
            Err(_) => message,
        };
        warn!(error = %message, "execution log disabled");
    }
}

/// `execution_log_<YYYY-MM-DD>.jsonl`, appended across runs of the same day.
fn open_execution_log(dir: &Path) -> Result<File> {
    ensure_directory(dir)?;
    let path = dir.join(format!(
        "execution_log_{}.jsonl",
        local_date_string(Local::now())
    ));
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open execution log {}", path.display()))
}
