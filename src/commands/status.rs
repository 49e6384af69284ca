use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::audit::AuditLedger;
use crate::cli::StatusArgs;

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = args
        .audit_db_path
        .clone()
        .unwrap_or_else(|| args.output_root.join("auditoria.sqlite"));
    let report_dir = args.output_root.join("relatorios");
    let lock_path = args.output_root.join("runner.lock");

    info!(output_root = %args.output_root.display(), "status requested");

    if lock_path.exists() {
        warn!(path = %lock_path.display(), "a run lock is present, a run may be active");
    }

    if db_path.exists() {
        let ledger = AuditLedger::open(&db_path)?;
        let runs = ledger.latest_runs(args.limit)?;
        if runs.is_empty() {
            warn!(path = %db_path.display(), "audit ledger has no runs");
        }
        for row in runs {
            info!(
                run_id = %row.run_id,
                started_at = %row.started_at,
                duration_seconds = row.duration_seconds,
                processed = row.total_processed,
                success = row.total_success,
                error = row.total_error,
                error_rows = row.error_rows,
                final_result = %row.final_result,
                "recorded run"
            );
        }
    } else {
        warn!(path = %db_path.display(), "audit ledger missing");
    }

    match latest_report(&report_dir)? {
        Some(path) => info!(path = %path.display(), "latest run report"),
        None => warn!(path = %report_dir.display(), "no run report found"),
    }

    Ok(())
}

/// Report names embed a sortable timestamp, so the newest sorts last.
fn latest_report(report_dir: &Path) -> Result<Option<PathBuf>> {
    if !report_dir.exists() {
        return Ok(None);
    }

    let mut latest: Option<PathBuf> = None;
    let entries = fs::read_dir(report_dir)
        .with_context(|| format!("failed to read {}", report_dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read entry in {}", report_dir.display()))?
            .path();
        let is_report = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("relatorio_") && name.ends_with(".json"))
            .unwrap_or(false);
        if is_report && latest.as_ref().is_none_or(|current| path > *current) {
            latest = Some(path);
        }
    }

    Ok(latest)
}
