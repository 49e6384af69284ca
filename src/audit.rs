//! SQLite audit ledger: one row per run, one row per recorded error.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::aggregate::RunStats;
use crate::masking::CpfMasker;
use crate::util::ensure_directory;

pub const ROBOT_NAME: &str = "ASO";
pub const RESULT_COMPLETE: &str = "100% Concluído";
pub const RESULT_WITH_EXCEPTIONS: &str = "Concluído com Exceções";
pub const RESULT_INCOMPLETE: &str = "Incompleto";

#[derive(Debug, Clone, Serialize)]
pub struct RunAuditRecord {
    pub run_id: String,
    pub robot_name: String,
    pub robot_version: String,
    pub started_at: String,
    pub finished_at: String,
    pub duration_seconds: i64,
    pub total_processed: i64,
    pub total_success: i64,
    pub total_error: i64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub final_result: String,
    pub run_status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditError {
    pub timestamp: String,
    pub stage: String,
    pub error_type: String,
    pub message: String,
    pub record_id: String,
}

/// Row shape returned by [`AuditLedger::latest_runs`].
#[derive(Debug, Clone, Serialize)]
pub struct RunSummaryRow {
    pub run_id: String,
    pub started_at: String,
    pub duration_seconds: i64,
    pub total_processed: i64,
    pub total_success: i64,
    pub total_error: i64,
    pub final_result: String,
    pub error_rows: i64,
}

/// Pages that ended without an error count as handled, skips included.
pub fn final_result(processed: i64, success: i64, error: i64) -> &'static str {
    if processed == 0 {
        return RESULT_INCOMPLETE;
    }
    if success == processed && error == 0 {
        return RESULT_COMPLETE;
    }
    if success + error != processed {
        return RESULT_INCOMPLETE;
    }
    RESULT_WITH_EXCEPTIONS
}

pub fn audit_record_from_stats(
    stats: &RunStats,
    masker: &CpfMasker,
) -> (RunAuditRecord, Vec<AuditError>) {
    let processed = stats.total_processed as i64;
    let error = stats.error as i64;
    let success = processed.saturating_sub(error).max(0);
    let rate = |count: i64| {
        if processed == 0 {
            0.0
        } else {
            count as f64 / processed as f64
        }
    };
    let finished_at = stats.finished_at.clone().unwrap_or_default();

    let record = RunAuditRecord {
        run_id: stats.execution_id.clone(),
        robot_name: ROBOT_NAME.to_string(),
        robot_version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: stats.started_at.clone(),
        finished_at: finished_at.clone(),
        duration_seconds: stats.duration_seconds,
        total_processed: processed,
        total_success: success,
        total_error: error,
        success_rate: rate(success),
        error_rate: rate(error),
        final_result: final_result(processed, success, error).to_string(),
        run_status: stats.run_status.as_str().to_string(),
    };

    let mut errors: Vec<AuditError> = stats
        .erros
        .iter()
        .map(|entry| AuditError {
            timestamp: finished_at.clone(),
            stage: "processamento".to_string(),
            error_type: "Tecnico".to_string(),
            message: masker.mask_cpf_in_text(&entry.erro),
            record_id: masker.mask_cpf_in_text(&entry.arquivo),
        })
        .collect();
    errors.extend(stats.ocr_failures.iter().map(|entry| AuditError {
        timestamp: finished_at.clone(),
        stage: "ocr".to_string(),
        error_type: "Dados Invalidos".to_string(),
        message: format!(
            "OCR failure: nome={}, cpf={}",
            entry.nome,
            masker.mask_cpf(&entry.cpf)
        ),
        record_id: masker.mask_cpf_in_text(&entry.arquivo),
    }));

    (record, errors)
}

pub struct AuditLedger {
    connection: Connection,
}

impl AuditLedger {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            ensure_directory(parent)?;
        }
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open audit ledger {}", path.display()))?;
        configure_connection(&connection)?;
        Self::from_connection(connection)
    }

    pub fn from_connection(connection: Connection) -> Result<Self> {
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    /// Writes the run row and replaces its error rows. Re-recording the same
    /// run id updates in place.
    pub fn record_run(&mut self, run: &RunAuditRecord, errors: &[AuditError]) -> Result<()> {
        let tx = self.connection.transaction()?;

        tx.execute(
            "
            INSERT INTO runs(
              run_id, robot_name, robot_version, started_at, finished_at,
              duration_seconds, total_processed, total_success, total_error,
              success_rate, error_rate, final_result, run_status
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(run_id) DO UPDATE SET
              robot_name=excluded.robot_name,
              robot_version=excluded.robot_version,
              started_at=excluded.started_at,
              finished_at=excluded.finished_at,
              duration_seconds=excluded.duration_seconds,
              total_processed=excluded.total_processed,
              total_success=excluded.total_success,
              total_error=excluded.total_error,
              success_rate=excluded.success_rate,
              error_rate=excluded.error_rate,
              final_result=excluded.final_result,
              run_status=excluded.run_status
            ",
            params![
                &run.run_id,
                &run.robot_name,
                &run.robot_version,
                &run.started_at,
                &run.finished_at,
                run.duration_seconds,
                run.total_processed,
                run.total_success,
                run.total_error,
                run.success_rate,
                run.error_rate,
                &run.final_result,
                &run.run_status
            ],
        )
        .with_context(|| format!("failed to record run {}", run.run_id))?;

        tx.execute("DELETE FROM run_errors WHERE run_id = ?1", params![&run.run_id])?;

        {
            let mut statement = tx.prepare(
                "
                INSERT INTO run_errors(run_id, timestamp, stage, error_type, message, record_id)
                VALUES(?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )?;
            for error in errors {
                statement.execute(params![
                    &run.run_id,
                    &error.timestamp,
                    &error.stage,
                    &error.error_type,
                    &error.message,
                    &error.record_id
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn latest_runs(&self, limit: usize) -> Result<Vec<RunSummaryRow>> {
        let mut statement = self.connection.prepare(
            "
            SELECT
              r.run_id,
              r.started_at,
              r.duration_seconds,
              r.total_processed,
              r.total_success,
              r.total_error,
              r.final_result,
              (SELECT COUNT(*) FROM run_errors e WHERE e.run_id = r.run_id)
            FROM runs r
            ORDER BY r.started_at DESC, r.run_id DESC
            LIMIT ?1
            ",
        )?;

        let mut rows = statement.query(params![limit as i64])?;
        let mut runs = Vec::new();

        while let Some(row) = rows.next()? {
            runs.push(RunSummaryRow {
                run_id: row.get(0)?,
                started_at: row.get(1)?,
                duration_seconds: row.get(2)?,
                total_processed: row.get(3)?,
                total_success: row.get(4)?,
                total_error: row.get(5)?,
                final_result: row.get(6)?,
                error_rows: row.get(7)?,
            });
        }

        Ok(runs)
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS runs (
              run_id TEXT PRIMARY KEY,
              robot_name TEXT NOT NULL,
              robot_version TEXT NOT NULL,
              started_at TEXT NOT NULL,
              finished_at TEXT,
              duration_seconds INTEGER NOT NULL DEFAULT 0,
              total_processed INTEGER NOT NULL DEFAULT 0,
              total_success INTEGER NOT NULL DEFAULT 0,
              total_error INTEGER NOT NULL DEFAULT 0,
              success_rate REAL NOT NULL DEFAULT 0,
              error_rate REAL NOT NULL DEFAULT 0,
              final_result TEXT NOT NULL,
              run_status TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS run_errors (
              error_id INTEGER PRIMARY KEY AUTOINCREMENT,
              run_id TEXT NOT NULL,
              timestamp TEXT,
              stage TEXT NOT NULL,
              error_type TEXT NOT NULL,
              message TEXT NOT NULL,
              record_id TEXT,
              FOREIGN KEY(run_id) REFERENCES runs(run_id)
            );

            CREATE INDEX IF NOT EXISTS idx_run_errors_run_id ON run_errors(run_id);
            ",
        )
        .context("failed to create audit ledger schema")?;
    Ok(())
}
