use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::{Local, Utc};
use tracing::{info, warn};

use super::pipeline::{Attachment, PagePipeline};
use super::store::PdfPageStore;
use crate::aggregate::{RunAggregator, RunStats};
use crate::audit::{AuditLedger, audit_record_from_stats};
use crate::classify::Classifier;
use crate::cli::ProcessArgs;
use crate::commands::inventory::{WorkSiteParser, discover_pdfs, file_name_of};
use crate::extract::FieldExtractor;
use crate::lock::RunLock;
use crate::masking::CpfMasker;
use crate::model::RunStatus;
use crate::ocr::{ConfidenceScorer, DocumentPreprocessor, OcrController, PopplerTools, TesseractCli};
use crate::report::ReportGenerator;
use crate::util::{
    ensure_directory, local_date_string, now_utc_string, sha256_file, utc_compact_string,
    write_json_pretty,
};

pub fn run(args: ProcessArgs) -> Result<()> {
    let started_ts = Utc::now();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let output_root = args.output_root.clone();
    let manifest_dir = output_root.join("manifests");
    let report_dir = output_root.join("relatorios");
    let scratch_dir = output_root.join("tmp").join(&run_id);
    let audit_db_path = args
        .audit_db_path
        .clone()
        .unwrap_or_else(|| output_root.join("auditoria.sqlite"));

    ensure_directory(&output_root)?;
    ensure_directory(&args.intake_dir)?;

    let lock = RunLock::acquire(
        &output_root.join("runner.lock"),
        lock_max_age(args.lock_max_age_minutes),
    )?;

    ensure_directory(&manifest_dir)?;
    ensure_directory(&scratch_dir)?;

    let mut aggregator = RunAggregator::new(&run_id, started_ts)?;
    info!(
        run_id = %run_id,
        intake_dir = %aggregator.masker().mask_path(&args.intake_dir),
        output_root = %aggregator.masker().mask_path(&output_root),
        lock = %lock.path().display(),
        "starting intake run"
    );

    let poppler = PopplerTools::new(args.poppler_dir.as_deref(), args.dpi)?;
    let engine = TesseractCli::new(&args.tesseract_bin, &args.ocr_lang);
    match engine.version() {
        Some(version) => info!(version = %version, lang = %args.ocr_lang, "OCR engine ready"),
        None => warn!(program = %args.tesseract_bin.display(), "could not determine OCR engine version"),
    }

    let preprocessor = DocumentPreprocessor::new(&scratch_dir);
    let scorer = ConfidenceScorer::new()?;
    let extractor = FieldExtractor::new()?;
    let classifier = Classifier::new()?;
    let store = PdfPageStore::new(&poppler);
    let pipeline = PagePipeline::new(
        &poppler,
        OcrController::new(&engine, &preprocessor, &scorer),
        &extractor,
        &classifier,
        &store,
        &scratch_dir,
    )
    .with_max_pages(args.max_pages_per_doc);

    let run_date = local_date_string(Local::now());
    process_intake(
        &pipeline,
        &args.intake_dir,
        &output_root,
        &args.work_site,
        &run_date,
        &mut aggregator,
    )?;

    let stats = aggregator.finalize_at(Utc::now()).clone();
    let generated_at = now_utc_string();

    let manifest_path = manifest_dir.join(format!("manifest_{run_id}.json"));
    write_json_pretty(&manifest_path, &aggregator.run_manifest(&generated_at))?;
    info!(
        path = %aggregator.masker().mask_path(&manifest_path),
        entries = aggregator.manifest_entries().len(),
        "wrote run manifest"
    );

    let queue_path = manifest_dir.join(format!("upload_queue_{run_id}.json"));
    write_json_pretty(&queue_path, &aggregator.upload_queue_manifest(&generated_at))?;
    info!(
        path = %aggregator.masker().mask_path(&queue_path),
        files = aggregator.upload_queue().len(),
        "wrote upload queue"
    );

    if aggregator.should_report() {
        let paths = ReportGenerator::new(&report_dir)?.save_report(&stats, Local::now())?;
        info!(json = %paths.json.display(), markdown = %paths.markdown.display(), "run report ready");
    } else {
        info!("nothing detected and no errors, report skipped");
    }

    let masker = aggregator.masker();
    if let Err(err) = record_audit(&audit_db_path, &stats, masker) {
        warn!(
            path = %masker.mask_path(&audit_db_path),
            error = %masker.mask_cpf_in_text(&format!("{err:#}")),
            "failed to write audit ledger"
        );
    }

    if let Err(err) = fs::remove_dir_all(&scratch_dir) {
        warn!(path = %masker.mask_path(&scratch_dir), error = %err, "failed to remove scratch directory");
    }

    log_summary(&stats);
    Ok(())
}

/// Walks the intake directory in arrival order. Attachments whose content was
/// already seen earlier in the same run are skipped without counting pages.
pub(super) fn process_intake(
    pipeline: &PagePipeline<'_>,
    intake_dir: &Path,
    output_root: &Path,
    default_site: &str,
    run_date: &str,
    aggregator: &mut RunAggregator,
) -> Result<()> {
    let sites = WorkSiteParser::new()?;
    let pdf_paths = discover_pdfs(intake_dir)?;
    info!(count = pdf_paths.len(), "intake attachments found");

    let mut seen_hashes: HashSet<String> = HashSet::new();
    for pdf_path in pdf_paths {
        let filename = match file_name_of(&pdf_path) {
            Ok(filename) => filename,
            Err(err) => {
                aggregator.record_attachment_failure(&pdf_path, &err);
                continue;
            }
        };
        match sha256_file(&pdf_path) {
            Ok(hash) => {
                if !seen_hashes.insert(hash) {
                    info!(
                        file = %aggregator.masker().mask_cpf_in_text(&filename),
                        "identical attachment already processed in this run, skipping"
                    );
                    continue;
                }
            }
            Err(err) => {
                aggregator.record_attachment_failure(&pdf_path, &err);
                continue;
            }
        }

        let work_site = sites
            .parse(&filename)
            .unwrap_or_else(|| default_site.to_string());
        let destination_dir = destination_dir(output_root, &work_site, run_date);

        pipeline.process_attachment(
            &Attachment {
                pdf_path: &pdf_path,
                work_site: &work_site,
                destination_dir: &destination_dir,
            },
            aggregator,
        );
    }

    Ok(())
}

pub(super) fn lock_max_age(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

pub(super) fn destination_dir(output_root: &Path, work_site: &str, run_date: &str) -> PathBuf {
    output_root.join(format!("Obra_{work_site}")).join(run_date)
}

fn record_audit(path: &Path, stats: &RunStats, masker: &CpfMasker) -> Result<()> {
    let (record, errors) = audit_record_from_stats(stats, masker);
    let mut ledger = AuditLedger::open(path)?;
    ledger.record_run(&record, &errors)?;
    info!(
        path = %path.display(),
        final_result = %record.final_result,
        errors = errors.len(),
        "audit ledger updated"
    );
    Ok(())
}

fn log_summary(stats: &RunStats) {
    info!(
        run_id = %stats.execution_id,
        detected = stats.total_detected,
        processed = stats.total_processed,
        success = stats.success,
        error = stats.error,
        skipped_duplicate = stats.skipped_duplicate,
        skipped_draft = stats.skipped_draft,
        skipped_non_aso = stats.skipped_non_aso,
        duration = %stats.tempo_total,
        "run completed"
    );
    if stats.run_status == RunStatus::Inconsistent {
        warn!(errors = stats.error, "run finished with errors, see report");
    }
}
