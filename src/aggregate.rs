//! Run-level accumulation of page outcomes. One aggregator per run, owned by
//! the processing loop and mutated page by page.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::classify::SourcePage;
use crate::masking::CpfMasker;
use crate::model::{
    ErrorEntry, ManifestEntry, OcrFailureEntry, Outcome, OutcomeRecord, RunManifest, RunStatus,
    UploadQueue,
};
use crate::util::format_duration;

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub execution_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub tempo_total: String,
    pub duration_seconds: i64,
    pub total_detected: usize,
    pub total_processed: usize,
    pub success: usize,
    pub error: usize,
    pub skipped_duplicate: usize,
    pub skipped_draft: usize,
    pub skipped_non_aso: usize,
    pub sucessos: Vec<String>,
    pub erros: Vec<ErrorEntry>,
    pub ocr_failures: Vec<OcrFailureEntry>,
    pub skipped_items: Vec<String>,
    pub run_status: RunStatus,
}

pub struct RunAggregator {
    stats: RunStats,
    started: DateTime<Utc>,
    manifest: Vec<ManifestEntry>,
    upload_queue: Vec<PathBuf>,
    masker: CpfMasker,
}

impl RunAggregator {
    pub fn new(execution_id: &str, started: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            stats: RunStats {
                execution_id: execution_id.to_string(),
                started_at: started.to_rfc3339_opts(SecondsFormat::Secs, true),
                finished_at: None,
                tempo_total: String::new(),
                duration_seconds: 0,
                total_detected: 0,
                total_processed: 0,
                success: 0,
                error: 0,
                skipped_duplicate: 0,
                skipped_draft: 0,
                skipped_non_aso: 0,
                sucessos: Vec::new(),
                erros: Vec::new(),
                ocr_failures: Vec::new(),
                skipped_items: Vec::new(),
                run_status: RunStatus::Consistent,
            },
            started,
            manifest: Vec::new(),
            upload_queue: Vec::new(),
            masker: CpfMasker::new()?,
        })
    }

    pub fn masker(&self) -> &CpfMasker {
        &self.masker
    }

    pub fn page_detected(&mut self) {
        self.stats.total_detected += 1;
    }

    /// Counts one classified page and appends its manifest entry.
    /// `display_filename` is masked before it is stored anywhere.
    pub fn record(&mut self, page: &SourcePage, record: &OutcomeRecord, display_filename: &str) {
        let document = &record.source_document;
        let safe_filename = self.masker.mask_cpf_in_text(display_filename);
        let masked_cpf = self.masker.mask_cpf(document.cpf_str());
        let source = self.masker.mask_cpf_in_text(&page.display_name());

        self.stats.total_processed += 1;
        match record.outcome {
            Outcome::Success => {
                self.stats.success += 1;
                self.stats.sucessos.push(safe_filename.clone());
                if let Some(destination) = &record.destination_path {
                    self.upload_queue.push(destination.clone());
                }
            }
            Outcome::Error => {
                self.stats.error += 1;
                self.stats.ocr_failures.push(OcrFailureEntry {
                    arquivo: source.clone(),
                    nome: document.name_str().to_string(),
                    cpf: masked_cpf.clone(),
                });
            }
            Outcome::SkippedDuplicate => {
                self.stats.skipped_duplicate += 1;
                self.stats
                    .skipped_items
                    .push(format!("{source} - {}: {safe_filename}", record.outcome));
            }
            Outcome::SkippedDraft => {
                self.stats.skipped_draft += 1;
                self.stats
                    .skipped_items
                    .push(format!("{source} - {}", record.outcome));
            }
            Outcome::SkippedNonAso => {
                self.stats.skipped_non_aso += 1;
                self.stats
                    .skipped_items
                    .push(format!("{source} - {}", record.outcome));
            }
        }

        info!(
            outcome = %record.outcome,
            file = %source,
            filename = %safe_filename,
            cpf = %masked_cpf,
            "page classified"
        );

        self.manifest.push(ManifestEntry {
            source_file: self.masker.mask_path(&page.pdf_path),
            page: page.page_number,
            filename: safe_filename,
            cpf: masked_cpf,
            outcome: record.outcome,
            message: self.masker.mask_cpf_in_text(&record.message),
        });
    }

    /// An unexpected failure inside one page. Counted as a generic error.
    pub fn record_page_failure(&mut self, page: &SourcePage, err: &anyhow::Error) {
        let message = self.masker.mask_cpf_in_text(&format!("{err:#}"));
        let source = self.masker.mask_cpf_in_text(&page.display_name());
        error!(file = %source, page = page.page_number, error = %message, "page processing failed");

        self.stats.total_processed += 1;
        self.stats.error += 1;
        self.stats.erros.push(ErrorEntry {
            arquivo: source,
            erro: message.clone(),
        });
        self.manifest.push(ManifestEntry {
            source_file: self.masker.mask_path(&page.pdf_path),
            page: page.page_number,
            filename: String::new(),
            cpf: String::new(),
            outcome: Outcome::Error,
            message,
        });
    }

    /// A whole attachment could not be opened or rasterized.
    pub fn record_attachment_failure(&mut self, pdf_path: &Path, err: &anyhow::Error) {
        let message = self.masker.mask_cpf_in_text(&format!("{err:#}"));
        let arquivo = pdf_path
            .file_name()
            .map(|value| self.masker.mask_cpf_in_text(&value.to_string_lossy()))
            .unwrap_or_else(|| self.masker.mask_path(pdf_path));
        warn!(file = %arquivo, error = %message, "attachment processing failed");

        self.stats.error += 1;
        self.stats.erros.push(ErrorEntry {
            arquivo,
            erro: message,
        });
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn manifest_entries(&self) -> &[ManifestEntry] {
        &self.manifest
    }

    pub fn upload_queue(&self) -> &[PathBuf] {
        &self.upload_queue
    }

    /// Stamps the end time and derives the run status.
    pub fn finalize_at(&mut self, finished: DateTime<Utc>) -> &RunStats {
        let seconds = (finished - self.started).num_seconds().max(0);
        self.stats.finished_at = Some(finished.to_rfc3339_opts(SecondsFormat::Secs, true));
        self.stats.duration_seconds = seconds;
        self.stats.tempo_total = format_duration(seconds);
        self.stats.run_status = if self.stats.error > 0 {
            RunStatus::Inconsistent
        } else {
            RunStatus::Consistent
        };
        &self.stats
    }

    /// A quiet run (nothing detected, nothing failed) produces no report.
    pub fn should_report(&self) -> bool {
        self.stats.total_detected > 0 || self.stats.error > 0 || !self.stats.erros.is_empty()
    }

    pub fn run_manifest(&self, generated_at: &str) -> RunManifest {
        RunManifest {
            manifest_version: MANIFEST_VERSION,
            execution_id: self.stats.execution_id.clone(),
            generated_at: generated_at.to_string(),
            run_status: self.stats.run_status,
            items: self.manifest.clone(),
        }
    }

    pub fn upload_queue_manifest(&self, generated_at: &str) -> UploadQueue {
        UploadQueue {
            manifest_version: MANIFEST_VERSION,
            execution_id: self.stats.execution_id.clone(),
            generated_at: generated_at.to_string(),
            files: self
                .upload_queue
                .iter()
                .map(|path| path.display().to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::model::{ExtractedDocument, FieldValue};

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn page(number: usize) -> SourcePage {
        SourcePage {
            pdf_path: PathBuf::from("/intake/lote.pdf"),
            page_number: number,
        }
    }

    fn outcome(outcome: Outcome, name: FieldValue, cpf: FieldValue) -> OutcomeRecord {
        let destination = matches!(outcome, Outcome::Success | Outcome::SkippedDuplicate)
            .then(|| PathBuf::from("/out/JOAO DA SILVA - 123.456.789-01.pdf"));
        OutcomeRecord {
            outcome,
            source_document: ExtractedDocument {
                raw_text: String::new(),
                normalized_text: String::new(),
                name,
                cpf,
                certificate_date: FieldValue::Unknown,
                role: FieldValue::Unknown,
                is_certificate: true,
            },
            destination_path: destination,
            message: "test".to_string(),
        }
    }

    fn known(value: &str) -> FieldValue {
        FieldValue::Known(value.to_string())
    }

    #[test]
    fn counters_and_lists_follow_outcomes() {
        let mut aggregator = RunAggregator::new("run-test", started()).expect("aggregator");
        let filename = "JOAO DA SILVA - 123.456.789-01.pdf";

        for _ in 0..4 {
            aggregator.page_detected();
        }
        aggregator.record(
            &page(1),
            &outcome(Outcome::Success, known("JOAO DA SILVA"), known("123.456.789-01")),
            filename,
        );
        aggregator.record(
            &page(2),
            &outcome(
                Outcome::SkippedDuplicate,
                known("JOAO DA SILVA"),
                known("123.456.789-01"),
            ),
            filename,
        );
        aggregator.record(
            &page(3),
            &outcome(Outcome::SkippedDraft, FieldValue::Ignored, FieldValue::Ignored),
            "RASCUNHO - Ignorar.pdf",
        );
        aggregator.record(
            &page(4),
            &outcome(Outcome::Error, known("JOAO DA SILVA"), FieldValue::Unknown),
            "JOAO DA SILVA - CPF_Desconhecido.pdf",
        );

        let stats = aggregator.finalize_at(started() + Duration::seconds(3725));
        assert_eq!(stats.total_detected, 4);
        assert_eq!(stats.total_processed, 4);
        assert_eq!(stats.success, 1);
        assert_eq!(stats.skipped_duplicate, 1);
        assert_eq!(stats.skipped_draft, 1);
        assert_eq!(stats.error, 1);
        assert_eq!(stats.ocr_failures.len(), 1);
        assert_eq!(stats.ocr_failures[0].cpf, "CPF_Desconhecido");
        assert!(stats.erros.is_empty());
        assert_eq!(stats.skipped_items.len(), 2);
        assert_eq!(stats.run_status, RunStatus::Inconsistent);
        assert_eq!(stats.tempo_total, "1:02:05");

        assert_eq!(aggregator.upload_queue().len(), 1);
        assert_eq!(aggregator.manifest_entries().len(), 4);
    }

    #[test]
    fn clean_run_is_consistent() {
        let mut aggregator = RunAggregator::new("run-test", started()).expect("aggregator");
        aggregator.page_detected();
        aggregator.record(
            &page(1),
            &outcome(Outcome::SkippedNonAso, known("JOAO DA SILVA"), known("123.456.789-01")),
            "JOAO DA SILVA - 123.456.789-01.pdf",
        );

        let stats = aggregator.finalize_at(started());
        assert_eq!(stats.run_status, RunStatus::Consistent);
        assert!(aggregator.upload_queue().is_empty());
        assert!(aggregator.should_report());
    }

    #[test]
    fn quiet_run_emits_no_report() {
        let mut aggregator = RunAggregator::new("run-test", started()).expect("aggregator");
        aggregator.finalize_at(started());
        assert!(!aggregator.should_report());
    }

    #[test]
    fn attachment_failure_forces_report_and_inconsistent_status() {
        let mut aggregator = RunAggregator::new("run-test", started()).expect("aggregator");
        aggregator.record_attachment_failure(
            Path::new("/intake/quebrado.pdf"),
            &anyhow::anyhow!("pdfinfo failed for CPF 12345678901"),
        );

        let stats = aggregator.finalize_at(started());
        assert_eq!(stats.run_status, RunStatus::Inconsistent);
        assert_eq!(stats.erros[0].arquivo, "quebrado.pdf");
        assert!(!stats.erros[0].erro.contains("12345678901"));
        assert!(aggregator.should_report());
    }

    #[test]
    fn cpf_in_source_file_name_is_masked_everywhere() {
        let mut aggregator = RunAggregator::new("run-test", started()).expect("aggregator");
        let page = |number| SourcePage {
            pdf_path: PathBuf::from("/intake/ASO JOAO 12345678901.pdf"),
            page_number: number,
        };
        aggregator.page_detected();
        aggregator.page_detected();
        aggregator.record(
            &page(1),
            &outcome(Outcome::SkippedDraft, FieldValue::Ignored, FieldValue::Ignored),
            "RASCUNHO - Ignorar.pdf",
        );
        aggregator.record_page_failure(&page(2), &anyhow::anyhow!("render failed"));
        aggregator.record_attachment_failure(
            Path::new("/intake/CPF 98765432100.pdf"),
            &anyhow::anyhow!("pdfinfo failed"),
        );
        aggregator.finalize_at(started());

        let manifest = serde_json::to_string(&aggregator.run_manifest("2025-02-01T08:00:00Z"))
            .expect("serialize manifest");
        assert!(!manifest.contains("12345678901"));
        assert!(manifest.contains("ASO JOAO ***.***.**9-01.pdf"));

        let stats = serde_json::to_string(aggregator.stats()).expect("serialize stats");
        assert!(!stats.contains("12345678901"));
        assert!(!stats.contains("98765432100"));
    }

    #[test]
    fn manifest_never_carries_an_unmasked_cpf() {
        let mut aggregator = RunAggregator::new("run-test", started()).expect("aggregator");
        aggregator.page_detected();
        aggregator.record(
            &page(1),
            &outcome(Outcome::Success, known("JOAO DA SILVA"), known("123.456.789-01")),
            "JOAO DA SILVA - 123.456.789-01.pdf",
        );
        aggregator.record_page_failure(&page(2), &anyhow::anyhow!("bad page 123.456.789-01"));
        aggregator.finalize_at(started());

        let manifest = serde_json::to_string(&aggregator.run_manifest("2025-02-01T08:00:00Z"))
            .expect("serialize manifest");
        assert!(!manifest.contains("123.456.789-01"));
        assert!(manifest.contains("***.***.**9-01"));

        let stats = serde_json::to_string(aggregator.stats()).expect("serialize stats");
        assert!(!stats.contains("123.456.789-01"));
    }
}
