use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;

use super::pipeline::{Attachment, PagePipeline};
use super::run::{destination_dir, lock_max_age, process_intake};
use crate::aggregate::RunAggregator;
use crate::classify::{Classifier, PageStore, SourcePage};
use crate::extract::FieldExtractor;
use crate::model::{Outcome, RunStatus};
use crate::ocr::{
    ConfidenceScorer, ImagePreprocessor, OcrController, OcrEngine, PageRasterizer, PageSegMode,
};

const PAGE_BREAK: &str = "\u{c}";
const RUN_DATE: &str = "2025-02-01";

const VALID_PAGE: &str = "ATESTADO DE SAÚDE OCUPACIONAL\nNome: JOAO DA SILVA\nCPF: 123.456.789-01\nData: 10/01/2025\nFunção: ELETRICISTA\n";
const DRAFT_PAGE: &str = "ASO RASCUNHO RASCUNHO RASCUNHO RASCUNHO\nNome: TESTE\n";
const NON_CERTIFICATE_PAGE: &str = "FICHA DE REGISTRO\nNome: MARIA SOUZA\nCPF: 987.654.321-00\n";
const MISSING_CPF_PAGE: &str = "ASO\nNome: PEDRO ALVES\n";
const UNRENDERABLE_PAGE: &str = "RENDER_FAIL";

/// Test PDFs are plain text files whose pages are separated by form feeds.
/// Rendering writes the page text to the scratch image path.
struct TextPdfRasterizer;

impl TextPdfRasterizer {
    fn pages(pdf_path: &Path) -> Result<Vec<String>> {
        let body = fs::read_to_string(pdf_path)?;
        if body.starts_with("BROKEN") {
            bail!("pdfinfo returned non-zero exit status for {}", pdf_path.display());
        }
        Ok(body.split(PAGE_BREAK).map(ToOwned::to_owned).collect())
    }
}

impl PageRasterizer for TextPdfRasterizer {
    fn page_count(&self, pdf_path: &Path) -> Result<usize> {
        Ok(Self::pages(pdf_path)?.len())
    }

    fn render_page(&self, pdf_path: &Path, page_number: usize, scratch_dir: &Path) -> Result<PathBuf> {
        let pages = Self::pages(pdf_path)?;
        let text = &pages[page_number - 1];
        if text == UNRENDERABLE_PAGE {
            bail!("pdftoppm returned non-zero exit status");
        }
        fs::create_dir_all(scratch_dir)?;
        let image = scratch_dir.join(format!("page_{page_number}.png"));
        fs::write(&image, text)?;
        Ok(image)
    }
}

/// Reads the "image" back as its text.
struct EchoEngine;

impl OcrEngine for EchoEngine {
    fn recognize(&self, image: &Path, _mode: PageSegMode) -> Result<String> {
        Ok(fs::read_to_string(image)?)
    }
}

struct PassThrough;

impl ImagePreprocessor for PassThrough {
    fn preprocess(&self, image: &Path) -> Result<PathBuf> {
        Ok(image.to_path_buf())
    }
}

struct DirectoryStore;

impl PageStore for DirectoryStore {
    fn exists(&self, destination: &Path) -> bool {
        destination.exists()
    }

    fn save_page(&self, page: &SourcePage, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(destination, page.display_name())?;
        Ok(())
    }
}

struct Fixture {
    scorer: ConfidenceScorer,
    extractor: FieldExtractor,
    classifier: Classifier,
    scratch: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            scorer: ConfidenceScorer::new().expect("scorer"),
            extractor: FieldExtractor::new().expect("extractor"),
            classifier: Classifier::new().expect("classifier"),
            scratch: tempfile::tempdir().expect("scratch dir"),
        }
    }

    fn pipeline(&self) -> PagePipeline<'_> {
        PagePipeline::new(
            &TextPdfRasterizer,
            OcrController::new(&EchoEngine, &PassThrough, &self.scorer),
            &self.extractor,
            &self.classifier,
            &DirectoryStore,
            self.scratch.path(),
        )
    }
}

fn aggregator() -> RunAggregator {
    RunAggregator::new("run-test", Utc::now()).expect("aggregator")
}

fn write_pdf(dir: &Path, name: &str, pages: &[&str]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, pages.join(PAGE_BREAK)).expect("write test pdf");
    path
}

#[test]
fn each_page_gets_its_own_outcome_and_failures_do_not_stop_the_attachment() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline();
    let intake = tempfile::tempdir().expect("intake");
    let output = tempfile::tempdir().expect("output");

    let pdf = write_pdf(
        intake.path(),
        "ASO ADMISSIONAL - 77.pdf",
        &[
            VALID_PAGE,
            DRAFT_PAGE,
            NON_CERTIFICATE_PAGE,
            UNRENDERABLE_PAGE,
            MISSING_CPF_PAGE,
        ],
    );
    let destination = destination_dir(output.path(), "77", RUN_DATE);

    let mut aggregator = aggregator();
    pipeline.process_attachment(
        &Attachment {
            pdf_path: &pdf,
            work_site: "77",
            destination_dir: &destination,
        },
        &mut aggregator,
    );

    let stats = aggregator.finalize_at(Utc::now()).clone();
    assert_eq!(stats.total_detected, 5);
    assert_eq!(stats.total_processed, 5);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.skipped_draft, 1);
    assert_eq!(stats.skipped_non_aso, 1);
    assert_eq!(stats.error, 2);
    assert_eq!(stats.erros.len(), 1);
    assert_eq!(stats.ocr_failures.len(), 1);
    assert_eq!(stats.run_status, RunStatus::Inconsistent);

    let outcomes: Vec<Outcome> = aggregator
        .manifest_entries()
        .iter()
        .map(|entry| entry.outcome)
        .collect();
    assert_eq!(
        outcomes,
        vec![
            Outcome::Success,
            Outcome::SkippedDraft,
            Outcome::SkippedNonAso,
            Outcome::Error,
            Outcome::Error,
        ]
    );

    let saved = destination.join("JOAO DA SILVA - 123.456.789-01.pdf");
    assert!(saved.exists());
    assert_eq!(aggregator.upload_queue(), &[saved]);

    let audit_log = fs::read_to_string(destination.join("OCR_ASO ADMISSIONAL - 77.txt"))
        .expect("read audit log");
    assert_eq!(audit_log.matches("==== ").count(), 4);
    assert!(audit_log.contains("Obra: 77"));
    assert!(audit_log.contains("Resultado: SKIPPED_DRAFT"));
    assert!(!audit_log.contains("123.456.789-01"));
    assert!(!audit_log.contains("987.654.321-00"));
}

#[test]
fn unreadable_attachment_is_recorded_once_without_pages() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline();
    let intake = tempfile::tempdir().expect("intake");
    let output = tempfile::tempdir().expect("output");
    let pdf = write_pdf(intake.path(), "quebrado.pdf", &["BROKEN"]);
    let destination = destination_dir(output.path(), "SEM_OBRA", RUN_DATE);

    let mut aggregator = aggregator();
    pipeline.process_attachment(
        &Attachment {
            pdf_path: &pdf,
            work_site: "SEM_OBRA",
            destination_dir: &destination,
        },
        &mut aggregator,
    );

    let stats = aggregator.finalize_at(Utc::now());
    assert_eq!(stats.total_detected, 0);
    assert_eq!(stats.error, 1);
    assert_eq!(stats.erros[0].arquivo, "quebrado.pdf");
    assert!(aggregator.should_report());
}

#[test]
fn page_limit_caps_detected_pages() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline().with_max_pages(Some(1));
    let intake = tempfile::tempdir().expect("intake");
    let output = tempfile::tempdir().expect("output");
    let pdf = write_pdf(intake.path(), "lote.pdf", &[VALID_PAGE, DRAFT_PAGE]);
    let destination = destination_dir(output.path(), "SEM_OBRA", RUN_DATE);

    let mut aggregator = aggregator();
    pipeline.process_attachment(
        &Attachment {
            pdf_path: &pdf,
            work_site: "SEM_OBRA",
            destination_dir: &destination,
        },
        &mut aggregator,
    );

    assert_eq!(aggregator.stats().total_detected, 1);
    assert_eq!(aggregator.stats().success, 1);
}

#[test]
fn intake_skips_identical_attachments_and_second_run_sees_duplicates() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline();
    let intake = tempfile::tempdir().expect("intake");
    let output = tempfile::tempdir().expect("output");

    write_pdf(intake.path(), "ASO ADMISSIONAL - 12.pdf", &[VALID_PAGE]);
    write_pdf(intake.path(), "ASO ADMISSIONAL - 12 (1).pdf", &[VALID_PAGE]);

    let mut first = aggregator();
    process_intake(&pipeline, intake.path(), output.path(), "SEM_OBRA", RUN_DATE, &mut first)
        .expect("first run");
    assert_eq!(first.stats().total_detected, 1);
    assert_eq!(first.stats().success, 1);
    assert!(
        destination_dir(output.path(), "12", RUN_DATE)
            .join("JOAO DA SILVA - 123.456.789-01.pdf")
            .exists()
    );

    let mut second = aggregator();
    process_intake(&pipeline, intake.path(), output.path(), "SEM_OBRA", RUN_DATE, &mut second)
        .expect("second run");
    assert_eq!(second.stats().success, 0);
    assert_eq!(second.stats().skipped_duplicate, 1);
    assert!(second.upload_queue().is_empty());
}

#[test]
fn work_site_falls_back_to_default() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline();
    let intake = tempfile::tempdir().expect("intake");
    let output = tempfile::tempdir().expect("output");
    write_pdf(intake.path(), "digitalizado.pdf", &[VALID_PAGE]);

    let mut aggregator = aggregator();
    process_intake(&pipeline, intake.path(), output.path(), "SEM_OBRA", RUN_DATE, &mut aggregator)
        .expect("run");

    assert!(
        destination_dir(output.path(), "SEM_OBRA", RUN_DATE)
            .join("JOAO DA SILVA - 123.456.789-01.pdf")
            .exists()
    );
}

#[test]
fn cpf_in_attachment_name_stays_out_of_manifest_and_stats() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline();
    let intake = tempfile::tempdir().expect("intake");
    let output = tempfile::tempdir().expect("output");
    write_pdf(intake.path(), "ASO JOAO 12345678901.pdf", &[VALID_PAGE, UNRENDERABLE_PAGE]);

    let mut aggregator = aggregator();
    process_intake(&pipeline, intake.path(), output.path(), "SEM_OBRA", RUN_DATE, &mut aggregator)
        .expect("run");
    let stats = aggregator.finalize_at(Utc::now()).clone();
    assert_eq!(stats.success, 1);
    assert_eq!(stats.error, 1);

    let manifest = serde_json::to_string(&aggregator.run_manifest("2025-02-01T00:00:00Z"))
        .expect("serialize manifest");
    assert!(!manifest.contains("12345678901"));
    assert!(manifest.contains("ASO JOAO ***.***.**9-01.pdf"));

    let stats_json = serde_json::to_string(&stats).expect("serialize stats");
    assert!(!stats_json.contains("12345678901"));
}

#[cfg(target_os = "linux")]
#[test]
fn non_utf8_attachment_name_is_an_error_not_a_crash() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let fixture = Fixture::new();
    let pipeline = fixture.pipeline();
    let intake = tempfile::tempdir().expect("intake");
    let output = tempfile::tempdir().expect("output");
    write_pdf(intake.path(), "digitalizado.pdf", &[VALID_PAGE]);
    fs::write(intake.path().join(OsStr::from_bytes(b"z\xff.pdf")), NON_CERTIFICATE_PAGE)
        .expect("write non-utf8 pdf");

    let mut aggregator = aggregator();
    process_intake(&pipeline, intake.path(), output.path(), "SEM_OBRA", RUN_DATE, &mut aggregator)
        .expect("run continues");

    let stats = aggregator.finalize_at(Utc::now());
    assert_eq!(stats.total_detected, 1);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.error, 1);
    assert_eq!(stats.erros.len(), 1);
    assert_eq!(stats.run_status, RunStatus::Inconsistent);
}

#[test]
fn lock_age_saturates_instead_of_overflowing() {
    assert_eq!(lock_max_age(30), Duration::from_secs(1800));
    assert_eq!(lock_max_age(0), Duration::ZERO);
    assert_eq!(lock_max_age(u64::MAX), Duration::from_secs(u64::MAX));
}
