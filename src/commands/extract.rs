use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::classify::Classifier;
use crate::cli::ExtractArgs;
use crate::extract::{FieldExtractor, is_draft};
use crate::masking::CpfMasker;
use crate::ocr::{ConfidenceScorer, FAST_PATH_THRESHOLD};

#[derive(Debug, Serialize)]
struct ExtractionReport {
    source: String,
    name: String,
    cpf: String,
    certificate_date: String,
    role: String,
    is_certificate: bool,
    is_draft: bool,
    score: u32,
    fast_path: bool,
    score_signals: Vec<&'static str>,
    destination_filename: String,
}

pub fn run(args: ExtractArgs) -> Result<()> {
    let text = fs::read_to_string(&args.text_file)
        .with_context(|| format!("failed to read {}", args.text_file.display()))?;

    let report = build_report(&args.text_file.display().to_string(), &text)?;
    info!(
        source = %report.source,
        score = report.score,
        is_certificate = report.is_certificate,
        "extraction finished"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &report)
        .context("failed to serialize extraction json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn build_report(source: &str, text: &str) -> Result<ExtractionReport> {
    let extractor = FieldExtractor::new()?;
    let scorer = ConfidenceScorer::new()?;
    let classifier = Classifier::new()?;
    let masker = CpfMasker::new()?;

    let document = extractor.extract_text(text);
    let score = scorer.score(text);

    Ok(ExtractionReport {
        source: source.to_string(),
        name: document.name_str().to_string(),
        cpf: masker.mask_cpf(document.cpf_str()),
        certificate_date: document.date_str().to_string(),
        role: document.role_str().to_string(),
        is_certificate: document.is_certificate,
        is_draft: is_draft(&document.raw_text),
        score,
        fast_path: score >= FAST_PATH_THRESHOLD,
        score_signals: scorer.matched_signals(text),
        destination_filename: masker.mask_cpf_in_text(&classifier.destination_filename(&document)),
    })
}
