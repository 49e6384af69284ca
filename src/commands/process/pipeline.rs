use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::aggregate::RunAggregator;
use crate::classify::{Classifier, PageStore, SourcePage};
use crate::extract::FieldExtractor;
use crate::masking::CpfMasker;
use crate::model::{ExtractedDocument, OutcomeRecord};
use crate::ocr::{OcrController, PageRasterizer};
use crate::util::append_text;

/// Where one attachment's pages go.
pub struct Attachment<'a> {
    pub pdf_path: &'a Path,
    pub work_site: &'a str,
    pub destination_dir: &'a Path,
}

/// Render, OCR, extract and classify, one page at a time.
pub struct PagePipeline<'a> {
    rasterizer: &'a dyn PageRasterizer,
    ocr: OcrController<'a>,
    extractor: &'a FieldExtractor,
    classifier: &'a Classifier,
    store: &'a dyn PageStore,
    scratch_dir: PathBuf,
    max_pages: Option<usize>,
}

impl<'a> PagePipeline<'a> {
    pub fn new(
        rasterizer: &'a dyn PageRasterizer,
        ocr: OcrController<'a>,
        extractor: &'a FieldExtractor,
        classifier: &'a Classifier,
        store: &'a dyn PageStore,
        scratch_dir: &Path,
    ) -> Self {
        Self {
            rasterizer,
            ocr,
            extractor,
            classifier,
            store,
            scratch_dir: scratch_dir.to_path_buf(),
            max_pages: None,
        }
    }

    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Pages are handled in order. A page that fails is recorded as an error
    /// and the next page still runs; an attachment whose page count cannot be
    /// read is recorded once and skipped.
    pub fn process_attachment(&self, attachment: &Attachment<'_>, aggregator: &mut RunAggregator) {
        let pdf_path = attachment.pdf_path;
        let safe_path = aggregator.masker().mask_path(pdf_path);
        let page_count = match self.rasterizer.page_count(pdf_path) {
            Ok(count) => count,
            Err(err) => {
                aggregator.record_attachment_failure(pdf_path, &err);
                return;
            }
        };

        let pages = match self.max_pages {
            Some(limit) if limit < page_count => {
                warn!(
                    file = %safe_path,
                    page_count,
                    limit,
                    "attachment exceeds page limit, remaining pages ignored"
                );
                limit
            }
            _ => page_count,
        };
        info!(file = %safe_path, pages, work_site = attachment.work_site, "processing attachment");

        let audit_log = audit_log_path(attachment);
        for page_number in 1..=pages {
            aggregator.page_detected();
            let page = SourcePage {
                pdf_path: pdf_path.to_path_buf(),
                page_number,
            };

            match self.process_page(&page, attachment.destination_dir) {
                Ok(record) => {
                    let filename = self
                        .classifier
                        .destination_filename(&record.source_document);
                    aggregator.record(&page, &record, &filename);

                    let masker = aggregator.masker();
                    let written = audit_block(masker, attachment.work_site, &page, &filename, &record)
                        .and_then(|block| append_text(&audit_log, &block));
                    if let Err(err) = written {
                        warn!(
                            path = %masker.mask_path(&audit_log),
                            error = %masker.mask_cpf_in_text(&format!("{err:#}")),
                            "failed to append page audit block"
                        );
                    }
                }
                Err(err) => aggregator.record_page_failure(&page, &err),
            }
        }
    }

    pub fn process_page(&self, page: &SourcePage, destination_dir: &Path) -> Result<OutcomeRecord> {
        let image = self
            .rasterizer
            .render_page(&page.pdf_path, page.page_number, &self.scratch_dir)
            .with_context(|| format!("failed to render {}", page.display_name()))?;

        let document = self.read_page(&image);
        if let Err(err) = fs::remove_file(&image) {
            debug!(page = page.page_number, error = %err, "page image already gone");
        }

        self.classifier
            .classify(document, destination_dir, self.store, page)
    }

    fn read_page(&self, image: &Path) -> ExtractedDocument {
        let text = self.ocr.ocr_with_fallback(image, false);
        debug!(score = self.ocr.score(&text), chars = text.len(), "page OCR complete");

        self.extractor
            .extract(&text, || Some(self.ocr.ocr_with_fallback(image, true)))
    }
}

/// `OCR_<pdf stem>.txt` next to the saved pages.
fn audit_log_path(attachment: &Attachment<'_>) -> PathBuf {
    let stem = attachment
        .pdf_path
        .file_stem()
        .map(|value| value.to_string_lossy().into_owned())
        .unwrap_or_else(|| "anexo".to_string());
    attachment.destination_dir.join(format!("OCR_{stem}.txt"))
}

fn audit_block(
    masker: &CpfMasker,
    work_site: &str,
    page: &SourcePage,
    filename: &str,
    record: &OutcomeRecord,
) -> Result<String> {
    let document = &record.source_document;
    let mut out = String::new();
    writeln!(out, "==== {} ====", masker.mask_cpf_in_text(&page.display_name()))?;
    writeln!(out, "Obra: {work_site}")?;
    writeln!(out, "Arquivo: {}", masker.mask_cpf_in_text(filename))?;
    writeln!(out, "Nome: {}", document.name_str())?;
    writeln!(out, "CPF: {}", masker.mask_cpf(document.cpf_str()))?;
    writeln!(out, "Data: {}", document.date_str())?;
    writeln!(out, "Funcao: {}", document.role_str())?;
    writeln!(out, "Resultado: {}", record.outcome)?;
    writeln!(out)?;
    Ok(out)
}
