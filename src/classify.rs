//! Per-page outcome decision. Rules are evaluated in a fixed order and the
//! first one that applies wins.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;

use crate::model::{ExtractedDocument, Outcome, OutcomeRecord};

pub const UNKNOWN_EMPLOYEE_FILENAME: &str = "FuncionarioDesconhecido";

/// One page of a source PDF.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourcePage {
    pub pdf_path: PathBuf,
    pub page_number: usize,
}

impl SourcePage {
    pub fn display_name(&self) -> String {
        let file = self
            .pdf_path
            .file_name()
            .map(|value| value.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{file} (pag {})", self.page_number)
    }
}

/// Destination side of the classifier: existence check plus page export.
pub trait PageStore {
    fn exists(&self, destination: &Path) -> bool;

    fn save_page(&self, page: &SourcePage, destination: &Path) -> Result<()>;
}

pub struct Classifier {
    unsafe_chars: Regex,
}

impl Classifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            unsafe_chars: Regex::new(r"[^\w\s\-]")
                .context("failed to compile filename sanitizer regex")?,
        })
    }

    pub fn sanitize_name(&self, name: &str) -> String {
        let cleaned = self.unsafe_chars.replace_all(name, "");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            UNKNOWN_EMPLOYEE_FILENAME.to_string()
        } else {
            cleaned.to_string()
        }
    }

    /// `"{name} - {cpf}.pdf"`. The CPF here is deliberately unmasked: the
    /// file name is the key the upload step matches employees on.
    pub fn destination_filename(&self, document: &ExtractedDocument) -> String {
        format!(
            "{} - {}.pdf",
            self.sanitize_name(document.name_str()),
            document.cpf_str()
        )
    }

    pub fn classify(
        &self,
        document: ExtractedDocument,
        destination_dir: &Path,
        store: &dyn PageStore,
        page: &SourcePage,
    ) -> Result<OutcomeRecord> {
        if document.name.is_unknown() || document.cpf.is_unknown() {
            return Ok(record(
                Outcome::Error,
                document,
                None,
                "OCR failure: name/cpf",
            ));
        }

        if document.name.is_ignored() || document.cpf.is_ignored() {
            return Ok(record(
                Outcome::SkippedDraft,
                document,
                None,
                "draft watermark",
            ));
        }

        if !document.is_certificate {
            return Ok(record(
                Outcome::SkippedNonAso,
                document,
                None,
                "not an occupational health certificate",
            ));
        }

        let destination = destination_dir.join(self.destination_filename(&document));
        if store.exists(&destination) {
            return Ok(record(
                Outcome::SkippedDuplicate,
                document,
                Some(destination),
                "destination already exists",
            ));
        }

        store.save_page(page, &destination).with_context(|| {
            format!("failed to save {} to destination", page.display_name())
        })?;

        Ok(record(
            Outcome::Success,
            document,
            Some(destination),
            "saved",
        ))
    }
}

fn record(
    outcome: Outcome,
    source_document: ExtractedDocument,
    destination_path: Option<PathBuf>,
    message: &str,
) -> OutcomeRecord {
    OutcomeRecord {
        outcome,
        source_document,
        destination_path,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::model::FieldValue;

    /// Writes the page reference as the file body so tests can tell writes apart.
    struct DirectoryStore;

    impl PageStore for DirectoryStore {
        fn exists(&self, destination: &Path) -> bool {
            destination.exists()
        }

        fn save_page(&self, page: &SourcePage, destination: &Path) -> Result<()> {
            fs::write(destination, page.display_name())?;
            Ok(())
        }
    }

    fn document(name: FieldValue, cpf: FieldValue, is_certificate: bool) -> ExtractedDocument {
        ExtractedDocument {
            raw_text: String::new(),
            normalized_text: String::new(),
            name,
            cpf,
            certificate_date: FieldValue::Unknown,
            role: FieldValue::Unknown,
            is_certificate,
        }
    }

    fn valid_document() -> ExtractedDocument {
        document(
            FieldValue::Known("JOAO DA SILVA".to_string()),
            FieldValue::Known("123.456.789-01".to_string()),
            true,
        )
    }

    fn page(number: usize) -> SourcePage {
        SourcePage {
            pdf_path: PathBuf::from("/intake/ASO ADMISSIONAL - OBRA1.pdf"),
            page_number: number,
        }
    }

    #[test]
    fn second_identical_page_is_a_duplicate_and_first_file_is_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let classifier = Classifier::new().expect("classifier");

        let first = classifier
            .classify(valid_document(), dir.path(), &DirectoryStore, &page(1))
            .expect("first classify");
        assert_eq!(first.outcome, Outcome::Success);
        let destination = first.destination_path.clone().expect("destination");
        assert_eq!(
            destination,
            dir.path().join("JOAO DA SILVA - 123.456.789-01.pdf")
        );
        let written = fs::read_to_string(&destination).expect("read first write");

        let second = classifier
            .classify(valid_document(), dir.path(), &DirectoryStore, &page(2))
            .expect("second classify");
        assert_eq!(second.outcome, Outcome::SkippedDuplicate);
        assert_eq!(second.destination_path.as_ref(), Some(&destination));
        assert_eq!(
            fs::read_to_string(&destination).expect("read after duplicate"),
            written
        );
    }

    #[test]
    fn missing_cpf_is_an_error_even_on_a_draft() {
        let dir = tempfile::tempdir().expect("tempdir");
        let classifier = Classifier::new().expect("classifier");

        let record = classifier
            .classify(
                document(FieldValue::Ignored, FieldValue::Unknown, true),
                dir.path(),
                &DirectoryStore,
                &page(1),
            )
            .expect("classify");
        assert_eq!(record.outcome, Outcome::Error);
        assert!(record.destination_path.is_none());
    }

    #[test]
    fn draft_is_skipped_before_certificate_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let classifier = Classifier::new().expect("classifier");

        let record = classifier
            .classify(
                document(FieldValue::Ignored, FieldValue::Ignored, false),
                dir.path(),
                &DirectoryStore,
                &page(1),
            )
            .expect("classify");
        assert_eq!(record.outcome, Outcome::SkippedDraft);
    }

    #[test]
    fn non_certificate_never_reaches_the_duplicate_gate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let classifier = Classifier::new().expect("classifier");
        fs::write(dir.path().join("JOAO DA SILVA - 123.456.789-01.pdf"), b"x")
            .expect("seed existing file");

        let mut not_certificate = valid_document();
        not_certificate.is_certificate = false;
        let record = classifier
            .classify(not_certificate, dir.path(), &DirectoryStore, &page(1))
            .expect("classify");
        assert_eq!(record.outcome, Outcome::SkippedNonAso);
        assert!(record.destination_path.is_none());
    }

    #[test]
    fn sanitize_name_drops_punctuation_and_falls_back() {
        let classifier = Classifier::new().expect("classifier");
        assert_eq!(classifier.sanitize_name("JOSÉ D'ÁVILA"), "JOSÉ DÁVILA");
        assert_eq!(classifier.sanitize_name("..."), UNKNOWN_EMPLOYEE_FILENAME);
    }
}
