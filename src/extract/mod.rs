//! Field recovery from noisy OCR text.
//!
//! Every field is an ordered rule table (see [`rules`]); the first tier that
//! matches and validates wins. Absence surfaces as [`FieldValue::Unknown`].

mod certificate;
mod cpf;
mod date;
mod name;
mod normalize;
mod role;
mod rules;


use anyhow::Result;
use tracing::{debug, info, warn};

use crate::masking::CpfMasker;
use crate::model::{ExtractedDocument, FieldKind, FieldValue};

pub use certificate::{CertificateDetector, is_draft};
pub use normalize::{clean_ocr_text, collapse_whitespace};
pub use rules::TierMatch;

use cpf::CpfExtractor;
use date::DateExtractor;
use name::NameExtractor;
use role::RoleExtractor;

pub struct FieldExtractor {
    cpf: CpfExtractor,
    name: NameExtractor,
    date: DateExtractor,
    role: RoleExtractor,
    certificate: CertificateDetector,
    masker: CpfMasker,
}

impl FieldExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            cpf: CpfExtractor::new()?,
            name: NameExtractor::new()?,
            date: DateExtractor::new()?,
            role: RoleExtractor::new()?,
            certificate: CertificateDetector::new()?,
            masker: CpfMasker::new()?,
        })
    }

    /// Extraction without a second OCR pass.
    pub fn extract_text(&self, text: &str) -> ExtractedDocument {
        self.extract(text, || None)
    }

    /// Extracts all four fields. When the label and before-CPF name tiers
    /// both miss, `retry_ocr` is called at most once for a full-effort OCR
    /// text and the whole extraction restarts on it.
    pub fn extract<F>(&self, text: &str, mut retry_ocr: F) -> ExtractedDocument
    where
        F: FnMut() -> Option<String>,
    {
        let is_certificate = self.certificate.is_certificate(text);
        let mut raw = clean_ocr_text(text);
        let mut retried = false;

        loop {
            if is_draft(&raw) {
                info!("page carries a draft watermark, skipping field extraction");
                return draft_document(raw, is_certificate);
            }

            let normalized = collapse_whitespace(&raw);
            let cpf = self.cpf.extract(&raw);
            let mut name = self.name.extract_primary(&raw);

            if name.is_none() && !retried {
                retried = true;
                let retry_text = retry_ocr()
                    .map(|text| clean_ocr_text(&text))
                    .filter(|text| !text.trim().is_empty() && *text != raw);
                if let Some(retry_text) = retry_text {
                    debug!("name not found, re-extracting from full-effort OCR text");
                    raw = retry_text;
                    continue;
                }
            }

            if name.is_none() {
                name = self.name.extract_fallback(&raw);
            }

            let date = self.date.extract(&raw, &normalized);
            let role = self.role.extract(&raw, &normalized);

            self.log_tiers(&raw, &name, &cpf, &date, &role);

            return ExtractedDocument {
                name: field(FieldKind::Name, name),
                cpf: field(FieldKind::Cpf, cpf),
                certificate_date: field(FieldKind::Date, date),
                role: field(FieldKind::Role, role),
                is_certificate,
                raw_text: raw,
                normalized_text: normalized,
            };
        }
    }

    fn log_tiers(
        &self,
        raw: &str,
        name: &Option<TierMatch>,
        cpf: &Option<TierMatch>,
        date: &Option<TierMatch>,
        role: &Option<TierMatch>,
    ) {
        let tier = |found: &Option<TierMatch>| found.as_ref().map_or("none", |found| found.tier);

        match (name, cpf) {
            (_, None) => warn!("could not read the CPF on this page"),
            (None, Some(cpf)) => warn!(
                cpf = %self.masker.mask_cpf(&cpf.value),
                "CPF found but name not identified"
            ),
            (Some(_), Some(_)) => {}
        }
        if name.is_none() || cpf.is_none() {
            let preview: String = raw.chars().take(100).collect();
            debug!(text = %self.masker.mask_cpf_in_text(&preview), "OCR text preview");
        }

        debug!(
            name_tier = tier(name),
            cpf_tier = tier(cpf),
            date_tier = tier(date),
            role_tier = tier(role),
            "field extraction finished"
        );
    }
}

fn field(kind: FieldKind, found: Option<TierMatch>) -> FieldValue {
    match found {
        Some(found) => FieldValue::from_extracted(kind, &found.value),
        None => FieldValue::Unknown,
    }
}

fn draft_document(raw: String, is_certificate: bool) -> ExtractedDocument {
    ExtractedDocument {
        normalized_text: collapse_whitespace(&raw),
        raw_text: raw,
        name: FieldValue::Ignored,
        cpf: FieldValue::Ignored,
        certificate_date: FieldValue::Ignored,
        role: FieldValue::Ignored,
        is_certificate,
    }
}
