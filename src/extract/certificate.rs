use anyhow::{Context, Result};
use regex::Regex;

/// A draft watermark repeats across the page; a single mention is not enough.
pub const DRAFT_MARKER: &str = "RASCUNHO";
pub const DRAFT_MIN_OCCURRENCES: usize = 4;

pub struct CertificateDetector {
    patterns: Vec<Regex>,
}

impl CertificateDetector {
    pub fn new() -> Result<Self> {
        let patterns = [
            r"(?i)\bASO\b",
            r"(?i)Atestado\s+de\s+Sa[úuÚU]de\s+Ocupacional",
        ]
        .into_iter()
        .map(|pattern| {
            Regex::new(pattern)
                .with_context(|| format!("failed to compile certificate regex: {pattern}"))
        })
        .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    pub fn is_certificate(&self, text: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(text))
    }
}

pub fn is_draft(text: &str) -> bool {
    text.to_uppercase().matches(DRAFT_MARKER).count() >= DRAFT_MIN_OCCURRENCES
}
