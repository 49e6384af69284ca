use anyhow::Result;

use super::rules::{Cascade, Rule, TextSource, TierMatch, accept_any, trimmed};

pub struct DateExtractor {
    cascade: Cascade,
}

impl DateExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            cascade: Cascade::new(vec![
                Rule::new(
                    "date_labelled",
                    TextSource::Normalized,
                    r"(?i)DATA\s*(?:do\s*ASO|do\s*exame|ASO|exame)?[:\s\-]*([0-3]?\d/[0-1]?\d/\d{4})",
                    accept_any,
                    trimmed,
                )?,
                Rule::new(
                    "date_first_seen",
                    TextSource::Raw,
                    r"([0-3]?\d/[0-1]?\d/\d{4})",
                    accept_any,
                    trimmed,
                )?,
            ]),
        })
    }

    pub fn extract(&self, raw: &str, normalized: &str) -> Option<TierMatch> {
        self.cascade.first_match(raw, normalized)
    }
}
