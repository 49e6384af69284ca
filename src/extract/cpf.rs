use anyhow::Result;

use super::rules::{Cascade, Rule, TextSource, TierMatch, accept_any, trimmed};
use crate::masking::format_cpf_chars;

/// CPF cascade: label-anchored, strict punctuated, bare 11-digit run.
/// Check digits are deliberately not validated.
pub struct CpfExtractor {
    cascade: Cascade,
}

impl CpfExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            cascade: Cascade::new(vec![
                Rule::new(
                    "cpf_label",
                    TextSource::Raw,
                    r"(?i)CPF[:\s]*([\d.\- ]{11,20})",
                    has_eleven_digits,
                    last_eleven_formatted,
                )?,
                Rule::new(
                    "cpf_strict_format",
                    TextSource::Raw,
                    r"(\d{3}\.\d{3}\.\d{3}-\d{2})",
                    accept_any,
                    trimmed,
                )?,
                Rule::new(
                    "cpf_bare_digits",
                    TextSource::Raw,
                    r"(?:^|\D)(\d{11})(?:\D|$)",
                    accept_any,
                    last_eleven_formatted,
                )?,
            ]),
        })
    }

    pub fn extract(&self, raw: &str) -> Option<TierMatch> {
        self.cascade.first_match(raw, "")
    }
}

fn has_eleven_digits(captured: &str) -> bool {
    captured.chars().filter(char::is_ascii_digit).count() >= 11
}

fn last_eleven_formatted(captured: &str) -> String {
    let digits: Vec<char> = captured.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 11 {
        return String::new();
    }
    format_cpf_chars(&digits[digits.len() - 11..])
}
