use anyhow::{Context, Result};
use regex::Regex;

use super::rules::{Cascade, Rule, TextSource, TierMatch, accept_any, trimmed};

/// Boilerplate fragments that the label patterns capture on some templates.
const FALSE_POSITIVES: &[&str] = &[
    "QUE EXERCE OU IRAEXERCER",
    "QUE EXERCE OU IRÁ EXERCER",
    "PULMONAR COMPLETA",
    "EXAME",
];

/// Capture stops at the next recognised label, at a character outside the
/// role alphabet, or at end of text.
const ROLE_TAIL: &str =
    r"(?:\s*\b(?:Setor|Cargo|GHE|Riscos|CPF|Data)\b|[^A-ZÀ-Ý0-9 \-\._]|$)";
const ROLE_CAPTURE: &str = r"([A-ZÀ-Ý0-9][A-ZÀ-Ý0-9 \-\._]{3,150}?)";

pub struct RoleExtractor {
    cascade: Cascade,
    rg_token: Regex,
    disallowed: Regex,
    multi_space: Regex,
}

impl RoleExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            cascade: Cascade::new(vec![
                Rule::new(
                    "role_funcao",
                    TextSource::Normalized,
                    &format!(r"(?i)Fun[cç5g][aãõo0eéê]{{1,3}}o[:/\s\-]*{ROLE_CAPTURE}{ROLE_TAIL}"),
                    accept_any,
                    trimmed,
                )?,
                Rule::new(
                    "role_cargo",
                    TextSource::Normalized,
                    &format!(r"(?i)Cargo[:/\s\-]*{ROLE_CAPTURE}{ROLE_TAIL}"),
                    accept_any,
                    trimmed,
                )?,
                Rule::new(
                    "role_ghe",
                    TextSource::Normalized,
                    &format!(r"(?i)GHE[:/\s\-]*([0-9]{{1,3}}\s*\-\s*[A-ZÀ-Ý0-9 \-]{{3,150}}?){ROLE_TAIL}"),
                    accept_any,
                    ghe_prefixed,
                )?,
                Rule::new(
                    "role_setor",
                    TextSource::Normalized,
                    &format!(r"(?i)Setor[:/\s\-]*{ROLE_CAPTURE}{ROLE_TAIL}"),
                    accept_any,
                    ghe_prefixed,
                )?,
            ]),
            rg_token: Regex::new(r"(?i)\bRG\b").context("failed to compile RG token regex")?,
            disallowed: Regex::new(r"[^A-Za-zÀ-ÿ0-9\-\s\./]")
                .context("failed to compile role character regex")?,
            multi_space: Regex::new(r"\s{2,}").context("failed to compile whitespace regex")?,
        })
    }

    /// First matching tier, cleaned. A denylisted capture blanks the field
    /// instead of falling through to a lower tier.
    pub fn extract(&self, raw: &str, normalized: &str) -> Option<TierMatch> {
        let found = self.cascade.first_match(raw, normalized)?;

        let upper = found.value.to_uppercase();
        if FALSE_POSITIVES.iter().any(|phrase| upper.contains(phrase)) {
            return None;
        }

        let value = self.rg_token.replace_all(&found.value, "");
        let value = self.disallowed.replace_all(value.trim(), "");
        let value = self.multi_space.replace_all(value.trim(), " ");
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        Some(TierMatch {
            tier: found.tier,
            value: value.to_string(),
        })
    }
}

fn ghe_prefixed(captured: &str) -> String {
    format!("GHE {}", captured.trim())
}
