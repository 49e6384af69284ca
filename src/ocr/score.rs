use anyhow::{Context, Result};
use regex::Regex;

/// A first-pass score at or above this value skips the fallback passes.
pub const FAST_PATH_THRESHOLD: u32 = 5;

struct Signal {
    name: &'static str,
    weight: u32,
    pattern: Regex,
}

/// Additive confidence that an OCR pass read something useful.
pub struct ConfidenceScorer {
    signals: Vec<Signal>,
}

impl ConfidenceScorer {
    pub fn new() -> Result<Self> {
        let table: [(&'static str, u32, &str); 5] = [
            ("cpf_label", 3, r"(?i)CPF"),
            ("cpf_formatted", 3, r"\d{3}\.\d{3}\.\d{3}-\d{2}"),
            ("eleven_digits", 2, r"\d{11}"),
            ("certificate_keyword", 2, r"(?i)\bASO\b|SA[UÚ]DE\s+OCUPACIONAL"),
            (
                "employee_keyword",
                1,
                r"(?i)FUNCION[AÁ]RIO|COLABORADOR|EMPREGADO|NOME",
            ),
        ];

        let signals = table
            .into_iter()
            .map(|(name, weight, pattern)| {
                Ok(Signal {
                    name,
                    weight,
                    pattern: Regex::new(pattern)
                        .with_context(|| format!("failed to compile {name} score regex"))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { signals })
    }

    pub fn score(&self, text: &str) -> u32 {
        self.signals
            .iter()
            .filter(|signal| signal.pattern.is_match(text))
            .map(|signal| signal.weight)
            .sum()
    }

    /// Names of the signals present in `text`, for diagnostics.
    pub fn matched_signals(&self, text: &str) -> Vec<&'static str> {
        self.signals
            .iter()
            .filter(|signal| signal.pattern.is_match(text))
            .map(|signal| signal.name)
            .collect()
    }
}
