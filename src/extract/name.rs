use anyhow::{Context, Result};
use regex::Regex;

use super::rules::{Cascade, Rule, TextSource, TierMatch, trimmed};

/// Header words that never appear on a name line.
const HEADER_BLACKLIST: &[&str] = &[
    "CARGO",
    "FUNCAO",
    "FUNÇÃO",
    "SETOR",
    "DEPARTAMENTO",
    "ADMISSAO",
    "DEMISSAO",
    "ASO",
    "SAUDE",
    "OCUPACIONAL",
    "COODENADOR",
    "MÉDICO",
    "MEDICO",
    "EXAMINADOR",
];

/// Label words a careless capture can swallow instead of a name.
const LABEL_NOISE: &[&str] = &[
    "CPF",
    "RG",
    "DATA",
    "SEXO",
    "CARGO",
    "FUNCAO",
    "FUNÇÃO",
    "SETOR",
    "COMPLETO",
    "IDADE",
    "NASCIMENTO",
    "MATRICULA",
    "EMPRESA",
];

const POSITIONAL_LOOKBACK_LINES: usize = 3;
const SINGLE_WORD_MIN_CHARS: usize = 8;

pub struct NameExtractor {
    labelled: Cascade,
    before_cpf: Cascade,
    short_before_cpf: Cascade,
    cpf_line: Regex,
    cpf_formatted: Regex,
    cpf_label_with_digits: Regex,
    bare_digits: Regex,
    data_tail: Regex,
    name_line_strict: Regex,
    name_line: Regex,
    digit: Regex,
    status_tokens: Regex,
    multi_space: Regex,
    non_letters: Regex,
    cpf_token: Regex,
}

impl NameExtractor {
    pub fn new() -> Result<Self> {
        const CAPTURE: &str = r"([A-ZÀ-Ý][A-ZÀ-Ý \-\.]{3,150})";

        Ok(Self {
            labelled: Cascade::new(vec![
                Rule::new(
                    "name_label_nome_completo",
                    TextSource::Raw,
                    &format!(r"(?i)Nome\s*Completo[:\s\-]*{CAPTURE}"),
                    is_plausible_name,
                    trimmed,
                )?,
                Rule::new(
                    "name_label_completo_misread",
                    TextSource::Raw,
                    &format!(r"(?i)Nome\s*Comp[li1]eto[:\s\-]*{CAPTURE}"),
                    is_plausible_name,
                    trimmed,
                )?,
                Rule::new(
                    "name_label_nome",
                    TextSource::Raw,
                    &format!(r"(?i)Nome[:\s\-]*{CAPTURE}"),
                    is_plausible_name,
                    trimmed,
                )?,
                Rule::new(
                    "name_label_funcionario_same_line",
                    TextSource::Raw,
                    &format!(r"(?i)Funcion.*rio[:\s\-]*{CAPTURE}"),
                    is_plausible_name,
                    trimmed,
                )?,
                Rule::new(
                    "name_label_funcionario_next_line",
                    TextSource::Raw,
                    &format!(r"(?im)^[ \t]*Funcion.*rio[^\n]*\n\s*{CAPTURE}"),
                    is_plausible_name,
                    trimmed,
                )?,
            ]),
            before_cpf: Cascade::new(vec![Rule::new(
                "name_before_cpf",
                TextSource::Raw,
                r"([A-ZÀ-Ý][A-ZÀ-Ý \-]{5,150})\s+(?:CPF|C\.P\.F)",
                is_plausible_name,
                trimmed,
            )?]),
            short_before_cpf: Cascade::new(vec![Rule::new(
                "name_before_cpf_short",
                TextSource::Raw,
                r"([A-ZÀ-Ý][A-ZÀ-Ý \-]{3,150})\s+(?:CPF|C\.P\.F)",
                is_plausible_name,
                trimmed,
            )?]),
            cpf_line: Regex::new(r"(?i)CPF[:\s]*[\d\.]|\d{3}\.\d{3}\.\d{3}-\d{2}")
                .context("failed to compile CPF line regex")?,
            cpf_formatted: Regex::new(r"\d{3}\.\d{3}\.\d{3}-\d{2}")
                .context("failed to compile formatted CPF regex")?,
            cpf_label_with_digits: Regex::new(r"(?i)CPF[:\s]*[\d\.\-]+")
                .context("failed to compile CPF label regex")?,
            bare_digits: Regex::new(r"\d{11}").context("failed to compile digit run regex")?,
            data_tail: Regex::new(r"(?i)DATA.*").context("failed to compile DATA tail regex")?,
            name_line_strict: Regex::new(r"^[A-ZÀ-Ý][A-ZÀ-Ý \-\.]{3,}$")
                .context("failed to compile same-line name regex")?,
            name_line: Regex::new(r"^[A-ZÀ-Ý][A-ZÀ-Ý \-\.]+$")
                .context("failed to compile name line regex")?,
            digit: Regex::new(r"\d").context("failed to compile digit regex")?,
            status_tokens: Regex::new(r"(?i)\b(?:PCD|SIM|NAO|NÃO|APTO|INAPTO)\b")
                .context("failed to compile status token regex")?,
            multi_space: Regex::new(r"\s{2,}").context("failed to compile whitespace regex")?,
            non_letters: Regex::new(r"[^A-Za-zÀ-ÿ\s\-]")
                .context("failed to compile non-letter regex")?,
            cpf_token: Regex::new(r"(?i)\bCPF\b").context("failed to compile CPF token regex")?,
        })
    }

    /// Tiers that run before the one-shot OCR retry: labels, then the text
    /// immediately preceding a CPF label.
    pub fn extract_primary(&self, raw: &str) -> Option<TierMatch> {
        self.labelled
            .first_match(raw, "")
            .and_then(|found| self.cleaned(found))
            .or_else(|| {
                self.before_cpf
                    .first_match(raw, "")
                    .and_then(|found| self.cleaned(found))
            })
    }

    /// Tiers that run after the retry budget is spent.
    pub fn extract_fallback(&self, raw: &str) -> Option<TierMatch> {
        self.positional(raw)
            .and_then(|found| self.cleaned(found))
            .or_else(|| {
                self.short_before_cpf
                    .first_match(raw, "")
                    .and_then(|found| self.cleaned(found))
            })
    }

    /// Looks at the first line carrying a CPF: the name may share that line,
    /// or sit on one of the three lines above it.
    fn positional(&self, raw: &str) -> Option<TierMatch> {
        let lines: Vec<&str> = raw.lines().collect();
        let cpf_index = lines.iter().position(|line| self.cpf_line.is_match(line))?;

        let same_line = self.cpf_label_with_digits.replace_all(lines[cpf_index], "");
        let same_line = self.cpf_formatted.replace_all(&same_line, "");
        let same_line = self.bare_digits.replace_all(&same_line, "");
        let same_line = self.data_tail.replace_all(&same_line, "");
        let same_line = same_line.trim();
        if same_line.chars().count() > 5 && self.name_line_strict.is_match(same_line) {
            return Some(TierMatch {
                tier: "name_positional_same_line",
                value: same_line.to_string(),
            });
        }

        for offset in 1..=POSITIONAL_LOOKBACK_LINES {
            let Some(index) = cpf_index.checked_sub(offset) else {
                break;
            };
            let candidate = self.data_tail.replace_all(lines[index].trim(), "");
            let candidate = candidate.trim();

            let upper = candidate.to_uppercase();
            if HEADER_BLACKLIST.iter().any(|word| upper.contains(word)) {
                continue;
            }
            if candidate.chars().count() <= 3
                || self.digit.is_match(candidate)
                || !self.name_line.is_match(candidate)
            {
                continue;
            }
            if !candidate.contains(' ') && candidate.chars().count() < SINGLE_WORD_MIN_CHARS {
                continue;
            }

            return Some(TierMatch {
                tier: "name_positional_above",
                value: candidate.to_string(),
            });
        }

        None
    }

    /// Strips aptitude/disability markers, stray punctuation and a leftover
    /// CPF token. An empty result rejects the tier.
    fn cleaned(&self, found: TierMatch) -> Option<TierMatch> {
        let value = self.status_tokens.replace_all(&found.value, "");
        let value = self.multi_space.replace_all(&value, " ");
        let value = self.non_letters.replace_all(value.trim(), "");
        let value = self.cpf_token.replace_all(value.trim(), "");
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

fn is_plausible_name(captured: &str) -> bool {
    let candidate = captured.trim();
    if candidate.chars().count() <= 2 {
        return false;
    }

    let first_word = candidate
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase();
    !LABEL_NOISE.contains(&first_word.as_str())
}
