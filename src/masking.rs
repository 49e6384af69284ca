//! Tax-ID masking applied before any CPF reaches a log, manifest or report.

use std::path::Path;

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use serde_json::Value;

pub const DEFAULT_KEEP_LAST: usize = 3;
pub const DEFAULT_MASK_CHAR: char = '*';

pub struct CpfMasker {
    formatted: Regex,
    bare_digits: Regex,
    keep_last: usize,
    mask_char: char,
}

impl CpfMasker {
    pub fn new() -> Result<Self> {
        Self::with_options(DEFAULT_KEEP_LAST, DEFAULT_MASK_CHAR)
    }

    pub fn with_options(keep_last: usize, mask_char: char) -> Result<Self> {
        Ok(Self {
            formatted: Regex::new(r"\b\d{3}\.\d{3}\.\d{3}-\d{2}\b")
                .context("failed to compile formatted CPF regex")?,
            bare_digits: Regex::new(r"\d{11}").context("failed to compile bare CPF regex")?,
            keep_last: keep_last.min(11),
            mask_char,
        })
    }

    /// Masks a single CPF value. Anything that is not exactly 11 digits once
    /// punctuation is dropped is returned unchanged (sentinels included).
    pub fn mask_cpf(&self, value: &str) -> String {
        let digits: Vec<char> = value.chars().filter(char::is_ascii_digit).collect();
        if digits.len() != 11 {
            return value.to_string();
        }

        let hidden = 11 - self.keep_last;
        let masked: Vec<char> = digits
            .iter()
            .enumerate()
            .map(|(index, digit)| if index < hidden { self.mask_char } else { *digit })
            .collect();

        format_cpf_chars(&masked)
    }

    pub fn mask_cpf_in_text(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let text = self
            .formatted
            .replace_all(text, |caps: &Captures| self.mask_cpf(&caps[0]));
        self.bare_digits
            .replace_all(&text, |caps: &Captures| self.mask_cpf(&caps[0]))
            .into_owned()
    }

    /// Display form of a path with any CPF in it masked. Intake file names
    /// often carry the employee's CPF.
    pub fn mask_path(&self, path: &Path) -> String {
        self.mask_cpf_in_text(&path.display().to_string())
    }

    pub fn mask_json(&self, value: &Value) -> Value {
        match value {
            Value::String(text) => Value::String(self.mask_cpf_in_text(text)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.mask_json(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, v)| (key.clone(), self.mask_json(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// `DDD.DDD.DDD-DD` from exactly eleven characters.
pub fn format_cpf_chars(chars: &[char]) -> String {
    let part = |range: std::ops::Range<usize>| chars[range].iter().collect::<String>();
    format!(
        "{}.{}.{}-{}",
        part(0..3),
        part(3..6),
        part(6..9),
        part(9..11)
    )
}
