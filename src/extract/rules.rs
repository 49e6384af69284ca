use anyhow::{Context, Result};
use regex::Regex;

/// Which rendition of the page text a rule is matched against.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TextSource {
    /// Line-preserving OCR text.
    Raw,
    /// Whitespace-collapsed single line.
    Normalized,
}

/// One tier of a field cascade: the first match of `pattern`, group `group`,
/// must pass `validate`; `transform` then produces the field value.
pub struct Rule {
    pub tier: &'static str,
    pub source: TextSource,
    pub pattern: Regex,
    pub group: usize,
    pub validate: fn(&str) -> bool,
    pub transform: fn(&str) -> String,
}

impl Rule {
    pub fn new(
        tier: &'static str,
        source: TextSource,
        pattern: &str,
        validate: fn(&str) -> bool,
        transform: fn(&str) -> String,
    ) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .with_context(|| format!("failed to compile {tier} rule regex"))?;
        Ok(Self {
            tier,
            source,
            pattern,
            group: 1,
            validate,
            transform,
        })
    }

    pub fn apply(&self, raw: &str, normalized: &str) -> Option<String> {
        let text = match self.source {
            TextSource::Raw => raw,
            TextSource::Normalized => normalized,
        };
        let captured = self.pattern.captures(text)?.get(self.group)?.as_str();
        if !(self.validate)(captured) {
            return None;
        }
        let value = (self.transform)(captured);
        if value.trim().is_empty() {
            return None;
        }
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierMatch {
    pub tier: &'static str,
    pub value: String,
}

/// An ordered list of rules; earlier rules win.
pub struct Cascade {
    rules: Vec<Rule>,
}

impl Cascade {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn first_match(&self, raw: &str, normalized: &str) -> Option<TierMatch> {
        self.rules.iter().find_map(|rule| {
            rule.apply(raw, normalized).map(|value| TierMatch {
                tier: rule.tier,
                value,
            })
        })
    }
}

pub fn accept_any(_: &str) -> bool {
    true
}

pub fn trimmed(value: &str) -> String {
    value.trim().to_string()
}
