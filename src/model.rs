use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const NAME_UNKNOWN: &str = "Desconhecido";
pub const NAME_DRAFT: &str = "RASCUNHO";
pub const CPF_UNKNOWN: &str = "CPF_Desconhecido";
pub const CPF_DRAFT: &str = "Ignorar";
pub const DATE_UNKNOWN: &str = "Desconhecida";
pub const ROLE_UNKNOWN: &str = "Desconhecida";

/// Which extracted field a value belongs to. Each field has its own pair of
/// reserved sentinel strings.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Name,
    Cpf,
    Date,
    Role,
}

impl FieldKind {
    pub fn unknown_sentinel(self) -> &'static str {
        match self {
            Self::Name => NAME_UNKNOWN,
            Self::Cpf => CPF_UNKNOWN,
            Self::Date => DATE_UNKNOWN,
            Self::Role => ROLE_UNKNOWN,
        }
    }

    pub fn ignored_sentinel(self) -> &'static str {
        match self {
            Self::Name => NAME_DRAFT,
            Self::Cpf => CPF_DRAFT,
            Self::Date | Self::Role => "",
        }
    }
}

/// An extracted field. `Ignored` is only produced by the draft short-circuit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldValue {
    Known(String),
    Unknown,
    Ignored,
}

impl FieldValue {
    /// Builds a value from raw extractor output. Empty output and the reserved
    /// sentinel strings never survive as `Known`.
    pub fn from_extracted(kind: FieldKind, raw: &str) -> Self {
        let value = raw.trim();
        if value.is_empty() || value == kind.unknown_sentinel() {
            return Self::Unknown;
        }
        if !kind.ignored_sentinel().is_empty() && value == kind.ignored_sentinel() {
            return Self::Ignored;
        }
        Self::Known(value.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored)
    }

    /// Legacy string form consumed by manifests, reports and audit logs.
    pub fn legacy(&self, kind: FieldKind) -> &str {
        match self {
            Self::Known(value) => value,
            Self::Unknown => kind.unknown_sentinel(),
            Self::Ignored => kind.ignored_sentinel(),
        }
    }
}

/// One OCR'd page after field extraction.
#[derive(Clone, Debug)]
pub struct ExtractedDocument {
    pub raw_text: String,
    pub normalized_text: String,
    pub name: FieldValue,
    pub cpf: FieldValue,
    pub certificate_date: FieldValue,
    pub role: FieldValue,
    pub is_certificate: bool,
}

impl ExtractedDocument {
    pub fn name_str(&self) -> &str {
        self.name.legacy(FieldKind::Name)
    }

    pub fn cpf_str(&self) -> &str {
        self.cpf.legacy(FieldKind::Cpf)
    }

    pub fn date_str(&self) -> &str {
        self.certificate_date.legacy(FieldKind::Date)
    }

    pub fn role_str(&self) -> &str {
        self.role.legacy(FieldKind::Role)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Error,
    SkippedDuplicate,
    SkippedDraft,
    SkippedNonAso,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
            Self::SkippedDuplicate => "SKIPPED_DUPLICATE",
            Self::SkippedDraft => "SKIPPED_DRAFT",
            Self::SkippedNonAso => "SKIPPED_NON_ASO",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified page. Built once, never mutated afterwards.
#[derive(Clone, Debug)]
pub struct OutcomeRecord {
    pub outcome: Outcome,
    pub source_document: ExtractedDocument,
    pub destination_path: Option<PathBuf>,
    pub message: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Consistent,
    Inconsistent,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Consistent => "CONSISTENT",
            Self::Inconsistent => "INCONSISTENT",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub source_file: String,
    pub page: usize,
    pub filename: String,
    pub cpf: String,
    pub outcome: Outcome,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrFailureEntry {
    pub arquivo: String,
    pub nome: String,
    pub cpf: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub arquivo: String,
    pub erro: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub execution_id: String,
    pub generated_at: String,
    pub run_status: RunStatus,
    pub items: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadQueue {
    pub manifest_version: u32,
    pub execution_id: String,
    pub generated_at: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeEntry {
    pub filename: String,
    pub work_site: String,
    pub sha256: String,
    pub duplicate_of: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub pdf_count: usize,
    pub pdfs: Vec<IntakeEntry>,
}
