use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "asointake",
    version,
    about = "Occupational health certificate (ASO) intake: OCR, field recovery and outcome classification"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Process(ProcessArgs),
    Inventory(InventoryArgs),
    Extract(ExtractArgs),
    Status(StatusArgs),
}

impl Commands {
    /// Directory receiving the JSONL execution log, for commands that keep one.
    pub fn execution_log_dir(&self) -> Option<PathBuf> {
        match self {
            Self::Process(args) => Some(args.output_root.join("logs")),
            Self::Inventory(_) | Self::Extract(_) | Self::Status(_) => None,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    #[arg(long, env = "ASO_INTAKE_DIR", default_value = "intake")]
    pub intake_dir: PathBuf,

    #[arg(long, env = "ASO_OUTPUT_ROOT", default_value = "ProcessoASO")]
    pub output_root: PathBuf,

    /// Work site used when the file name carries none.
    #[arg(long, env = "ASO_WORK_SITE", default_value = "SEM_OBRA")]
    pub work_site: String,

    #[arg(long, env = "ASO_OCR_LANG", default_value = "por+eng")]
    pub ocr_lang: String,

    #[arg(long, env = "TESSERACT_PATH", default_value = "tesseract")]
    pub tesseract_bin: PathBuf,

    /// Directory holding pdfinfo, pdftoppm and pdfseparate. Falls back to PATH.
    #[arg(long, env = "POPPLER_PATH")]
    pub poppler_dir: Option<PathBuf>,

    #[arg(long, env = "ASO_DPI", default_value_t = 300)]
    pub dpi: u32,

    #[arg(long, env = "ASO_LOCK_MAX_AGE_MINUTES", default_value_t = 30)]
    pub lock_max_age_minutes: u64,

    #[arg(long, env = "ASO_AUDIT_DB")]
    pub audit_db_path: Option<PathBuf>,

    #[arg(long)]
    pub max_pages_per_doc: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long, env = "ASO_INTAKE_DIR", default_value = "intake")]
    pub intake_dir: PathBuf,

    #[arg(long, env = "ASO_OUTPUT_ROOT", default_value = "ProcessoASO")]
    pub output_root: PathBuf,

    #[arg(long, env = "ASO_WORK_SITE", default_value = "SEM_OBRA")]
    pub work_site: String,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Plain-text OCR output to run the field cascade against.
    #[arg(long)]
    pub text_file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, env = "ASO_OUTPUT_ROOT", default_value = "ProcessoASO")]
    pub output_root: PathBuf,

    #[arg(long, env = "ASO_AUDIT_DB")]
    pub audit_db_path: Option<PathBuf>,

    #[arg(long, default_value_t = 5)]
    pub limit: usize,
}
