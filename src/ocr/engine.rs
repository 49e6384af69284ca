use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};

/// Tesseract page segmentation modes used by the OCR passes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PageSegMode {
    /// Fully automatic layout analysis; the default pass.
    Auto,
    /// A single column of text of variable sizes.
    SingleColumn,
    /// A single uniform block of text.
    SingleBlock,
}

impl PageSegMode {
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Auto => "3",
            Self::SingleColumn => "4",
            Self::SingleBlock => "6",
        }
    }
}

pub trait OcrEngine {
    fn recognize(&self, image: &Path, mode: PageSegMode) -> Result<String>;
}

pub struct TesseractCli {
    program: PathBuf,
    lang: String,
}

impl TesseractCli {
    /// `program` may point at the binary itself or at its install directory.
    pub fn new(program: &Path, lang: &str) -> Self {
        let program = if program.is_dir() {
            program.join(if cfg!(windows) {
                "tesseract.exe"
            } else {
                "tesseract"
            })
        } else {
            program.to_path_buf()
        };

        Self {
            program,
            lang: lang.to_string(),
        }
    }

    pub fn version(&self) -> Option<String> {
        let output = Command::new(&self.program).arg("--version").output().ok()?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let source = if stdout.trim().is_empty() {
            stderr.trim()
        } else {
            stdout.trim()
        };

        source
            .lines()
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| line.to_string())
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, image: &Path, mode: PageSegMode) -> Result<String> {
        let output = Command::new(&self.program)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .arg("--psm")
            .arg(mode.as_arg())
            .output()
            .with_context(|| format!("failed to execute tesseract for {}", image.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "tesseract returned non-zero exit status for {} (psm {}): {}",
                image.display(),
                mode.as_arg(),
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).replace('\u{0000}', ""))
    }
}
