use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use regex::Regex;

/// Turns PDF pages into images the OCR engine can read.
pub trait PageRasterizer {
    fn page_count(&self, pdf_path: &Path) -> Result<usize>;

    fn render_page(
        &self,
        pdf_path: &Path,
        page_number: usize,
        scratch_dir: &Path,
    ) -> Result<PathBuf>;
}

/// poppler-utils command line tools, optionally from a fixed directory.
pub struct PopplerTools {
    bin_dir: Option<PathBuf>,
    dpi: u32,
    pages_regex: Regex,
}

impl PopplerTools {
    pub fn new(bin_dir: Option<&Path>, dpi: u32) -> Result<Self> {
        Ok(Self {
            bin_dir: bin_dir.map(Path::to_path_buf),
            dpi,
            pages_regex: Regex::new(r"(?m)^Pages:\s+(\d+)")
                .context("failed to compile pdfinfo pages regex")?,
        })
    }

    fn program(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Copies one page of `pdf_path` into a standalone PDF at `destination`.
    pub fn extract_page(
        &self,
        pdf_path: &Path,
        page_number: usize,
        destination: &Path,
    ) -> Result<()> {
        let output = Command::new(self.program("pdfseparate"))
            .arg("-f")
            .arg(page_number.to_string())
            .arg("-l")
            .arg(page_number.to_string())
            .arg(pdf_path)
            .arg(destination)
            .output()
            .with_context(|| format!("failed to execute pdfseparate for {}", pdf_path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pdfseparate returned non-zero exit status for {} page {}: {}",
                pdf_path.display(),
                page_number,
                stderr.trim()
            );
        }

        if !destination.exists() {
            bail!(
                "pdfseparate did not produce expected file for {} page {}",
                pdf_path.display(),
                page_number
            );
        }

        Ok(())
    }
}

impl PageRasterizer for PopplerTools {
    fn page_count(&self, pdf_path: &Path) -> Result<usize> {
        let output = Command::new(self.program("pdfinfo"))
            .arg(pdf_path)
            .output()
            .with_context(|| format!("failed to execute pdfinfo for {}", pdf_path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pdfinfo returned non-zero exit status for {}: {}",
                pdf_path.display(),
                stderr.trim()
            );
        }

        let info = String::from_utf8_lossy(&output.stdout);
        let pages = self
            .pages_regex
            .captures(&info)
            .and_then(|caps| caps.get(1))
            .with_context(|| format!("pdfinfo reported no page count for {}", pdf_path.display()))?
            .as_str()
            .parse::<usize>()
            .with_context(|| format!("invalid page count for {}", pdf_path.display()))?;

        Ok(pages)
    }

    fn render_page(
        &self,
        pdf_path: &Path,
        page_number: usize,
        scratch_dir: &Path,
    ) -> Result<PathBuf> {
        let pdf_stem = pdf_path
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("pdf");
        let safe_stem = pdf_stem
            .chars()
            .map(|character| {
                if character.is_ascii_alphanumeric() {
                    character
                } else {
                    '_'
                }
            })
            .collect::<String>();

        let output_root = scratch_dir.join(format!("{safe_stem}_p{page_number}"));
        let png_path = PathBuf::from(format!("{}.png", output_root.display()));

        let output = Command::new(self.program("pdftoppm"))
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg(page_number.to_string())
            .arg("-l")
            .arg(page_number.to_string())
            .arg("-singlefile")
            .arg("-png")
            .arg(pdf_path)
            .arg(&output_root)
            .output()
            .with_context(|| format!("failed to execute pdftoppm for {}", pdf_path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pdftoppm returned non-zero exit status for {} page {}: {}",
                pdf_path.display(),
                page_number,
                stderr.trim()
            );
        }

        if !png_path.exists() {
            bail!(
                "pdftoppm did not produce expected image for {} page {}",
                pdf_path.display(),
                page_number
            );
        }

        Ok(png_path)
    }
}
