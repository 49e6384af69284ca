use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{info, warn};

use crate::cli::InventoryArgs;
use crate::masking::CpfMasker;
use crate::model::{IntakeEntry, IntakeInventoryManifest};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

pub fn run(args: InventoryArgs) -> Result<()> {
    let manifest = build_manifest(&args.intake_dir, &args.work_site)?;

    if args.dry_run {
        info!(
            pdf_count = manifest.pdf_count,
            source = %manifest.source_directory,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args.manifest_path.unwrap_or_else(|| {
        args.output_root
            .join("manifests")
            .join("intake_inventory.json")
    });

    write_json_pretty(&manifest_path, &manifest)?;
    let masker = CpfMasker::new()?;
    info!(path = %masker.mask_path(&manifest_path), "wrote inventory manifest");
    info!(pdf_count = manifest.pdf_count, "inventory completed");

    Ok(())
}

pub fn build_manifest(intake_dir: &Path, default_site: &str) -> Result<IntakeInventoryManifest> {
    let sites = WorkSiteParser::new()?;
    let masker = CpfMasker::new()?;
    let pdf_paths = discover_pdfs(intake_dir)?;

    if pdf_paths.is_empty() {
        bail!("no PDFs found in {}", masker.mask_path(intake_dir));
    }

    let mut first_seen: HashMap<String, String> = HashMap::new();
    let mut pdfs = Vec::with_capacity(pdf_paths.len());
    for path in pdf_paths {
        let sha256 = sha256_file(&path)?;
        let work_site = file_name_of(&path)
            .ok()
            .and_then(|filename| sites.parse(&filename))
            .unwrap_or_else(|| default_site.to_string());
        let filename = path
            .file_name()
            .map(|name| masker.mask_cpf_in_text(&name.to_string_lossy()))
            .unwrap_or_default();

        let duplicate_of = first_seen.get(&sha256).cloned();
        if let Some(original) = &duplicate_of {
            warn!(file = %filename, original = %original, "identical attachment already in intake");
        } else {
            first_seen.insert(sha256.clone(), filename.clone());
        }

        pdfs.push(IntakeEntry {
            filename,
            work_site,
            sha256,
            duplicate_of,
        });
    }

    Ok(IntakeInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directory: masker.mask_path(intake_dir),
        pdf_count: pdfs.len(),
        pdfs,
    })
}

/// Work site code carried in attachment names such as
/// `ASO ADMISSIONAL - 1234.pdf`.
pub struct WorkSiteParser {
    pattern: Regex,
}

impl WorkSiteParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(r"(?i)ASO\s+ADMISSIONAL\s*-\s*([A-Za-z0-9]+)")
                .context("failed to compile work site regex")?,
        })
    }

    pub fn parse(&self, filename: &str) -> Option<String> {
        self.pattern
            .captures(filename)
            .and_then(|caps| caps.get(1))
            .map(|value| value.as_str().to_string())
    }
}

/// PDFs directly inside `intake_dir`, oldest first, then by name.
pub fn discover_pdfs(intake_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pdfs = Vec::new();

    let entries = fs::read_dir(intake_dir)
        .with_context(|| format!("failed to read {}", intake_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", intake_dir.display()))?;
        let path = entry.path();
        let metadata = entry
            .metadata()
            .with_context(|| format!("failed to inspect file: {}", path.display()))?;

        if !metadata.is_file() {
            continue;
        }

        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        if is_pdf {
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            pdfs.push((modified, path));
        }
    }

    pdfs.sort();
    Ok(pdfs.into_iter().map(|(_, path)| path).collect())
}

pub fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))
}
