use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;

use crate::aggregate::RunStats;
use crate::masking::CpfMasker;
use crate::util::{ensure_directory, write_json_pretty};

#[derive(Debug, Clone, Serialize)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

/// Writes `relatorio_<ts>.json` and `resumo_execucao_<ts>.md` for a finished
/// run. Everything written passes through the CPF masker first.
pub struct ReportGenerator {
    report_dir: PathBuf,
    masker: CpfMasker,
}

impl ReportGenerator {
    pub fn new(report_dir: &Path) -> Result<Self> {
        Ok(Self {
            report_dir: report_dir.to_path_buf(),
            masker: CpfMasker::new()?,
        })
    }

    pub fn save_report(&self, stats: &RunStats, now: DateTime<Local>) -> Result<ReportPaths> {
        ensure_directory(&self.report_dir)?;
        let timestamp = now.format("%Y%m%d_%H%M%S").to_string();

        let value = serde_json::to_value(stats).context("failed to serialize run stats")?;
        let safe_value = self.masker.mask_json(&value);

        let json_path = self.report_dir.join(format!("relatorio_{timestamp}.json"));
        write_json_pretty(&json_path, &safe_value)?;
        info!(path = %json_path.display(), "wrote run report");

        let markdown_path = self
            .report_dir
            .join(format!("resumo_execucao_{timestamp}.md"));
        let markdown = self.render_markdown(stats, now)?;
        fs::write(&markdown_path, markdown).with_context(|| {
            format!("failed to write summary: {}", markdown_path.display())
        })?;
        info!(path = %markdown_path.display(), "wrote run summary");

        Ok(ReportPaths {
            json: json_path,
            markdown: markdown_path,
        })
    }

    pub fn render_markdown(&self, stats: &RunStats, now: DateTime<Local>) -> Result<String> {
        let mask = |text: &str| self.masker.mask_cpf_in_text(text);
        let mut out = String::new();

        writeln!(out, "# Resumo de Execução - ASO")?;
        writeln!(out, "**Execution ID**: {}", stats.execution_id)?;
        writeln!(out, "**Data**: {}", now.format("%d/%m/%Y %H:%M:%S"))?;
        writeln!(out, "**Tempo Total**: {}", stats.tempo_total)?;
        writeln!(out, "**Status**: {}", stats.run_status.as_str())?;
        writeln!(out)?;

        writeln!(out, "## Totais")?;
        let totals = [
            ("Total Detectado", stats.total_detected),
            ("Total Processado", stats.total_processed),
            ("Sucessos", stats.success),
            ("Erros", stats.error),
            ("Skipped Duplicate", stats.skipped_duplicate),
            ("Skipped Draft", stats.skipped_draft),
            ("Skipped Non-ASO", stats.skipped_non_aso),
        ];
        for (label, value) in totals {
            writeln!(out, "- **{label}**: {value}")?;
        }

        writeln!(out, "\n## Detalhes de Erros")?;
        if stats.erros.is_empty() {
            writeln!(out, "Nenhum erro registrado.")?;
        }
        for entry in &stats.erros {
            writeln!(out, "- **{}**: {}", mask(&entry.arquivo), mask(&entry.erro))?;
        }

        writeln!(out, "\n## Falhas OCR (nao salvos)")?;
        if stats.ocr_failures.is_empty() {
            writeln!(out, "Nenhuma falha de OCR registrada.")?;
        }
        for entry in &stats.ocr_failures {
            writeln!(
                out,
                "- **{}**: nome={}, cpf={}",
                mask(&entry.arquivo),
                mask(&entry.nome),
                mask(&entry.cpf)
            )?;
        }

        writeln!(out, "\n## Itens Skipped")?;
        if stats.skipped_items.is_empty() {
            writeln!(out, "Nenhum item skipped.")?;
        }
        for item in &stats.skipped_items {
            writeln!(out, "- {}", mask(item))?;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::aggregate::RunAggregator;
    use crate::model::ErrorEntry;

    fn finished_stats() -> RunStats {
        let started = Utc
            .with_ymd_and_hms(2025, 2, 1, 8, 0, 0)
            .single()
            .expect("valid timestamp");
        let mut aggregator = RunAggregator::new("run-20250201T080000Z", started).expect("aggregator");
        aggregator.page_detected();
        let mut stats = aggregator.finalize_at(started).clone();
        stats.erros.push(ErrorEntry {
            arquivo: "lote 12345678901.pdf".to_string(),
            erro: "falha no CPF 123.456.789-01".to_string(),
        });
        stats.skipped_items.push("lote.pdf (pag 2) - SKIPPED_DRAFT".to_string());
        stats
    }

    #[test]
    fn save_report_writes_masked_json_and_markdown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let generator = ReportGenerator::new(&dir.path().join("relatorios")).expect("generator");
        let now = Local
            .with_ymd_and_hms(2025, 2, 1, 9, 30, 0)
            .single()
            .expect("valid timestamp");

        let paths = generator
            .save_report(&finished_stats(), now)
            .expect("save report");

        assert!(paths.json.ends_with("relatorio_20250201_093000.json"));
        assert!(paths.markdown.ends_with("resumo_execucao_20250201_093000.md"));

        let json = fs::read_to_string(&paths.json).expect("read json");
        assert!(!json.contains("12345678901"));
        assert!(!json.contains("123.456.789-01"));
        assert!(json.contains("run-20250201T080000Z"));

        let markdown = fs::read_to_string(&paths.markdown).expect("read markdown");
        assert!(markdown.contains("**Total Detectado**: 1"));
        assert!(markdown.contains("Nenhuma falha de OCR registrada."));
        assert!(markdown.contains("SKIPPED_DRAFT"));
        assert!(!markdown.contains("123.456.789-01"));
        assert!(!markdown.contains("12345678901"));
    }
}
