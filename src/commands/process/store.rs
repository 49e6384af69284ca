use std::path::Path;

use anyhow::Result;

use crate::classify::{PageStore, SourcePage};
use crate::ocr::PopplerTools;
use crate::util::ensure_directory;

/// Saves accepted pages as single-page PDFs cut from the source attachment.
pub struct PdfPageStore<'a> {
    tools: &'a PopplerTools,
}

impl<'a> PdfPageStore<'a> {
    pub fn new(tools: &'a PopplerTools) -> Self {
        Self { tools }
    }
}

impl PageStore for PdfPageStore<'_> {
    fn exists(&self, destination: &Path) -> bool {
        destination.exists()
    }

    fn save_page(&self, page: &SourcePage, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            ensure_directory(parent)?;
        }
        self.tools
            .extract_page(&page.pdf_path, page.page_number, destination)
    }
}
