//! PDF text extraction.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::document::Page;

const PAGE_BREAK: char = '\u{c}';

/// Reads PDF files into page-level text units.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

impl PdfLoader {
    /// Extracts the text of `path`, one [`Page`] per non-empty page.
    pub fn load(&self, path: &Path) -> Result<Vec<Page>> {
        let bytes = std::fs::read(path).with_context(|| format!("failed to read {:?}", path))?;
        let text = pdf_extract::extract_text_from_mem(&bytes)
            .with_context(|| format!("failed to extract text from {:?}", path))?;
        Ok(split_pages(&path.display().to_string(), &text))
    }
}

/// Splits extracted text on form feeds, dropping pages with no visible text.
pub fn split_pages(source: &str, text: &str) -> Vec<Page> {
    text.split(PAGE_BREAK)
        .enumerate()
        .filter(|(_, body)| !body.trim().is_empty())
        .map(|(idx, body)| Page::new(source, idx, body.trim()))
        .collect()
}

/// Pages loaded from a set of files plus the files that could not be read.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Pages from every file that loaded, in input order.
    pub pages: Vec<Page>,
    /// Files that failed, with the error message.
    pub failures: Vec<(PathBuf, String)>,
}

/// Loads each file independently; one unreadable file does not stop the rest.
pub fn load_all(loader: &PdfLoader, paths: &[PathBuf]) -> LoadReport {
    let mut report = LoadReport::default();
    for path in paths {
        match loader.load(path) {
            Ok(pages) => {
                info!(file = %path.display(), pages = pages.len(), "document loaded");
                report.pages.extend(pages);
            }
            Err(err) => {
                warn!(file = %path.display(), error = %format!("{err:#}"), "failed to load document");
                report.failures.push((path.clone(), format!("{err:#}")));
            }
        }
    }
    report
}
