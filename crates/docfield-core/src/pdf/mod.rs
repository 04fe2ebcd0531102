//! Page text extraction: positioned words per page.

mod extractor;
mod text_state;

pub use extractor::PdfWordExtractor;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PdfError;
use crate::layout::ExtractedWord;

/// Type of document content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Contains an extractable text layer.
    Text,
    /// No usable text layer (scanned pages; OCR is not supported).
    Scanned,
    /// Empty or unreadable.
    Empty,
}

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Source of positioned words, one page at a time.
///
/// Implementations must return coordinates with a top-left origin and
/// y increasing downward.
pub trait PageSource {
    /// Number of pages in the document.
    fn page_count(&self) -> u32;

    /// Words of a page (1-indexed).
    fn page_words(&self, page: u32) -> Result<Vec<ExtractedWord>>;
}

/// Words of a document, decoded up front and keyed by page number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageWords {
    pages: BTreeMap<u32, Vec<ExtractedWord>>,
    page_count: u32,
}

impl PageWords {
    /// Create an empty set of pages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the words of a page.
    pub fn with_page(mut self, page: u32, words: Vec<ExtractedWord>) -> Self {
        self.insert(page, words);
        self
    }

    /// Add (or replace) the words of a page.
    pub fn insert(&mut self, page: u32, words: Vec<ExtractedWord>) {
        self.page_count = self.page_count.max(page);
        self.pages.insert(page, words);
    }

    /// Decode every page of a source; pages that fail are skipped and logged.
    pub fn collect<S: PageSource + ?Sized>(source: &S) -> (Self, Vec<String>) {
        let mut pages = Self::new();
        let mut warnings = Vec::new();

        for page in 1..=source.page_count() {
            match source.page_words(page) {
                Ok(words) => pages.insert(page, words),
                Err(e) => {
                    warn!("Skipping page {}: {}", page, e);
                    warnings.push(format!("Page {} skipped: {}", page, e));
                }
            }
        }

        pages.page_count = pages.page_count.max(source.page_count());
        (pages, warnings)
    }

    /// Words of a page, if it was decoded.
    pub fn words(&self, page: u32) -> Option<&[ExtractedWord]> {
        self.pages.get(&page).map(Vec::as_slice)
    }

    /// Total number of words across all decoded pages.
    pub fn word_count(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }
}

impl PageSource for PageWords {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn page_words(&self, page: u32) -> Result<Vec<ExtractedWord>> {
        if page == 0 || page > self.page_count {
            return Err(PdfError::InvalidPage(page));
        }
        Ok(self.pages.get(&page).cloned().unwrap_or_default())
    }
}
