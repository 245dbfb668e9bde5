//! Result types returned by the processing stages.

use crate::error::PageError;
use serde::{Deserialize, Serialize};

/// Text produced for one page by transcription or summarisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    /// 1-indexed page ordinal.
    pub page_num: usize,
    /// Normalised text (transcription) or summary bullets. Empty or a
    /// placeholder when `error` is set.
    pub text: String,
    /// True when the raw text came from the recognition cache.
    pub from_cache: bool,
    /// Tokens sent to the model (summaries only).
    pub input_tokens: usize,
    /// Tokens produced by the model (summaries only).
    pub output_tokens: usize,
    pub duration_ms: u64,
    /// Retries before success or final failure (summaries only).
    pub retries: u8,
    pub error: Option<PageError>,
}

impl PageText {
    pub(crate) fn new(page_num: usize, text: String) -> Self {
        Self {
            page_num,
            text,
            from_cache: false,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            retries: 0,
            error: None,
        }
    }
}

/// Assembled document plus per-page detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub markdown: String,
    pub pages: Vec<PageText>,
    pub stats: ExtractionStats,
}

/// Summary counters for a processing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    /// Pages that produced text without error.
    pub processed_pages: usize,
    pub failed_pages: usize,
    /// Pages whose text was empty and were left out of the document.
    pub empty_pages: usize,
    /// Pages served from the recognition cache.
    pub cache_hits: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

impl ExtractionStats {
    pub(crate) fn from_pages(pages: &[PageText], total_duration_ms: u64) -> Self {
        Self {
            total_pages: pages.len(),
            processed_pages: pages
                .iter()
                .filter(|p| p.error.is_none() && !p.text.trim().is_empty())
                .count(),
            failed_pages: pages.iter().filter(|p| p.error.is_some()).count(),
            empty_pages: pages
                .iter()
                .filter(|p| p.error.is_none() && p.text.trim().is_empty())
                .count(),
            cache_hits: pages.iter().filter(|p| p.from_cache).count(),
            total_input_tokens: pages.iter().map(|p| p.input_tokens as u64).sum(),
            total_output_tokens: pages.iter().map(|p| p.output_tokens as u64).sum(),
            total_duration_ms,
        }
    }
}
