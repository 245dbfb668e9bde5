//! Transcription stage: page image → normalised text.
//!
//! Each page is looked up in the recognition cache first; only a miss runs
//! the recogniser, and the fresh result is recorded so a later stage can
//! reuse it. Hit or miss, the raw text always goes through
//! [`normalize`] before it is returned.

use crate::cache::{cache_key, OcrCache};
use crate::config::Script;
use crate::error::{PageError, ReaderError};
use crate::normalize::normalize;
use crate::ocr::Recognizer;
use crate::output::PageText;
use crate::progress::ProgressCallback;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Transcribe one page. Never fails: a recognition error yields empty text
/// and a [`PageError::RecognitionFailed`].
pub fn transcribe_page(
    page_num: usize,
    image: &Path,
    cache: &mut OcrCache,
    recognizer: &dyn Recognizer,
    script: Script,
) -> PageText {
    let start = Instant::now();
    let key = cache_key(image);

    let mut page = if let Some(raw) = cache.lookup(&key) {
        debug!("Page {}: cache hit", page_num);
        let mut page = PageText::new(page_num, normalize(raw, script));
        page.from_cache = true;
        page
    } else {
        match recognizer.recognize(image) {
            Ok(raw) => {
                let text = normalize(&raw, script);
                cache.record(key, raw);
                PageText::new(page_num, text)
            }
            Err(e) => {
                warn!("Page {}: {}", page_num, e);
                let mut page = PageText::new(page_num, String::new());
                page.error = Some(PageError::RecognitionFailed {
                    page: page_num,
                    detail: e.to_string(),
                });
                page
            }
        }
    };
    page.duration_ms = start.elapsed().as_millis() as u64;
    page
}

/// Transcribe pages in order, reporting progress.
///
/// `cancel` is checked before each page. Entries recorded before the
/// interrupt stay in `cache`.
pub fn transcribe_pages(
    pages: &[(usize, PathBuf)],
    cache: &mut OcrCache,
    recognizer: &dyn Recognizer,
    script: Script,
    cancel: &CancellationToken,
    progress: Option<&ProgressCallback>,
) -> Result<Vec<PageText>, ReaderError> {
    let total = pages.len();
    let mut results = Vec::with_capacity(total);

    for (page_num, image) in pages {
        if cancel.is_cancelled() {
            warn!("Transcription interrupted after {}/{} pages", results.len(), total);
            return Err(ReaderError::Interrupted {
                processed: results.len(),
                total,
            });
        }
        if let Some(cb) = progress {
            cb.on_page_start(*page_num, total);
        }
        let result = transcribe_page(*page_num, image, cache, recognizer, script);
        if let Some(cb) = progress {
            match &result.error {
                None => cb.on_page_complete(*page_num, total, result.text.len()),
                Some(e) => cb.on_page_error(*page_num, total, &e.to_string()),
            }
        }
        results.push(result);
    }
    Ok(results)
}
