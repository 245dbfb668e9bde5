//! Capture session: the pages captured so far and the state that owns them.
//!
//! A [`CaptureSession`] is created and mutated only by the capture loop
//! ([`crate::capture`]). Once the loop returns, callers get read access to
//! pages and the recognition cache; the only mutation left to them is
//! [`CaptureSession::cleanup`], which deletes the page images.

use crate::cache::{cache_key, OcrCache};
use crate::config::CaptureConfig;
use crate::detect::DetectionSignal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One captured page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based, contiguous position in capture order.
    pub ordinal: usize,
    /// Where the page image is stored.
    pub image_path: PathBuf,
    /// Raw recognised text, when recognition ran during capture.
    pub text: Option<String>,
}

/// Why the capture loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Termination {
    /// The capture after page `last_page` repeated it and was discarded.
    EndDetected {
        last_page: usize,
        #[serde(skip)]
        signal: Option<DetectionSignal>,
    },
    /// `max_pages` pages were captured.
    MaxPages,
}

/// Ordered pages, the recognition cache, and the config that produced them.
#[derive(Debug)]
pub struct CaptureSession {
    config: CaptureConfig,
    pages: Vec<Page>,
    cache: OcrCache,
    termination: Option<Termination>,
}

impl CaptureSession {
    pub(crate) fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            pages: Vec::new(),
            cache: OcrCache::new(),
            termination: None,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn cache(&self) -> &OcrCache {
        &self.cache
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// True when nothing was captured; callers treat this as "nothing to do".
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Retained page image paths in ordinal order.
    pub fn image_paths(&self) -> Vec<PathBuf> {
        self.pages.iter().map(|p| p.image_path.clone()).collect()
    }

    /// Ordinal the next captured page will receive.
    pub(crate) fn next_ordinal(&self) -> usize {
        self.pages.len() + 1
    }

    pub(crate) fn push(&mut self, page: Page) {
        debug_assert_eq!(page.ordinal, self.next_ordinal());
        self.pages.push(page);
    }

    /// Record raw text for the most recent page, in the page and the cache.
    pub(crate) fn record_text(&mut self, text: String) {
        if let Some(page) = self.pages.last_mut() {
            self.cache.record(cache_key(&page.image_path), text.clone());
            page.text = Some(text);
        }
    }

    /// Remove the most recent page: its image, its entry, its cache key.
    pub(crate) fn discard_last(&mut self) -> Option<Page> {
        let page = self.pages.pop()?;
        remove_image(&page.image_path);
        self.cache.discard(&cache_key(&page.image_path));
        debug!("Discarded duplicate page {}", page.ordinal);
        Some(page)
    }

    pub(crate) fn finish(&mut self, termination: Termination) {
        self.termination = Some(termination);
    }

    /// Delete every retained page image. Safe to call repeatedly and when
    /// some images are already gone. Returns the number of files removed.
    pub fn cleanup(&self) -> usize {
        let removed = self
            .pages
            .iter()
            .filter(|p| remove_image(&p.image_path))
            .count();
        info!("Temporary files cleaned up ({} images)", removed);
        removed
    }
}

/// Delete `path`, treating "already gone" as success. Returns true when a
/// file was actually removed.
pub(crate) fn remove_image(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Could not delete {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session_with_files(dir: &Path, n: usize) -> CaptureSession {
        let config = CaptureConfig::builder().output_dir(dir).build().unwrap();
        let mut session = CaptureSession::new(config);
        for ordinal in 1..=n {
            let path = session.config().page_path(ordinal);
            std::fs::write(&path, b"png").unwrap();
            session.push(Page {
                ordinal,
                image_path: path,
                text: None,
            });
        }
        session
    }

    #[test]
    fn cleanup_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let session = session_with_files(dir.path(), 3);
        std::fs::remove_file(session.config().page_path(2)).unwrap();

        assert_eq!(session.cleanup(), 2);
        assert_eq!(session.cleanup(), 0);
        assert!(!session.config().page_path(1).exists());
    }

    #[test]
    fn discard_last_removes_image_and_cache_entry() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with_files(dir.path(), 2);
        session.record_text("duplicate".into());
        let key = cache_key(&session.config().page_path(2));
        assert_eq!(session.cache().lookup(&key), Some("duplicate"));

        let page = session.discard_last().unwrap();
        assert_eq!(page.ordinal, 2);
        assert!(!page.image_path.exists());
        assert_eq!(session.cache().lookup(&key), None);
        assert_eq!(session.next_ordinal(), 2);
    }
}
