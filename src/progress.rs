//! Progress-callback trait for capture and per-page processing events.
//!
//! Pass a [`ProgressCallback`] to [`crate::capture::capture_session`] and the
//! entry points in [`crate::extract`] to receive events as pages are captured,
//! transcribed or summarised. The CLI forwards them to an `indicatif` bar;
//! library callers can forward them anywhere.
//!
//! # Example
//!
//! ```rust
//! use reader2md::ReaderProgressCallback;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     captured: AtomicUsize,
//! }
//!
//! impl ReaderProgressCallback for CountingCallback {
//!     fn on_page_captured(&self, ordinal: usize, max_pages: usize) {
//!         self.captured.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Captured page {}/{}", ordinal, max_pages);
//!     }
//! }
//!
//! let cb: reader2md::ProgressCallback = Arc::new(CountingCallback {
//!     captured: AtomicUsize::new(0),
//! });
//! cb.on_page_captured(1, 1000);
//! ```

use std::sync::Arc;

/// Called as a session is captured and its pages are processed.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ReaderProgressCallback: Send + Sync {
    /// Called once the setup wait is over, before the first capture.
    ///
    /// # Arguments
    /// * `max_pages`: upper bound on pages for this session
    fn on_capture_start(&self, max_pages: usize) {
        let _ = max_pages;
    }

    /// Called after a page image has been stored.
    ///
    /// # Arguments
    /// * `ordinal`  : 1-indexed page number
    /// * `max_pages`: upper bound on pages for this session
    fn on_page_captured(&self, ordinal: usize, max_pages: usize) {
        let _ = (ordinal, max_pages);
    }

    /// Called when the detector decides the document has ended.
    ///
    /// # Arguments
    /// * `last_page`: ordinal of the last retained page
    /// * `signal`   : human-readable detection signal
    fn on_end_detected(&self, last_page: usize, signal: &str) {
        let _ = (last_page, signal);
    }

    /// Called once after the capture loop terminates normally.
    fn on_capture_complete(&self, captured: usize) {
        let _ = captured;
    }

    /// Called once before pages are transcribed or summarised.
    fn on_processing_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before a page is processed.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page produced text.
    ///
    /// # Arguments
    /// * `text_len`: byte length of the produced text
    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        let _ = (page_num, total_pages, text_len);
    }

    /// Called when a page failed; its text falls back to a placeholder.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after all pages have been attempted.
    fn on_processing_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ReaderProgressCallback for NoopProgressCallback {}

/// Shared handle passed to the capture loop and processing stages.
pub type ProgressCallback = Arc<dyn ReaderProgressCallback>;
