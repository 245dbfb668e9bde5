//! Error types for the reader2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ReaderError`]: **Fatal**: the session cannot proceed at all
//!   (screen capture unavailable, page turn failed, cache file unreadable,
//!   provider or upload credentials missing). Returned as `Err(ReaderError)`
//!   from the top-level entry points in [`crate::extract`].
//!
//! * [`PageError`]: **Non-fatal**: recognition or summarisation of a single
//!   page failed. Stored inside [`crate::output::PageText`]; the page text
//!   falls back to an empty string or a placeholder and the run continues.
//!
//! A session that captured nothing is *not* an error: it comes back as an
//! empty page list and callers treat it as "nothing to do".

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the reader2md library.
#[derive(Debug, Error)]
pub enum ReaderError {
    // ── Capture errors ────────────────────────────────────────────────────
    /// The image source could not produce a screenshot.
    #[error("Screen capture failed for page {page}: {detail}\nOn macOS, grant Screen Recording permission to your terminal.")]
    CaptureFailed { page: usize, detail: String },

    /// The page-turn signal could not be delivered.
    #[error("Could not turn the page after page {page}: {detail}")]
    AdvanceFailed { page: usize, detail: String },

    /// A captured page image could not be written to the staging directory.
    #[error("Failed to write page image '{path}': {detail}")]
    ImageWriteFailed { path: PathBuf, detail: String },

    /// The staging directory could not be created or listed.
    #[error("Staging directory '{path}' is unusable: {source}")]
    StagingDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The user interrupted the capture loop.
    #[error("Capture interrupted by user after {captured} page(s); captured images were left in place")]
    Cancelled { captured: usize },

    /// The user interrupted transcription or summarisation.
    #[error("Interrupted by user after {processed} of {total} page(s) were processed")]
    Interrupted { processed: usize, total: usize },

    // ── Cache errors ──────────────────────────────────────────────────────
    /// The recognition cache file exists but could not be read or parsed.
    #[error("Failed to read recognition cache '{path}': {detail}")]
    CacheReadFailed { path: PathBuf, detail: String },

    /// The recognition cache could not be persisted.
    #[error("Failed to write recognition cache '{path}': {detail}")]
    CacheWriteFailed { path: PathBuf, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── External boundary errors ──────────────────────────────────────────
    /// The summarisation provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A credential or token file required by the upload boundary is missing.
    #[error("Credentials file not found: '{path}'\n{hint}")]
    CredentialsMissing { path: PathBuf, hint: String },

    /// The document upload request failed.
    #[error("Document upload failed: {0}")]
    UploadFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A non-fatal error for a single page.
///
/// Stored alongside [`crate::output::PageText`] when a page fails.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The recognition engine failed on this page.
    #[error("Page {page}: recognition failed: {detail}")]
    RecognitionFailed { page: usize, detail: String },

    /// The summary call failed after retries.
    #[error("Page {page}: summary failed after {retries} retries: {detail}")]
    SummaryFailed {
        page: usize,
        retries: u8,
        detail: String,
    },
}
