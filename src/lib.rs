//! # reader2md
//!
//! Turn a book open in an e-reader application into a Markdown document by
//! screenshotting it page by page.
//!
//! ## Why this crate?
//!
//! Reader applications expose no page count and no text. The only way to
//! read a book out is to look at the screen, turn the page, and look again,
//! and the hard part is knowing when to stop: the last page is recognised
//! only because turning it no longer changes what is on screen.
//!
//! ## Pipeline Overview
//!
//! ```text
//! reader window
//!  │
//!  ├─ 1. Focus    bring the window forward, find its bounds (best-effort)
//!  ├─ 2. Capture  screenshot → page_NNNN.png, turn page, settle, repeat
//!  ├─ 3. Detect   stop when a capture repeats the previous page
//!  │              (image hash distance, or OCR text similarity + cache)
//!  ├─ 4. Process  OCR → normalise  |  vision-model page summaries
//!  ├─ 5. Assemble titled Markdown with optional page markers
//!  └─ 6. Publish  write to disk, or upload to Google Docs
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reader2md::device::{focus::AppleScriptFocus, keys::KeystrokeAdvancer, screen::ScreenSource};
//! use reader2md::{capture_session, transcribe_session, CaptureConfig, CaptureDevices,
//!     MeanHasher, PageMarker, TesseractRecognizer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CaptureConfig::builder().max_pages(300).build()?;
//!     let recognizer = TesseractRecognizer::new(config.language.clone());
//!     let mut source = ScreenSource::new();
//!     let mut advancer = KeystrokeAdvancer::new(config.direction);
//!     let mut focus = AppleScriptFocus::new(config.app_name.clone());
//!
//!     let devices = CaptureDevices {
//!         source: &mut source,
//!         advancer: &mut advancer,
//!         focus: Some(&mut focus),
//!         recognizer: &recognizer,
//!         fingerprinter: &MeanHasher,
//!     };
//!     let cancel = CancellationToken::new();
//!     let session = capture_session(config, devices, &cancel, None).await?;
//!     let output =
//!         transcribe_session(&session, &recognizer, "My Book", PageMarker::Heading, &cancel, None)?;
//!     println!("{}", output.markdown);
//!     session.cleanup();
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `reader2md` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod capture;
pub mod config;
pub mod detect;
pub mod device;
pub mod document;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod ocr;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::OcrCache;
pub use capture::{capture_session, CaptureDevices, Step};
pub use config::{
    CaptureConfig, CaptureConfigBuilder, DetectionStrategy, PageDirection, PageMarker, Script,
};
pub use detect::{DetectionSignal, EndDetector, Fingerprint, Fingerprinter, MeanHasher, Verdict};
pub use document::Document;
pub use error::{PageError, ReaderError};
pub use extract::{assemble_from_dir, summarize_images, transcribe_session, write_document};
pub use normalize::normalize;
pub use ocr::{OcrError, Recognizer, TesseractRecognizer};
pub use output::{ExtractionOutput, ExtractionStats, PageText};
pub use pipeline::summarize::{SummaryConfig, Summarizer};
pub use pipeline::upload::{DocumentUploader, GoogleDocsUploader};
pub use progress::{NoopProgressCallback, ProgressCallback, ReaderProgressCallback};
pub use session::{CaptureSession, Page, Termination};
