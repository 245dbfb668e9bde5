//! Configuration types for a capture session.
//!
//! Every knob that shapes a capture run lives in [`CaptureConfig`], built via
//! [`CaptureConfigBuilder`]. The session keeps a copy of the config that
//! produced it, so a finished run can always be explained after the fact.

use crate::error::ReaderError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Name of the recognition cache file written next to the captured images.
pub const CACHE_FILE_NAME: &str = "ocr_results.json";

/// Configuration for one capture session.
///
/// Built via [`CaptureConfig::builder()`] or using
/// [`CaptureConfig::default()`].
///
/// # Example
/// ```rust
/// use reader2md::{CaptureConfig, DetectionStrategy};
///
/// let config = CaptureConfig::builder()
///     .output_dir("staging")
///     .max_pages(300)
///     .detection(DetectionStrategy::ImageHash { max_distance: 1 })
///     .build()
///     .unwrap();
/// assert_eq!(config.max_pages, 300);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Staging directory for page images and the recognition cache. Default: `output`.
    pub output_dir: PathBuf,

    /// Settle delay after each page-turn signal. Default: 1.5 s.
    ///
    /// The reader animates the page turn; capturing too early records the
    /// transition frame instead of the new page.
    pub settle_delay: Duration,

    /// Upper bound on captured pages. Default: 1000.
    pub max_pages: usize,

    /// Which signal decides that the document has ended. Default: text similarity.
    pub detection: DetectionStrategy,

    /// When false the detector is skipped and the loop runs to `max_pages`. Default: true.
    pub end_detection: bool,

    /// Try to focus the reader window and capture only its bounds. Default: true.
    pub auto_focus: bool,

    /// Application whose window is focused and captured. Default: `Kindle`.
    pub app_name: String,

    /// Which key turns the page. Default: [`PageDirection::Right`].
    pub direction: PageDirection,

    /// Recognition language tag passed to the OCR engine. Default: `jpn`.
    pub language: String,

    /// Wait after a successful focus before the first capture. Default: 2 s.
    pub focus_wait: Duration,

    /// Wait when focusing failed and the user must bring the window forward. Default: 5 s.
    pub fallback_wait: Duration,

    /// Wait when auto-focus is disabled. Default: 3 s.
    pub manual_wait: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            settle_delay: Duration::from_millis(1500),
            max_pages: 1000,
            detection: DetectionStrategy::default(),
            end_detection: true,
            auto_focus: true,
            app_name: "Kindle".to_string(),
            direction: PageDirection::default(),
            language: "jpn".to_string(),
            focus_wait: Duration::from_secs(2),
            fallback_wait: Duration::from_secs(5),
            manual_wait: Duration::from_secs(3),
        }
    }
}

impl CaptureConfig {
    /// Create a new builder for `CaptureConfig`.
    pub fn builder() -> CaptureConfigBuilder {
        CaptureConfigBuilder {
            config: Self::default(),
            invalid_delay: None,
        }
    }

    /// Path of the recognition cache file inside the staging directory.
    pub fn cache_path(&self) -> PathBuf {
        self.output_dir.join(CACHE_FILE_NAME)
    }

    /// Path of the image for the given 1-based page ordinal.
    pub fn page_path(&self, ordinal: usize) -> PathBuf {
        self.output_dir.join(page_file_name(ordinal))
    }

    /// Script family implied by [`Self::language`].
    pub fn script(&self) -> Script {
        Script::from_language(&self.language)
    }

    /// True when the text-similarity detector is active for this session.
    pub fn recognizes_during_capture(&self) -> bool {
        self.end_detection && matches!(self.detection, DetectionStrategy::TextSimilarity { .. })
    }
}

/// File name of the image for a 1-based page ordinal: `page_0001.png`.
pub fn page_file_name(ordinal: usize) -> String {
    format!("page_{ordinal:04}.png")
}

/// Builder for [`CaptureConfig`].
#[derive(Debug)]
pub struct CaptureConfigBuilder {
    config: CaptureConfig,
    invalid_delay: Option<f64>,
}

impl CaptureConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    /// Settle delay in (fractional) seconds, as taken on the command line.
    ///
    /// Negative or non-finite values are rejected by [`Self::build`].
    pub fn settle_delay_secs(mut self, secs: f64) -> Self {
        match Duration::try_from_secs_f64(secs) {
            Ok(d) => self.config.settle_delay = d,
            Err(_) => self.invalid_delay = Some(secs),
        }
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn detection(mut self, strategy: DetectionStrategy) -> Self {
        self.config.detection = strategy;
        self
    }

    pub fn end_detection(mut self, enabled: bool) -> Self {
        self.config.end_detection = enabled;
        self
    }

    pub fn auto_focus(mut self, v: bool) -> Self {
        self.config.auto_focus = v;
        self
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = name.into();
        self
    }

    pub fn direction(mut self, direction: PageDirection) -> Self {
        self.config.direction = direction;
        self
    }

    pub fn language(mut self, tag: impl Into<String>) -> Self {
        self.config.language = tag.into();
        self
    }

    /// Override all three setup waits at once (tests set them to zero).
    pub fn setup_waits(mut self, focus: Duration, fallback: Duration, manual: Duration) -> Self {
        self.config.focus_wait = focus;
        self.config.fallback_wait = fallback;
        self.config.manual_wait = manual;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CaptureConfig, ReaderError> {
        if let Some(secs) = self.invalid_delay {
            return Err(ReaderError::InvalidConfig(format!(
                "Delay must be a non-negative number of seconds, got {secs}"
            )));
        }
        let c = &self.config;
        if c.max_pages == 0 {
            return Err(ReaderError::InvalidConfig("max-pages must be ≥ 1".into()));
        }
        match c.detection {
            DetectionStrategy::ImageHash { max_distance } if max_distance > 10 => {
                return Err(ReaderError::InvalidConfig(format!(
                    "Hash threshold must be 0–10, got {max_distance}"
                )));
            }
            DetectionStrategy::TextSimilarity { min_ratio, .. }
                if !(min_ratio > 0.0 && min_ratio <= 1.0) =>
            {
                return Err(ReaderError::InvalidConfig(format!(
                    "Similarity ratio must be in (0, 1], got {min_ratio}"
                )));
            }
            _ => {}
        }
        if c.language.trim().is_empty() {
            return Err(ReaderError::InvalidConfig(
                "Recognition language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The signal used to decide that the reader has stopped advancing.
///
/// Exactly one strategy is active per session; the two are never combined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DetectionStrategy {
    /// Hamming distance between average hashes of consecutive captures.
    /// Terminal when `distance <= max_distance` (0 = exact hash match).
    ImageHash { max_distance: u32 },

    /// Character-level similarity between consecutive recognised texts.
    /// Terminal when `ratio > min_ratio`. Texts of `min_chars` characters or
    /// fewer carry too little signal and are never compared.
    TextSimilarity { min_ratio: f64, min_chars: usize },
}

impl DetectionStrategy {
    /// Default hash threshold: a couple of flipped bits still count as "same page".
    pub const DEFAULT_HASH_DISTANCE: u32 = 2;
    /// Default similarity cut-off for the text strategy.
    pub const DEFAULT_MIN_RATIO: f64 = 0.95;
    /// Texts at or below this many characters are exempt from comparison.
    pub const DEFAULT_MIN_CHARS: usize = 50;

    pub fn image_hash() -> Self {
        DetectionStrategy::ImageHash {
            max_distance: Self::DEFAULT_HASH_DISTANCE,
        }
    }

    pub fn text_similarity() -> Self {
        DetectionStrategy::TextSimilarity {
            min_ratio: Self::DEFAULT_MIN_RATIO,
            min_chars: Self::DEFAULT_MIN_CHARS,
        }
    }
}

impl Default for DetectionStrategy {
    fn default() -> Self {
        Self::text_similarity()
    }
}

/// Which arrow key advances the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageDirection {
    /// Left arrow: right-to-left books (vertical Japanese text).
    Left,
    /// Right arrow: left-to-right books. (default)
    #[default]
    Right,
}

/// Script family of the recognised text, which decides how spaces and
/// line-wrap breaks are treated by [`crate::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Script {
    /// No inter-word spacing (Japanese, Chinese): spaces are recognition noise.
    Gapless,
    /// Spaces separate words and must be kept.
    Spaced,
}

impl Script {
    /// Classify a Tesseract-style language tag (`jpn`, `jpn_vert`, `chi_sim`, `eng`, `jpn+eng`…).
    ///
    /// A combined tag is gapless when its first component is.
    pub fn from_language(tag: &str) -> Self {
        let primary = tag.split('+').next().unwrap_or("").trim().to_ascii_lowercase();
        if primary.starts_with("jpn") || primary.starts_with("chi_") {
            Script::Gapless
        } else {
            Script::Spaced
        }
    }
}

/// How page boundaries are marked in the assembled document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageMarker {
    /// Pages follow each other with no marker.
    None,
    /// Horizontal rule plus a `## Page N` heading. (default)
    #[default]
    Heading,
    /// Horizontal rule plus a `<!-- Page: N -->` comment (summary documents).
    Comment,
}

impl PageMarker {
    /// Render the marker for a 1-based page ordinal, or `None` when unmarked.
    pub fn render(&self, ordinal: usize) -> Option<String> {
        match self {
            PageMarker::None => None,
            PageMarker::Heading => Some(format!("\n---\n## Page {ordinal}\n")),
            PageMarker::Comment => Some(format!("\n---\n<!-- Page: {ordinal} -->\n")),
        }
    }
}
