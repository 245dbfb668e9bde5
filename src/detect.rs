//! End-of-document detection.
//!
//! The reader gives no page count, so the only evidence that the last page
//! has been reached is that turning the page stopped changing what is on
//! screen. Two interchangeable strategies turn consecutive captures into a
//! [`DetectionSignal`]:
//!
//! - [`HashDetector`]: Hamming distance between average hashes of the
//!   images. Terminal when `distance <= max_distance`.
//! - [`TextDetector`]: character-level similarity ratio between the
//!   recognised texts. Terminal when `ratio > min_ratio`; a page whose text
//!   has `min_chars` characters or fewer is never compared.
//!
//! The first observation has no predecessor and is never terminal. A
//! terminal verdict always condemns the *newer* capture: it reproduces a page
//! that has already been kept.

use crate::config::{CaptureConfig, DetectionStrategy};
use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};
use similar::TextDiff;
use std::fmt;

// ── Fingerprints ─────────────────────────────────────────────────────────

/// A coarse perceptual fingerprint of one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    bits: Vec<u8>,
}

impl Fingerprint {
    pub fn from_bytes(bits: impl Into<Vec<u8>>) -> Self {
        Self { bits: bits.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Number of differing bits. Fingerprints of different lengths compare
    /// as maximally distant over the longer one.
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        if self.bits.len() != other.bits.len() {
            return 8 * self.bits.len().max(other.bits.len()) as u32;
        }
        self.bits
            .iter()
            .zip(&other.bits)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// Computes a [`Fingerprint`] for a captured image.
pub trait Fingerprinter {
    fn fingerprint(&self, image: &DynamicImage) -> Fingerprint;
}

/// Average ("mean") hash over an 8×8 grayscale downscale: 64 bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanHasher;

impl Fingerprinter for MeanHasher {
    fn fingerprint(&self, image: &DynamicImage) -> Fingerprint {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::Mean)
            .hash_size(8, 8)
            .to_hasher();
        Fingerprint::from_bytes(hasher.hash_image(image).as_bytes())
    }
}

// ── Signals and verdicts ─────────────────────────────────────────────────

/// The measured difference between a capture and its predecessor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectionSignal {
    /// Hamming distance between fingerprints; 0 = identical under the hash.
    HashDistance(u32),
    /// Similarity ratio in `[0, 1]`; 1 = identical text.
    TextSimilarity(f64),
}

impl fmt::Display for DetectionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionSignal::HashDistance(d) => write!(f, "hash distance {d}"),
            DetectionSignal::TextSimilarity(r) => write!(f, "text similarity {:.2}%", r * 100.0),
        }
    }
}

/// Outcome of observing one capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// First capture of the session; nothing to compare against.
    First,
    /// Text too short to trust; comparison skipped.
    Exempt { chars: usize },
    /// Compared and found to be a new page.
    Distinct(DetectionSignal),
    /// Compared and found to repeat the previous page.
    Duplicate(DetectionSignal),
}

impl Verdict {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Verdict::Duplicate(_))
    }
}

/// Terminal test for the hash strategy: monotone in `distance`.
pub fn hash_is_terminal(distance: u32, max_distance: u32) -> bool {
    distance <= max_distance
}

/// Character-level similarity ratio of two texts, `2·matches / total`.
///
/// Empty input on either side has nothing to compare and scores 0.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    f64::from(TextDiff::from_chars(a, b).ratio())
}

// ── Detectors ────────────────────────────────────────────────────────────

/// Perceptual-hash strategy.
#[derive(Debug, Clone)]
pub struct HashDetector {
    max_distance: u32,
    previous: Option<Fingerprint>,
}

impl HashDetector {
    pub fn new(max_distance: u32) -> Self {
        Self {
            max_distance,
            previous: None,
        }
    }

    pub fn observe(&mut self, current: Fingerprint) -> Verdict {
        let Some(previous) = self.previous.as_ref() else {
            self.previous = Some(current);
            return Verdict::First;
        };
        let distance = previous.distance(&current);
        let signal = DetectionSignal::HashDistance(distance);
        if hash_is_terminal(distance, self.max_distance) {
            return Verdict::Duplicate(signal);
        }
        self.previous = Some(current);
        Verdict::Distinct(signal)
    }
}

/// Recognised-text strategy.
#[derive(Debug, Clone)]
pub struct TextDetector {
    min_ratio: f64,
    min_chars: usize,
    previous: Option<String>,
}

impl TextDetector {
    pub fn new(min_ratio: f64, min_chars: usize) -> Self {
        Self {
            min_ratio,
            min_chars,
            previous: None,
        }
    }

    pub fn observe(&mut self, current: &str) -> Verdict {
        let chars = current.chars().count();
        let verdict = match self.previous.as_deref() {
            None => Verdict::First,
            Some(_) if chars <= self.min_chars => Verdict::Exempt { chars },
            Some(previous) => {
                let ratio = similarity_ratio(previous, current);
                let signal = DetectionSignal::TextSimilarity(ratio);
                if ratio > self.min_ratio {
                    return Verdict::Duplicate(signal);
                }
                Verdict::Distinct(signal)
            }
        };
        self.previous = Some(current.to_string());
        verdict
    }
}

/// The active strategy of a session.
#[derive(Debug, Clone)]
pub enum EndDetector {
    Hash(HashDetector),
    Text(TextDetector),
}

impl EndDetector {
    /// Detector for `config`, or `None` when end detection is disabled.
    pub fn from_config(config: &CaptureConfig) -> Option<Self> {
        if !config.end_detection {
            return None;
        }
        Some(match config.detection {
            DetectionStrategy::ImageHash { max_distance } => {
                EndDetector::Hash(HashDetector::new(max_distance))
            }
            DetectionStrategy::TextSimilarity {
                min_ratio,
                min_chars,
            } => EndDetector::Text(TextDetector::new(min_ratio, min_chars)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn page_text(seed: &str) -> String {
        format!("{seed} ").repeat(12)
    }

    #[test]
    fn hash_terminal_is_monotone_in_distance() {
        for threshold in 0..=10 {
            for d2 in 0..=64 {
                if hash_is_terminal(d2, threshold) {
                    for d1 in 0..=d2 {
                        assert!(hash_is_terminal(d1, threshold), "d1={d1} d2={d2} T={threshold}");
                    }
                }
            }
        }
    }

    #[test]
    fn identical_images_have_zero_distance() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, y| {
            Rgb([(x * 4) as u8, (y * 4) as u8, 128])
        }));
        let a = MeanHasher.fingerprint(&img);
        let b = MeanHasher.fingerprint(&img.clone());
        assert_eq!(a.distance(&b), 0);

        let mut detector = HashDetector::new(0);
        assert_eq!(detector.observe(a), Verdict::First);
        assert!(detector.observe(b).is_terminal());
    }

    #[test]
    fn different_images_are_distinct() {
        let left = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, _| {
            if x < 32 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        }));
        let top = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |_, y| {
            if y < 32 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        }));
        let mut detector = HashDetector::new(2);
        detector.observe(MeanHasher.fingerprint(&left));
        let verdict = detector.observe(MeanHasher.fingerprint(&top));
        assert!(matches!(verdict, Verdict::Distinct(DetectionSignal::HashDistance(d)) if d > 2));
    }

    #[test]
    fn fingerprint_distance_counts_bits() {
        let a = Fingerprint::from_bytes(vec![0b0000_0000, 0xFF]);
        let b = Fingerprint::from_bytes(vec![0b0000_0111, 0xFF]);
        assert_eq!(a.distance(&b), 3);
        assert_eq!(a.distance(&Fingerprint::from_bytes(vec![0])), 16);
    }

    #[test]
    fn first_text_is_never_compared() {
        let mut detector = TextDetector::new(0.95, 0);
        assert_eq!(detector.observe(&page_text("same")), Verdict::First);
    }

    #[test]
    fn repeated_text_is_terminal() {
        let mut detector = TextDetector::new(0.95, 50);
        detector.observe(&page_text("same page"));
        let verdict = detector.observe(&page_text("same page"));
        assert_eq!(verdict, Verdict::Duplicate(DetectionSignal::TextSimilarity(1.0)));
    }

    #[test]
    fn short_text_is_exempt_even_when_identical() {
        let mut detector = TextDetector::new(0.95, 50);
        let short = "x".repeat(49);
        detector.observe(&short);
        assert_eq!(detector.observe(&short), Verdict::Exempt { chars: 49 });
        let exactly = "y".repeat(50);
        detector.observe(&exactly);
        assert_eq!(detector.observe(&exactly), Verdict::Exempt { chars: 50 });
    }

    #[test]
    fn distinct_text_continues() {
        let mut detector = TextDetector::new(0.95, 10);
        detector.observe(&page_text("alpha beta gamma"));
        let verdict = detector.observe(&page_text("completely other words"));
        assert!(matches!(verdict, Verdict::Distinct(_)));
    }

    #[test]
    fn similarity_ratio_bounds() {
        assert_eq!(similarity_ratio("", "abc"), 0.0);
        assert_eq!(similarity_ratio("abc", "abc"), 1.0);
        let r = similarity_ratio("abcd", "abxy");
        assert!(r > 0.0 && r < 1.0, "ratio {r}");
    }

    #[test]
    fn disabled_detection_builds_no_detector() {
        let config = CaptureConfig::builder().end_detection(false).build().unwrap();
        assert!(EndDetector::from_config(&config).is_none());
        let config = CaptureConfig::default();
        assert!(matches!(EndDetector::from_config(&config), Some(EndDetector::Text(_))));
    }
}
