//! Integration tests for the capture → transcribe → assemble flow.
//!
//! The screen, keyboard and OCR engine are replaced by in-memory fakes, so
//! these run anywhere. The live summary test makes real model calls and is
//! gated behind `E2E_ENABLED`.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use image::{DynamicImage, Rgb, RgbImage};
use reader2md::device::{DeviceError, ImageSource, PageAdvancer, Region};
use reader2md::{
    assemble_from_dir, capture_session, transcribe_session, CaptureConfig, CaptureDevices,
    CaptureSession, DetectionStrategy, MeanHasher, OcrCache, OcrError, PageMarker, ReaderError,
    Recognizer, Script, Termination,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Serves a distinct solid image for every capture.
struct ScriptedSource {
    taken: u8,
}

impl ScriptedSource {
    fn new() -> Self {
        Self { taken: 0 }
    }
}

impl ImageSource for ScriptedSource {
    fn capture(&mut self, _region: Option<Region>) -> Result<DynamicImage, DeviceError> {
        self.taken = self.taken.wrapping_add(40);
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            8,
            8,
            Rgb([self.taken; 3]),
        )))
    }
}

#[derive(Default)]
struct CountingAdvancer {
    turns: usize,
}

impl PageAdvancer for CountingAdvancer {
    fn advance(&mut self) -> Result<(), DeviceError> {
        self.turns += 1;
        Ok(())
    }
}

/// Answers by image file name and records every call it receives.
struct MapRecognizer {
    texts: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl MapRecognizer {
    fn new(texts: &[&str]) -> Self {
        let texts = texts
            .iter()
            .enumerate()
            .map(|(i, t)| (format!("page_{:04}.png", i + 1), t.to_string()))
            .collect();
        Self {
            texts,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Recognizer for MapRecognizer {
    fn recognize(&self, image: &Path) -> Result<String, OcrError> {
        let name = image.file_name().unwrap().to_string_lossy().into_owned();
        self.calls.lock().unwrap().push(name.clone());
        self.texts.get(&name).cloned().ok_or_else(|| OcrError::Engine {
            path: image.to_path_buf(),
            detail: "unreadable".into(),
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config(dir: &Path, max_pages: usize, detection: DetectionStrategy, enabled: bool) -> CaptureConfig {
    CaptureConfig::builder()
        .output_dir(dir)
        .max_pages(max_pages)
        .detection(detection)
        .end_detection(enabled)
        .language("eng")
        .settle_delay(Duration::ZERO)
        .setup_waits(Duration::ZERO, Duration::ZERO, Duration::ZERO)
        .build()
        .unwrap()
}

fn live() -> CancellationToken {
    CancellationToken::new()
}

fn text_detection(min_chars: usize) -> DetectionStrategy {
    DetectionStrategy::TextSimilarity {
        min_ratio: 0.95,
        min_chars,
    }
}

async fn capture(
    config: CaptureConfig,
    recognizer: &MapRecognizer,
    advancer: &mut CountingAdvancer,
) -> CaptureSession {
    let mut source = ScriptedSource::new();
    let devices = CaptureDevices {
        source: &mut source,
        advancer,
        focus: None,
        recognizer,
        fingerprinter: &MeanHasher,
    };
    capture_session(config, devices, &CancellationToken::new(), None)
        .await
        .unwrap()
}

// ── Capture ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_page_text_ends_capture_before_later_pages() {
    let dir = TempDir::new().unwrap();
    let recognizer = MapRecognizer::new(&[
        "Hello world, this is page one.",
        "Hello world, this is page one.",
        "Page two unique content.",
    ]);
    let mut advancer = CountingAdvancer::default();

    let session = capture(config(dir.path(), 10, text_detection(10), true), &recognizer, &mut advancer).await;

    assert_eq!(session.len(), 1);
    assert_eq!(advancer.turns, 1);
    assert!(matches!(
        session.termination(),
        Some(Termination::EndDetected { last_page: 1, .. })
    ));
    // The third page is never reached.
    assert_eq!(recognizer.calls(), vec!["page_0001.png", "page_0002.png"]);
    assert!(session.config().page_path(1).exists());
    assert!(!session.config().page_path(2).exists());

    // Only the retained page stays cached.
    let cache = OcrCache::load(&session.config().cache_path()).unwrap();
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn short_pages_never_end_capture() {
    let dir = TempDir::new().unwrap();
    let recognizer = MapRecognizer::new(&["Chapter 1", "Chapter 1", "Chapter 1", "Chapter 1"]);
    let mut advancer = CountingAdvancer::default();

    let session = capture(config(dir.path(), 4, text_detection(50), true), &recognizer, &mut advancer).await;

    assert_eq!(session.len(), 4);
    assert_eq!(session.termination(), Some(Termination::MaxPages));
}

#[tokio::test]
async fn disabled_detection_captures_exactly_max_pages() {
    let dir = TempDir::new().unwrap();
    let same = "The same page of text, recognised again and again by the engine.";
    let recognizer = MapRecognizer::new(&[same, same, same, same, same]);
    let mut advancer = CountingAdvancer::default();

    let session = capture(config(dir.path(), 5, text_detection(10), false), &recognizer, &mut advancer).await;

    assert_eq!(session.len(), 5);
    assert_eq!(session.termination(), Some(Termination::MaxPages));
    // No turn after the last page.
    assert_eq!(advancer.turns, 4);
    // Recognition is skipped while detection is off.
    assert!(recognizer.calls().is_empty());
}

#[tokio::test]
async fn cleanup_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let recognizer = MapRecognizer::new(&[]);
    let mut advancer = CountingAdvancer::default();
    let session = capture(
        config(dir.path(), 3, DetectionStrategy::image_hash(), false),
        &recognizer,
        &mut advancer,
    )
    .await;

    std::fs::remove_file(session.config().page_path(2)).unwrap();
    assert_eq!(session.cleanup(), 2);
    assert_eq!(session.cleanup(), 0);
    for path in session.image_paths() {
        assert!(!path.exists());
    }
}

#[tokio::test]
async fn cancelled_capture_reports_error() {
    let dir = TempDir::new().unwrap();
    let recognizer = MapRecognizer::new(&[]);
    let mut source = ScriptedSource::new();
    let mut advancer = CountingAdvancer::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let devices = CaptureDevices {
        source: &mut source,
        advancer: &mut advancer,
        focus: None,
        recognizer: &recognizer,
        fingerprinter: &MeanHasher,
    };
    let err = capture_session(
        config(dir.path(), 3, DetectionStrategy::image_hash(), true),
        devices,
        &cancel,
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ReaderError::Cancelled { captured: 0 }));
}

// ── Transcription & assembly ─────────────────────────────────────────────────

#[tokio::test]
async fn session_transcript_has_title_and_page_markers() {
    let dir = TempDir::new().unwrap();
    let texts = [
        "It was a bright cold day in April, and the clocks were striking thirteen.",
        "Winston Smith, his chin nuzzled into his breast in an effort to escape.",
        "",
    ];
    let recognizer = MapRecognizer::new(&texts);
    let mut advancer = CountingAdvancer::default();
    let session = capture(config(dir.path(), 3, text_detection(10), true), &recognizer, &mut advancer).await;
    assert_eq!(session.len(), 3);

    let output =
        transcribe_session(&session, &recognizer, "Nineteen", PageMarker::Heading, &live(), None)
            .unwrap();

    assert!(output.markdown.starts_with("# Nineteen\n"));
    assert!(output.markdown.contains("## Page 1\n"));
    assert!(output.markdown.contains("## Page 2\n"));
    // Empty pages are left out entirely.
    assert!(!output.markdown.contains("## Page 3"));
    assert!(output.markdown.contains("striking thirteen."));
    assert!(output.markdown.ends_with('\n'));

    // Every page was recognised during capture.
    assert_eq!(output.stats.cache_hits, 3);
    assert_eq!(recognizer.calls().len(), 3);
}

#[tokio::test]
async fn hash_session_is_recognised_after_capture() {
    let dir = TempDir::new().unwrap();
    let recognizer = MapRecognizer::new(&["first line\nof page one", "page two"]);
    let mut advancer = CountingAdvancer::default();
    let session = capture(
        config(dir.path(), 2, DetectionStrategy::image_hash(), false),
        &recognizer,
        &mut advancer,
    )
    .await;

    let output =
        transcribe_session(&session, &recognizer, "Book", PageMarker::None, &live(), None).unwrap();

    // Spaced script: the wrap break becomes a space.
    assert_eq!(output.markdown, "# Book\n\nfirst line of page one\npage two\n");
    assert_eq!(output.stats.cache_hits, 0);
    // New recognitions are written next to the images.
    let cache = OcrCache::load(&session.config().cache_path()).unwrap();
    assert_eq!(cache.len(), 2);
}

#[test]
fn assemble_reuses_cached_recognitions() {
    let dir = TempDir::new().unwrap();
    let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([9, 9, 9])));
    let paths: Vec<PathBuf> = (1..=3)
        .map(|n| {
            let p = dir.path().join(format!("page_{n:04}.png"));
            page.save(&p).unwrap();
            p
        })
        .collect();

    let mut cache = OcrCache::new();
    cache.record(reader2md::cache::cache_key(&paths[0]), "cached one");
    cache.record(reader2md::cache::cache_key(&paths[1]), "cached two");
    cache.persist(&dir.path().join("ocr_results.json")).unwrap();

    let recognizer = MapRecognizer::new(&["fresh one", "fresh two", "fresh three"]);
    let output = assemble_from_dir(
        dir.path(),
        &recognizer,
        Script::Spaced,
        "Book",
        PageMarker::Heading,
        &live(),
        None,
    )
    .unwrap();

    assert_eq!(recognizer.calls(), vec!["page_0003.png"]);
    assert!(output.markdown.contains("cached one"));
    assert!(output.markdown.contains("cached two"));
    assert!(output.markdown.contains("fresh three"));
    assert_eq!(output.stats.cache_hits, 2);

    // The new recognition is persisted for the next run.
    let cache = OcrCache::load(&dir.path().join("ocr_results.json")).unwrap();
    assert_eq!(cache.len(), 3);
}

#[test]
fn gapless_script_strips_spaces_in_assembly() {
    let dir = TempDir::new().unwrap();
    let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])));
    page.save(dir.path().join("page_0001.png")).unwrap();

    let recognizer = MapRecognizer::new(&["吾輩 は 猫 で\nある"]);
    let output = assemble_from_dir(
        dir.path(),
        &recognizer,
        Script::Gapless,
        "猫",
        PageMarker::None,
        &live(),
        None,
    )
    .unwrap();
    assert_eq!(output.markdown, "# 猫\n\n吾輩は猫である\n");
}

#[test]
fn interrupted_assembly_keeps_the_cache_file_untouched() {
    let dir = TempDir::new().unwrap();
    let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([5, 5, 5])));
    page.save(dir.path().join("page_0001.png")).unwrap();
    page.save(dir.path().join("page_0002.png")).unwrap();

    let recognizer = MapRecognizer::new(&["one", "two"]);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = assemble_from_dir(
        dir.path(),
        &recognizer,
        Script::Spaced,
        "Book",
        PageMarker::Heading,
        &cancel,
        None,
    )
    .unwrap_err();

    assert!(matches!(err, ReaderError::Interrupted { processed: 0, total: 2 }));
    assert!(recognizer.calls().is_empty());
    assert!(!dir.path().join("ocr_results.json").exists());
}

#[tokio::test]
async fn summary_document_links_each_image_after_its_text() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("page_0001.png");
    DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([250, 250, 250])))
        .save(&path)
        .unwrap();

    let provider = edgequake_llm::MockProvider::new();
    provider.add_response("- a blank page").await;
    let summarizer = reader2md::Summarizer::with_provider(
        std::sync::Arc::new(provider),
        reader2md::SummaryConfig::default(),
    );
    let output = reader2md::summarize_images(
        &summarizer,
        &[(1, path.clone())],
        "Blank",
        true,
        &live(),
        None,
    )
    .await
    .unwrap();

    let md = &output.markdown;
    let marker = md.find("<!-- Page: 1 -->").unwrap();
    let text = md.find("- a blank page").unwrap();
    let link = md.find(&format!("<!-- Image: {} -->", path.display())).unwrap();
    assert!(marker < text && text < link, "got:\n{md}");
    assert!(md.contains("**Total pages**: 1"));
}

// ── Live summary (gated) ─────────────────────────────────────────────────────

#[tokio::test]
async fn live_summary_of_a_rendered_page() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP: set E2E_ENABLED=1 to run live tests");
        return;
    }
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("page_0001.png");
    DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([255, 255, 255])))
        .save(&path)
        .unwrap();

    let summarizer = reader2md::Summarizer::from_env(reader2md::SummaryConfig::default()).unwrap();
    let output =
        reader2md::summarize_images(&summarizer, &[(1, path)], "Blank", false, &live(), None)
            .await
            .unwrap();
    assert!(output.markdown.starts_with("# Blank\n"));
    assert!(output.markdown.contains("<!-- Page: 1 -->"));
}
