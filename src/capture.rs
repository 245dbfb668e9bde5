//! Capture loop: drive the reader page by page until the document ends.
//!
//! ## State machine
//!
//! ```text
//! INIT ──▶ CAPTURING ──▶ DETECTING ──┬──▶ CAPTURING          (Step::Continue)
//!                                    ├──▶ TERMINATED_END     (duplicate discarded)
//!                                    └──▶ TERMINATED_MAX     (ordinal == max_pages)
//! ```
//!
//! * `INIT` is best-effort: focusing the reader window may fail, in which
//!   case the loop waits longer and captures the full screen.
//! * Each iteration is one [`Step`]. Fatal faults (screenshot or page-turn
//!   failure, unwritable staging dir) are the `Err` arm of the step result;
//!   the end of the document is an ordinary `Step::Terminated` value.
//! * The settle delay after each page turn and every setup wait race against
//!   the [`CancellationToken`], so Ctrl-C is observed between iterations
//!   without waiting the delay out. A blocking call into a collaborator is
//!   never interrupted mid-call.
//!
//! Everything is strictly sequential: termination compares each capture
//! with its immediate predecessor only.

use crate::config::CaptureConfig;
use crate::detect::{EndDetector, Fingerprinter, Verdict};
use crate::device::{FocusProvider, ImageSource, PageAdvancer, Region};
use crate::error::ReaderError;
use crate::ocr::Recognizer;
use crate::progress::ProgressCallback;
use crate::session::{CaptureSession, Page, Termination};
use image::{DynamicImage, ImageFormat};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The collaborators a capture session talks to.
pub struct CaptureDevices<'a> {
    pub source: &'a mut dyn ImageSource,
    pub advancer: &'a mut dyn PageAdvancer,
    /// `None` behaves like auto-focus disabled.
    pub focus: Option<&'a mut dyn FocusProvider>,
    /// Used only by the text-similarity strategy.
    pub recognizer: &'a dyn Recognizer,
    /// Used only by the image-hash strategy.
    pub fingerprinter: &'a dyn Fingerprinter,
}

/// Outcome of one loop iteration that did not fail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// A page was kept and the next page has been requested.
    Continue,
    /// The loop is over.
    Terminated(Termination),
}

/// Run one capture session to completion.
///
/// Returns the session with every retained page. An empty session is a
/// valid outcome. On cancellation the recognition cache gathered so far is
/// persisted, captured images are left in place, and
/// [`ReaderError::Cancelled`] is returned.
pub async fn capture_session(
    config: CaptureConfig,
    devices: CaptureDevices<'_>,
    cancel: &CancellationToken,
    progress: Option<ProgressCallback>,
) -> Result<CaptureSession, ReaderError> {
    std::fs::create_dir_all(&config.output_dir).map_err(|source| ReaderError::StagingDir {
        path: config.output_dir.clone(),
        source,
    })?;

    let CaptureDevices {
        source,
        advancer,
        focus,
        recognizer,
        fingerprinter,
    } = devices;

    let region = match acquire_region(&config, focus, cancel).await {
        Some(region) => region,
        None => return Err(ReaderError::Cancelled { captured: 0 }),
    };

    let mut capture = CaptureLoop {
        detector: EndDetector::from_config(&config),
        session: CaptureSession::new(config),
        source,
        advancer,
        recognizer,
        fingerprinter,
        region,
        progress,
    };
    capture.run(cancel).await
}

struct CaptureLoop<'a> {
    session: CaptureSession,
    detector: Option<EndDetector>,
    source: &'a mut dyn ImageSource,
    advancer: &'a mut dyn PageAdvancer,
    recognizer: &'a dyn Recognizer,
    fingerprinter: &'a dyn Fingerprinter,
    region: Option<Region>,
    progress: Option<ProgressCallback>,
}

impl CaptureLoop<'_> {
    async fn run(mut self, cancel: &CancellationToken) -> Result<CaptureSession, ReaderError> {
        let max_pages = self.session.config().max_pages;
        info!(
            "Starting capture (max {} pages, detection: {})",
            max_pages,
            match &self.detector {
                None => "disabled",
                Some(EndDetector::Hash(_)) => "image hash",
                Some(EndDetector::Text(_)) => "text similarity",
            }
        );
        if let Some(cb) = &self.progress {
            cb.on_capture_start(max_pages);
        }

        let termination = loop {
            if cancel.is_cancelled() {
                return Err(self.interrupted());
            }
            match self.step() {
                Ok(Step::Continue) => {}
                Ok(Step::Terminated(t)) => break t,
                Err(e) => {
                    self.persist_cache_best_effort();
                    return Err(e);
                }
            }
            let settle = self.session.config().settle_delay;
            if !pause(settle, cancel).await {
                return Err(self.interrupted());
            }
        };

        match termination {
            Termination::EndDetected { last_page, signal } => {
                let signal = signal.map(|s| s.to_string()).unwrap_or_default();
                info!("End of document detected after page {} ({})", last_page, signal);
                if let Some(cb) = &self.progress {
                    cb.on_end_detected(last_page, &signal);
                }
            }
            Termination::MaxPages => info!("Reached max pages ({})", max_pages),
        }
        self.session.finish(termination);
        self.persist_cache()?;

        info!("Capture complete: {} pages", self.session.len());
        if let Some(cb) = &self.progress {
            cb.on_capture_complete(self.session.len());
        }
        Ok(self.session)
    }

    /// CAPTURING + DETECTING for one page, then the page-turn signal.
    fn step(&mut self) -> Result<Step, ReaderError> {
        let ordinal = self.session.next_ordinal();
        let image = self
            .source
            .capture(self.region)
            .map_err(|e| ReaderError::CaptureFailed {
                page: ordinal,
                detail: e.to_string(),
            })?;

        let path = self.session.config().page_path(ordinal);
        write_png(&image, &path)?;
        self.session.push(Page {
            ordinal,
            image_path: path.clone(),
            text: None,
        });
        info!("Captured page {}: {}", ordinal, path.display());
        if let Some(cb) = &self.progress {
            cb.on_page_captured(ordinal, self.session.config().max_pages);
        }

        if let Some(verdict) = self.detect(&image, &path, ordinal) {
            match verdict {
                Verdict::First => {}
                Verdict::Exempt { chars } => {
                    debug!("Page {}: {} chars, too short to compare", ordinal, chars)
                }
                Verdict::Distinct(signal) => debug!("Page {}: {}", ordinal, signal),
                Verdict::Duplicate(signal) => {
                    debug!("Page {}: {} (duplicate)", ordinal, signal);
                    self.session.discard_last();
                    return Ok(Step::Terminated(Termination::EndDetected {
                        last_page: ordinal - 1,
                        signal: Some(signal),
                    }));
                }
            }
        }

        if ordinal >= self.session.config().max_pages {
            return Ok(Step::Terminated(Termination::MaxPages));
        }

        self.advancer
            .advance()
            .map_err(|e| ReaderError::AdvanceFailed {
                page: ordinal,
                detail: e.to_string(),
            })?;
        Ok(Step::Continue)
    }

    /// Feed the current capture to the active detector, if any.
    fn detect(&mut self, image: &DynamicImage, path: &Path, ordinal: usize) -> Option<Verdict> {
        match self.detector.as_mut()? {
            EndDetector::Hash(detector) => {
                Some(detector.observe(self.fingerprinter.fingerprint(image)))
            }
            EndDetector::Text(detector) => {
                let text = match self.recognizer.recognize(path) {
                    Ok(text) => {
                        self.session.record_text(text.clone());
                        text
                    }
                    Err(e) => {
                        // Not cached, so the transcription stage retries it.
                        warn!("Page {}: recognition failed during capture: {}", ordinal, e);
                        String::new()
                    }
                };
                Some(detector.observe(&text))
            }
        }
    }

    fn persist_cache(&self) -> Result<(), ReaderError> {
        if self.session.cache().is_empty() {
            return Ok(());
        }
        self.session
            .cache()
            .persist(&self.session.config().cache_path())
    }

    fn persist_cache_best_effort(&self) {
        if let Err(e) = self.persist_cache() {
            warn!("{}", e);
        }
    }

    fn interrupted(self) -> ReaderError {
        warn!("Capture interrupted after {} pages", self.session.len());
        self.persist_cache_best_effort();
        ReaderError::Cancelled {
            captured: self.session.len(),
        }
    }
}

/// INIT: focus the reader and wait for the user.
///
/// Returns `None` when cancelled during the wait, otherwise the capture
/// region (`Some(None)` = full screen).
async fn acquire_region(
    config: &CaptureConfig,
    focus: Option<&mut dyn FocusProvider>,
    cancel: &CancellationToken,
) -> Option<Option<Region>> {
    let (region, wait) = match focus {
        Some(provider) if config.auto_focus => match provider.focus() {
            Ok(Some(region)) => {
                info!("Focused {} window ({})", config.app_name, region);
                (Some(region), config.focus_wait)
            }
            Ok(None) => {
                warn!(
                    "Focused {} but could not read its bounds; capturing the full screen",
                    config.app_name
                );
                (None, config.focus_wait)
            }
            Err(e) => {
                warn!(
                    "Could not focus {} ({}); bring it to the front within {:.0}s",
                    config.app_name,
                    e,
                    config.fallback_wait.as_secs_f64()
                );
                (None, config.fallback_wait)
            }
        },
        _ => {
            info!(
                "Auto-focus disabled; bring {} to the front within {:.0}s",
                config.app_name,
                config.manual_wait.as_secs_f64()
            );
            (None, config.manual_wait)
        }
    };

    if pause(wait, cancel).await {
        Some(region)
    } else {
        None
    }
}

/// Sleep for `duration` unless cancelled first. Returns false on cancel.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Write `image` as PNG via a temporary sibling renamed into place.
fn write_png(image: &DynamicImage, path: &Path) -> Result<(), ReaderError> {
    let err = |detail: String| ReaderError::ImageWriteFailed {
        path: path.to_path_buf(),
        detail,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| err(e.to_string()))?;
    image
        .write_to(tmp.as_file_mut(), ImageFormat::Png)
        .map_err(|e| err(e.to_string()))?;
    tmp.persist(path).map_err(|e| err(e.error.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionStrategy;
    use crate::detect::{DetectionSignal, Fingerprint};
    use crate::device::DeviceError;
    use crate::ocr::OcrError;
    use image::{GenericImageView, Rgb, RgbImage};
    use tempfile::TempDir;

    /// Serves a fixed list of shades; past the end it keeps repeating the last.
    struct Shades {
        shades: Vec<u8>,
        next: usize,
    }

    impl ImageSource for Shades {
        fn capture(&mut self, _region: Option<Region>) -> Result<DynamicImage, DeviceError> {
            let shade = self.shades[self.next.min(self.shades.len() - 1)];
            self.next += 1;
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([shade; 3]))))
        }
    }

    struct Turns(usize);

    impl PageAdvancer for Turns {
        fn advance(&mut self) -> Result<(), DeviceError> {
            self.0 += 1;
            Ok(())
        }
    }

    struct Stuck;

    impl PageAdvancer for Stuck {
        fn advance(&mut self) -> Result<(), DeviceError> {
            Err(DeviceError::Unsupported("test".into()))
        }
    }

    /// Fingerprint = the shade of the top-left pixel.
    struct ShadePrint;

    impl Fingerprinter for ShadePrint {
        fn fingerprint(&self, image: &DynamicImage) -> Fingerprint {
            Fingerprint::from_bytes(vec![image.get_pixel(0, 0)[0]])
        }
    }

    struct NoText;

    impl Recognizer for NoText {
        fn recognize(&self, image: &Path) -> Result<String, OcrError> {
            Err(OcrError::Engine {
                path: image.to_path_buf(),
                detail: "no engine".into(),
            })
        }
    }

    fn config(dir: &Path, max_pages: usize, end_detection: bool) -> CaptureConfig {
        CaptureConfig::builder()
            .output_dir(dir)
            .max_pages(max_pages)
            .detection(DetectionStrategy::ImageHash { max_distance: 2 })
            .end_detection(end_detection)
            .settle_delay(Duration::ZERO)
            .setup_waits(Duration::ZERO, Duration::ZERO, Duration::ZERO)
            .build()
            .unwrap()
    }

    async fn run(
        config: CaptureConfig,
        source: &mut dyn ImageSource,
        advancer: &mut dyn PageAdvancer,
        cancel: &CancellationToken,
    ) -> Result<CaptureSession, ReaderError> {
        let devices = CaptureDevices {
            source,
            advancer,
            focus: None,
            recognizer: &NoText,
            fingerprinter: &ShadePrint,
        };
        capture_session(config, devices, cancel, None).await
    }

    #[tokio::test]
    async fn repeated_capture_ends_the_session() {
        let dir = TempDir::new().unwrap();
        let mut source = Shades { shades: vec![0, 255, 0], next: 0 };
        let mut turns = Turns(0);
        let session = run(config(dir.path(), 10, true), &mut source, &mut turns, &CancellationToken::new())
            .await
            .unwrap();

        // Page 4 repeats page 3 (0x00 vs 0x00) and is discarded.
        assert_eq!(session.len(), 3);
        assert_eq!(turns.0, 3);
        assert_eq!(
            session.termination(),
            Some(Termination::EndDetected {
                last_page: 3,
                signal: Some(DetectionSignal::HashDistance(0)),
            })
        );
        assert!(session.config().page_path(3).exists());
        assert!(!session.config().page_path(4).exists());
    }

    #[tokio::test]
    async fn disabled_detection_runs_to_max_pages() {
        let dir = TempDir::new().unwrap();
        let mut source = Shades { shades: vec![7], next: 0 };
        let mut turns = Turns(0);
        let session = run(config(dir.path(), 4, false), &mut source, &mut turns, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(session.len(), 4);
        assert_eq!(turns.0, 3, "no page turn after the last page");
        assert_eq!(session.termination(), Some(Termination::MaxPages));
        let ordinals: Vec<usize> = session.pages().iter().map(|p| p.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn advance_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut source = Shades { shades: vec![0, 255], next: 0 };
        let err = run(config(dir.path(), 5, true), &mut source, &mut Stuck, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::AdvanceFailed { page: 1, .. }));
    }

    #[tokio::test]
    async fn cancelled_before_start_captures_nothing() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut source = Shades { shades: vec![0], next: 0 };
        let err = run(config(dir.path(), 5, true), &mut source, &mut Turns(0), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::Cancelled { captured: 0 }));
        assert!(!dir.path().join("page_0001.png").exists());
    }

    #[tokio::test]
    async fn cancel_during_settle_keeps_captured_images() {
        struct CancelOnTurn(CancellationToken);
        impl PageAdvancer for CancelOnTurn {
            fn advance(&mut self) -> Result<(), DeviceError> {
                self.0.cancel();
                Ok(())
            }
        }

        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let mut source = Shades { shades: vec![0, 255], next: 0 };
        let mut advancer = CancelOnTurn(cancel.clone());
        let err = run(config(dir.path(), 5, true), &mut source, &mut advancer, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::Cancelled { captured: 1 }));
        assert!(dir.path().join("page_0001.png").exists());
    }

    /// Records the region of every capture request.
    #[derive(Default)]
    struct RegionLog(Vec<Option<Region>>);

    impl ImageSource for RegionLog {
        fn capture(&mut self, region: Option<Region>) -> Result<DynamicImage, DeviceError> {
            self.0.push(region);
            let shade = (self.0.len() * 60) as u8;
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([shade; 3]))))
        }
    }

    struct FixedFocus {
        answer: Result<Option<Region>, String>,
        calls: usize,
    }

    impl FocusProvider for FixedFocus {
        fn focus(&mut self) -> Result<Option<Region>, DeviceError> {
            self.calls += 1;
            self.answer.clone().map_err(DeviceError::Unsupported)
        }
    }

    async fn run_focused(config: CaptureConfig, focus: &mut FixedFocus) -> Vec<Option<Region>> {
        let mut source = RegionLog::default();
        let mut turns = Turns(0);
        let devices = CaptureDevices {
            source: &mut source,
            advancer: &mut turns,
            focus: Some(focus),
            recognizer: &NoText,
            fingerprinter: &ShadePrint,
        };
        let session = capture_session(config, devices, &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(session.len(), 3);
        source.0
    }

    #[tokio::test]
    async fn focus_failure_falls_back_to_full_screen() {
        let dir = TempDir::new().unwrap();
        let mut focus = FixedFocus {
            answer: Err("no window".into()),
            calls: 0,
        };
        let regions = run_focused(config(dir.path(), 3, false), &mut focus).await;
        assert_eq!(focus.calls, 1);
        assert_eq!(regions, vec![None, None, None]);
    }

    #[tokio::test]
    async fn focused_window_bounds_are_used_for_every_capture() {
        let dir = TempDir::new().unwrap();
        let bounds = Region { x: 10, y: 20, width: 300, height: 400 };
        let mut focus = FixedFocus {
            answer: Ok(Some(bounds)),
            calls: 0,
        };
        let regions = run_focused(config(dir.path(), 3, false), &mut focus).await;
        assert_eq!(focus.calls, 1);
        assert_eq!(regions, vec![Some(bounds); 3]);
    }

    #[tokio::test]
    async fn disabled_auto_focus_never_asks_the_provider() {
        let dir = TempDir::new().unwrap();
        let config = CaptureConfig::builder()
            .output_dir(dir.path())
            .max_pages(3)
            .end_detection(false)
            .auto_focus(false)
            .settle_delay(Duration::ZERO)
            .setup_waits(Duration::ZERO, Duration::ZERO, Duration::ZERO)
            .build()
            .unwrap();
        let mut focus = FixedFocus {
            answer: Ok(Some(Region { x: 0, y: 0, width: 1, height: 1 })),
            calls: 0,
        };
        let regions = run_focused(config, &mut focus).await;
        assert_eq!(focus.calls, 0);
        assert_eq!(regions, vec![None, None, None]);
    }

    #[tokio::test]
    async fn pause_returns_early_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!pause(Duration::from_secs(3600), &cancel).await);
        assert!(pause(Duration::from_millis(1), &CancellationToken::new()).await);
    }
}
