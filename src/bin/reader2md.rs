//! CLI binary for reader2md.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `CaptureConfig`, wires up the real screen, keyboard, focus and OCR
//! collaborators, and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use reader2md::device::focus::AppleScriptFocus;
use reader2md::device::keys::KeystrokeAdvancer;
use reader2md::device::screen::ScreenSource;
use reader2md::device::FocusProvider;
use reader2md::extract::{SUMMARY_FILE_NAME, TRANSCRIPT_FILE_NAME};
use reader2md::prompts::language_name;
use reader2md::{
    assemble_from_dir, capture_session, summarize_images, transcribe_session, write_document,
    CaptureConfig, CaptureDevices, CaptureSession, DetectionStrategy, DocumentUploader,
    GoogleDocsUploader, MeanHasher, PageDirection, PageMarker, ProgressCallback,
    ReaderError, ReaderProgressCallback, Script, Summarizer, SummaryConfig, TesseractRecognizer,
};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while capturing (the page count is unknown), then a bar while
/// pages are transcribed or summarised.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Waiting for the reader window…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl ReaderProgressCallback for CliProgressCallback {
    fn on_capture_start(&self, max_pages: usize) {
        self.bar.set_prefix("Capturing");
        self.bar.set_message(format!("up to {max_pages} pages"));
    }

    fn on_page_captured(&self, ordinal: usize, _max_pages: usize) {
        self.bar.set_message(format!("page {ordinal}"));
    }

    fn on_end_detected(&self, last_page: usize, signal: &str) {
        self.bar.println(format!(
            "{} End of book after page {}  {}",
            cyan("◆"),
            bold(&last_page.to_string()),
            dim(signal)
        ));
    }

    fn on_capture_complete(&self, captured: usize) {
        self.bar.println(format!(
            "{} {} pages captured",
            green("✔"),
            bold(&captured.to_string())
        ));
    }

    fn on_processing_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Processing");
        self.bar.reset_eta();
    }

    fn on_page_complete(&self, page_num: usize, total: usize, text_len: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{text_len:>5} bytes")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_processing_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {}/{} pages with text",
                green("✔"),
                bold(&success_count.to_string()),
                total_pages
            );
        } else {
            eprintln!(
                "{} {}/{} pages  ({} failed)",
                cyan("⚠"),
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Capture a Japanese book and save Markdown locally
  reader2md extract --title "吾輩は猫である" --save-markdown neko.md

  # Right-to-left vertical text, capture at most 400 pages
  reader2md extract --title "Book" --page-direction left --lang jpn_vert --max-pages 400

  # English book, image-hash end detection, upload to Google Docs
  reader2md extract --title "Book" --lang eng --detection hash --similarity-threshold 1

  # Per-page bullet summaries with Gemini
  reader2md summarize --title "Book" --save-summary book-summary.md

  # Rebuild the Markdown from a kept staging directory
  reader2md assemble --dir output --title "Book" -o book.md

  # Check that the reader window can be focused and measured
  reader2md probe-focus --app-name Kindle

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY   Gemini API key (summarize only)
  RUST_LOG         Override the log filter (e.g. reader2md=debug)
  READER2MD_*      Every flag can also be set from the environment

SETUP:
  macOS: grant Screen Recording and Accessibility permission to your terminal.
  Linux: install xdotool; run under X11.
  Install Tesseract with the language data you need (e.g. jpn, jpn_vert).
  Uploading needs token.json holding a Google OAuth access token.
"#;

/// Capture an e-reader window page by page into Markdown or summaries.
#[derive(Parser, Debug)]
#[command(
    name = "reader2md",
    version,
    about = "Capture an e-reader window page by page into Markdown or per-page summaries",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "READER2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "READER2MD_QUIET")]
    quiet: bool,

    /// Disable the progress display.
    #[arg(long, global = true, env = "READER2MD_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture pages, OCR them, and save or upload the Markdown.
    Extract(ExtractArgs),
    /// Capture pages and summarise each page image with Gemini.
    Summarize(SummarizeArgs),
    /// Rebuild the Markdown from an existing staging directory.
    Assemble(AssembleArgs),
    /// Focus the reader window and report its bounds.
    ProbeFocus(ProbeArgs),
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Document title.
    #[arg(long, env = "READER2MD_TITLE", default_value = "Kindle Book")]
    title: String,

    /// Staging directory for page images and the OCR cache.
    #[arg(long, env = "READER2MD_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Seconds to wait after each page turn.
    #[arg(long, env = "READER2MD_DELAY", default_value_t = 1.5)]
    delay: f64,

    /// Maximum number of pages to capture.
    #[arg(long, env = "READER2MD_MAX_PAGES", default_value_t = 1000)]
    max_pages: usize,

    /// Tesseract language tag (jpn, jpn_vert, eng, …).
    #[arg(long, env = "READER2MD_LANG", default_value = "jpn")]
    lang: String,

    /// Keep captured images after completion.
    #[arg(long, env = "READER2MD_KEEP_IMAGES")]
    keep_images: bool,

    /// Do not bring the reader window to the front automatically.
    #[arg(long, env = "READER2MD_NO_AUTO_FOCUS")]
    no_auto_focus: bool,

    /// Application to focus and capture.
    #[arg(long, env = "READER2MD_APP_NAME", default_value = "Kindle")]
    app_name: String,

    /// Page-turn key: left (right-to-left books) or right.
    #[arg(long, env = "READER2MD_PAGE_DIRECTION", value_enum, default_value = "right")]
    page_direction: DirectionArg,

    /// End-of-book signal: OCR text similarity or image hash.
    #[arg(long, env = "READER2MD_DETECTION", value_enum, default_value = "text")]
    detection: DetectionArg,

    /// Image-hash end-detection threshold, 0–10 (smaller is stricter).
    #[arg(long, env = "READER2MD_SIMILARITY_THRESHOLD", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(0..=10))]
    similarity_threshold: u32,

    /// Text-similarity ratio above which two pages count as the same.
    #[arg(long, env = "READER2MD_TEXT_THRESHOLD", default_value_t = DetectionStrategy::DEFAULT_MIN_RATIO)]
    text_threshold: f64,

    /// Pages with this many characters or fewer are never compared.
    #[arg(long, env = "READER2MD_MIN_TEXT_CHARS", default_value_t = DetectionStrategy::DEFAULT_MIN_CHARS)]
    min_text_chars: usize,

    /// Capture up to --max-pages without end detection.
    #[arg(long, env = "READER2MD_DISABLE_END_DETECTION")]
    disable_end_detection: bool,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    #[command(flatten)]
    capture: CaptureArgs,

    /// Omit the `## Page N` markers between pages.
    #[arg(long, env = "READER2MD_NO_PAGE_SEPARATORS")]
    no_page_separators: bool,

    /// Save the Markdown to this path and skip the upload.
    #[arg(long, env = "READER2MD_SAVE_MARKDOWN")]
    save_markdown: Option<PathBuf>,

    /// OAuth token file for Google Docs.
    #[arg(long, env = "READER2MD_TOKEN", default_value = "token.json")]
    token: PathBuf,
}

#[derive(Args, Debug)]
struct SummarizeArgs {
    #[command(flatten)]
    capture: CaptureArgs,

    /// Save the summary Markdown to this path.
    #[arg(long, env = "READER2MD_SAVE_SUMMARY")]
    save_summary: Option<PathBuf>,

    /// Also upload the summary to Google Docs.
    #[arg(long, env = "READER2MD_UPLOAD_TO_DOCS")]
    upload_to_docs: bool,

    /// Gemini model used for the summaries.
    #[arg(long, env = "READER2MD_GEMINI_MODEL", default_value = "gemini-2.5-flash")]
    gemini_model: String,

    /// Record each page's image path in the summary.
    #[arg(long, env = "READER2MD_LINK_IMAGES")]
    link_images: bool,

    /// OAuth token file for Google Docs.
    #[arg(long, env = "READER2MD_TOKEN", default_value = "token.json")]
    token: PathBuf,
}

#[derive(Args, Debug)]
struct AssembleArgs {
    /// Staging directory holding page_NNNN.png and ocr_results.json.
    #[arg(long, env = "READER2MD_OUTPUT_DIR", default_value = "output")]
    dir: PathBuf,

    /// Document title.
    #[arg(long, env = "READER2MD_TITLE", default_value = "Kindle Book")]
    title: String,

    /// Tesseract language tag.
    #[arg(long, env = "READER2MD_LANG", default_value = "jpn")]
    lang: String,

    /// Omit the `## Page N` markers between pages.
    #[arg(long, env = "READER2MD_NO_PAGE_SEPARATORS")]
    no_page_separators: bool,

    /// Write the Markdown here instead of stdout.
    #[arg(short, long, env = "READER2MD_OUTPUT")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ProbeArgs {
    /// Application to focus.
    #[arg(long, env = "READER2MD_APP_NAME", default_value = "Kindle")]
    app_name: String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DirectionArg {
    Left,
    Right,
}

impl From<DirectionArg> for PageDirection {
    fn from(v: DirectionArg) -> Self {
        match v {
            DirectionArg::Left => PageDirection::Left,
            DirectionArg::Right => PageDirection::Right,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DetectionArg {
    Text,
    Hash,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress display replaces INFO logs; --verbose brings them back.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ReaderProgressCallback>)
    } else {
        None
    };

    // One handler for the whole run: capture, processing and upload all
    // watch the same token.
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match cli.command {
        Command::Extract(args) => run_extract(args, &cancel, progress, cli.quiet).await,
        Command::Summarize(args) => run_summarize(args, &cancel, progress, cli.quiet).await,
        Command::Assemble(args) => run_assemble(args, &cancel, progress).await,
        Command::ProbeFocus(args) => run_probe(args),
    }
}

async fn run_extract(
    args: ExtractArgs,
    cancel: &CancellationToken,
    progress: Option<ProgressCallback>,
    quiet: bool,
) -> Result<()> {
    let config = build_config(&args.capture)?;
    let uploader = GoogleDocsUploader::new(&args.token);
    if args.save_markdown.is_none() {
        uploader.ensure_ready()?;
    }

    let recognizer = TesseractRecognizer::new(config.language.clone());
    let session = capture(config, &recognizer, cancel, progress.clone()).await?;
    if session.is_empty() {
        warn!("No pages captured. Exiting.");
        return Ok(());
    }

    let marker = if args.no_page_separators {
        PageMarker::None
    } else {
        PageMarker::Heading
    };
    let title = args.capture.title.as_str();
    let output = tokio::task::block_in_place(|| {
        transcribe_session(&session, &recognizer, title, marker, cancel, progress.as_ref())
    })
    .context("Transcription failed")?;

    let staged = session.config().output_dir.join(TRANSCRIPT_FILE_NAME);
    write_document(&staged, &output.markdown).await?;

    let destination = if let Some(path) = &args.save_markdown {
        write_document(path, &output.markdown).await?;
        path.display().to_string()
    } else {
        until_cancelled(cancel, uploader.upload(title, &output.markdown))
            .await
            .context("Upload to Google Docs failed")?
    };

    finish(&session, &staged, args.capture.keep_images).await;

    if !quiet {
        eprintln!(
            "{}  {} pages  →  {}",
            green("✔"),
            session.len(),
            bold(&destination)
        );
        eprintln!(
            "   {} from cache  /  {} failed  /  {}ms",
            dim(&output.stats.cache_hits.to_string()),
            dim(&output.stats.failed_pages.to_string()),
            output.stats.total_duration_ms
        );
    }
    Ok(())
}

async fn run_summarize(
    args: SummarizeArgs,
    cancel: &CancellationToken,
    progress: Option<ProgressCallback>,
    quiet: bool,
) -> Result<()> {
    let config = build_config(&args.capture)?;
    let summarizer = Summarizer::from_env(SummaryConfig {
        model: args.gemini_model.clone(),
        language: language_name(&config.language).to_string(),
        ..SummaryConfig::default()
    })?;
    let uploader = GoogleDocsUploader::new(&args.token);
    if args.upload_to_docs {
        uploader.ensure_ready()?;
    }

    let recognizer = TesseractRecognizer::new(config.language.clone());
    let session = capture(config, &recognizer, cancel, progress.clone()).await?;
    if session.is_empty() {
        warn!("No pages captured. Exiting.");
        return Ok(());
    }

    let pages: Vec<(usize, PathBuf)> = session
        .pages()
        .iter()
        .map(|p| (p.ordinal, p.image_path.clone()))
        .collect();
    let title = args.capture.title.as_str();
    let output = summarize_images(
        &summarizer,
        &pages,
        title,
        args.link_images,
        cancel,
        progress.as_ref(),
    )
    .await
    .context("Summarisation failed")?;

    let staged = session.config().output_dir.join(SUMMARY_FILE_NAME);
    write_document(&staged, &output.markdown).await?;
    if let Some(path) = &args.save_summary {
        write_document(path, &output.markdown).await?;
        if !quiet {
            eprintln!("{}  Summary saved to {}", green("✔"), bold(&path.display().to_string()));
        }
    }

    if args.upload_to_docs {
        let summary_title = format!("{title} - Summary");
        let url = until_cancelled(cancel, uploader.upload(&summary_title, &output.markdown))
            .await
            .context("Upload to Google Docs failed")?;
        if !quiet {
            eprintln!("{}  Google Docs URL: {}", green("✔"), bold(&url));
        }
    }

    finish(&session, &staged, args.capture.keep_images).await;

    if !quiet {
        eprintln!(
            "   {} pages  /  {} failed  /  {} tokens in  /  {} tokens out",
            session.len(),
            output.stats.failed_pages,
            dim(&output.stats.total_input_tokens.to_string()),
            dim(&output.stats.total_output_tokens.to_string()),
        );
    }
    Ok(())
}

async fn run_assemble(
    args: AssembleArgs,
    cancel: &CancellationToken,
    progress: Option<ProgressCallback>,
) -> Result<()> {
    let recognizer = TesseractRecognizer::new(args.lang.clone());
    let marker = if args.no_page_separators {
        PageMarker::None
    } else {
        PageMarker::Heading
    };
    let output = tokio::task::block_in_place(|| {
        assemble_from_dir(
            &args.dir,
            &recognizer,
            Script::from_language(&args.lang),
            &args.title,
            marker,
            cancel,
            progress.as_ref(),
        )
    })
    .context("Assembly failed")?;

    match &args.output {
        Some(path) => write_document(path, &output.markdown).await?,
        None => print!("{}", output.markdown),
    }
    Ok(())
}

fn run_probe(args: ProbeArgs) -> Result<()> {
    let mut focus = AppleScriptFocus::new(args.app_name.clone());
    match focus.focus().context("Auto-focus failed")? {
        Some(region) => println!("{}: {}", args.app_name, region),
        None => println!("{}: focused, bounds unavailable (full-screen capture)", args.app_name),
    }
    Ok(())
}

/// Map CLI args to `CaptureConfig`.
fn build_config(args: &CaptureArgs) -> Result<CaptureConfig> {
    let detection = match args.detection {
        DetectionArg::Hash => DetectionStrategy::ImageHash {
            max_distance: args.similarity_threshold,
        },
        DetectionArg::Text => DetectionStrategy::TextSimilarity {
            min_ratio: args.text_threshold,
            min_chars: args.min_text_chars,
        },
    };
    CaptureConfig::builder()
        .output_dir(&args.output_dir)
        .settle_delay_secs(args.delay)
        .max_pages(args.max_pages)
        .detection(detection)
        .end_detection(!args.disable_end_detection)
        .auto_focus(!args.no_auto_focus)
        .app_name(&args.app_name)
        .direction(args.page_direction.into())
        .language(&args.lang)
        .build()
        .context("Invalid configuration")
}

/// Run the capture loop against the real screen and keyboard, stopping
/// cleanly on Ctrl-C.
async fn capture(
    config: CaptureConfig,
    recognizer: &TesseractRecognizer,
    cancel: &CancellationToken,
    progress: Option<ProgressCallback>,
) -> Result<CaptureSession> {
    let mut source = ScreenSource::new();
    let mut advancer = KeystrokeAdvancer::new(config.direction);
    let mut focus = AppleScriptFocus::new(config.app_name.clone());
    let devices = CaptureDevices {
        source: &mut source,
        advancer: &mut advancer,
        focus: Some(&mut focus),
        recognizer,
        fingerprinter: &MeanHasher,
    };
    capture_session(config, devices, cancel, progress)
        .await
        .context("Capture failed")
}

/// First Ctrl-C cancels `cancel` so the running stage stops at its next
/// check; a second one exits at once, even mid-call into OCR.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if cancel.is_cancelled() {
                eprintln!("{} Interrupted again, exiting now", red("✗"));
                std::process::exit(130);
            }
            eprintln!(
                "{} Interrupted, stopping after the current page (Ctrl-C again to quit now)",
                cyan("⚠")
            );
            cancel.cancel();
        }
    });
}

/// Race an upload against Ctrl-C.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    upload: impl Future<Output = Result<T, ReaderError>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => bail!("Interrupted by user before the upload finished"),
        result = upload => Ok(result?),
    }
}

/// Remove captured images and the staged document unless asked to keep them.
async fn finish(session: &CaptureSession, staged: &Path, keep_images: bool) {
    if keep_images {
        return;
    }
    session.cleanup();
    if let Err(e) = tokio::fs::remove_file(staged).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Could not delete {}: {}", staged.display(), e);
        }
    }
}
