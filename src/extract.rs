//! Top-level processing entry points.
//!
//! A capture session only produces page images (and, with text detection, a
//! recognition cache). These functions turn pages into a finished document:
//!
//! * [`transcribe_session`]: literal text of a just-captured session
//! * [`assemble_from_dir`] : the same, later, from a staging directory on disk
//! * [`summarize_images`]  : per-page bullet summaries from a vision model
//! * [`write_document`]    : atomic write of the result
//!
//! Each entry point takes a [`CancellationToken`] checked between pages;
//! cancelling it returns [`ReaderError::Interrupted`]. Per-page failures
//! never abort a run; they are reported in
//! [`crate::output::PageText::error`] and counted in [`ExtractionStats`].

use crate::cache::OcrCache;
use crate::config::{PageMarker, Script, CACHE_FILE_NAME};
use crate::document::{Document, DocumentPage};
use crate::error::ReaderError;
use crate::ocr::Recognizer;
use crate::output::{ExtractionOutput, ExtractionStats};
use crate::pipeline::summarize::Summarizer;
use crate::pipeline::transcribe::transcribe_pages;
use crate::progress::ProgressCallback;
use crate::session::CaptureSession;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Name of the transcription document written into the staging directory.
pub const TRANSCRIPT_FILE_NAME: &str = "output.md";

/// Name of the summary document written into the staging directory.
pub const SUMMARY_FILE_NAME: &str = "summary.md";

/// Transcribe every page of a finished session and assemble the document.
///
/// Pages already recognised during capture are served from the session's
/// cache. Newly recognised pages are added to a copy of that cache, which is
/// written back to the staging directory when it grew, also when the run
/// is interrupted.
pub fn transcribe_session(
    session: &CaptureSession,
    recognizer: &dyn Recognizer,
    title: &str,
    marker: PageMarker,
    cancel: &CancellationToken,
    progress: Option<&ProgressCallback>,
) -> Result<ExtractionOutput, ReaderError> {
    let pages: Vec<(usize, PathBuf)> = session
        .pages()
        .iter()
        .map(|p| (p.ordinal, p.image_path.clone()))
        .collect();
    let mut cache = session.cache().clone();
    let output = transcribe(
        &pages,
        &mut cache,
        recognizer,
        session.config().script(),
        title,
        marker,
        cancel,
        progress,
    );
    if cache.len() > session.cache().len() {
        cache.persist(&session.config().cache_path())?;
    }
    output
}

/// Rebuild the transcription of a staging directory written by an earlier
/// capture: `page_NNNN.png` images plus an optional `ocr_results.json`.
pub fn assemble_from_dir(
    dir: &Path,
    recognizer: &dyn Recognizer,
    script: Script,
    title: &str,
    marker: PageMarker,
    cancel: &CancellationToken,
    progress: Option<&ProgressCallback>,
) -> Result<ExtractionOutput, ReaderError> {
    let pages = list_page_images(dir)?;
    info!("Found {} page images in {}", pages.len(), dir.display());

    let cache_path = dir.join(CACHE_FILE_NAME);
    let mut cache = OcrCache::load_if_present(&cache_path)?;
    let cached = cache.len();
    let output = transcribe(
        &pages, &mut cache, recognizer, script, title, marker, cancel, progress,
    );
    if cache.len() > cached {
        cache.persist(&cache_path)?;
    }
    output
}

#[allow(clippy::too_many_arguments)]
fn transcribe(
    pages: &[(usize, PathBuf)],
    cache: &mut OcrCache,
    recognizer: &dyn Recognizer,
    script: Script,
    title: &str,
    marker: PageMarker,
    cancel: &CancellationToken,
    progress: Option<&ProgressCallback>,
) -> Result<ExtractionOutput, ReaderError> {
    let start = Instant::now();
    if let Some(cb) = progress {
        cb.on_processing_start(pages.len());
    }

    let texts = transcribe_pages(pages, cache, recognizer, script, cancel, progress)?;

    let mut document = Document::new(title);
    for page in &texts {
        document.push_page(page.page_num, page.text.clone());
    }
    let markdown = document.render(marker);
    let stats = ExtractionStats::from_pages(&texts, start.elapsed().as_millis() as u64);

    info!(
        "Transcription complete: {}/{} pages with text ({} from cache, {} failed), {} chars",
        stats.processed_pages,
        stats.total_pages,
        stats.cache_hits,
        stats.failed_pages,
        markdown.chars().count()
    );
    if let Some(cb) = progress {
        cb.on_processing_complete(stats.total_pages, stats.processed_pages);
    }

    Ok(ExtractionOutput {
        markdown,
        pages: texts,
        stats,
    })
}

/// Summarise page images and assemble the summary document.
///
/// With `link_images`, each page block records the image it came from.
pub async fn summarize_images(
    summarizer: &Summarizer,
    pages: &[(usize, PathBuf)],
    title: &str,
    link_images: bool,
    cancel: &CancellationToken,
    progress: Option<&ProgressCallback>,
) -> Result<ExtractionOutput, ReaderError> {
    let start = Instant::now();
    if let Some(cb) = progress {
        cb.on_processing_start(pages.len());
    }

    let summaries = summarizer.summarize_pages(pages, cancel, progress).await?;

    let mut document = Document::new(title).with_preamble(summary_preamble(
        summaries.len(),
        &summarizer.config().model,
    ));
    for (summary, (_, image)) in summaries.iter().zip(pages) {
        document.push(DocumentPage {
            ordinal: summary.page_num,
            text: summary.text.clone(),
            image: link_images.then(|| image.clone()),
        });
    }
    let markdown = document.render(PageMarker::Comment);
    let stats = ExtractionStats::from_pages(&summaries, start.elapsed().as_millis() as u64);

    info!(
        "Summaries complete: {}/{} pages, {} in / {} out tokens",
        stats.processed_pages,
        stats.total_pages,
        stats.total_input_tokens,
        stats.total_output_tokens
    );
    if let Some(cb) = progress {
        cb.on_processing_complete(stats.total_pages, stats.processed_pages);
    }

    Ok(ExtractionOutput {
        markdown,
        pages: summaries,
        stats,
    })
}

fn summary_preamble(total_pages: usize, model: &str) -> String {
    format!(
        "**Total pages**: {total_pages}\n\n\
         **Method**: page images summarised directly by {model}\n\n\
         **Format**: bullet points (optimised for retrieval)"
    )
}

static RE_PAGE_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^page_(\d+)\.png$").unwrap());

/// Page images in a staging directory, ordered by ordinal.
pub fn list_page_images(dir: &Path) -> Result<Vec<(usize, PathBuf)>, ReaderError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ReaderError::StagingDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut pages = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ReaderError::StagingDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name();
        let Some(caps) = name.to_str().and_then(|n| RE_PAGE_FILE.captures(n)) else {
            continue;
        };
        match caps[1].parse::<usize>() {
            Ok(ordinal) if ordinal > 0 => pages.push((ordinal, dir.join(&name))),
            _ => debug!("Skipping {:?}", name),
        }
    }
    pages.sort_by_key(|(ordinal, _)| *ordinal);
    Ok(pages)
}

/// Write a document, creating parent directories.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn write_document(path: &Path, text: &str) -> Result<(), ReaderError> {
    let write_err = |source: std::io::Error| ReaderError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, text).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    info!("Saved {}", path.display());
    Ok(())
}
