//! Summary stage: page image → bullet-point summary from a vision model.
//!
//! This stage replaces recognition + normalisation for the summary variant:
//! the model reads the page image directly. Prompt wording lives in
//! [`crate::prompts`].
//!
//! ## Retry Strategy
//!
//! Rate-limit and overload errors are transient. Failed calls are retried
//! with exponential backoff (`retry_backoff_ms * 2^attempt`); once retries
//! are exhausted the page gets a placeholder text and a
//! [`PageError::SummaryFailed`], and the run moves on.

use crate::error::{PageError, ReaderError};
use crate::output::PageText;
use crate::pipeline::encode::encode_page_file;
use crate::progress::ProgressCallback;
use crate::prompts::{summary_failed_placeholder, summary_request, SUMMARY_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Environment variable holding the Gemini API key.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Provider used for summaries.
pub const SUMMARY_PROVIDER: &str = "gemini";

/// Default summary model.
pub const DEFAULT_SUMMARY_MODEL: &str = "gemini-2.5-flash";

/// Tunables for the summary stage.
#[derive(Debug, Clone)]
pub struct SummaryConfig {
    /// Model identifier. Default: `gemini-2.5-flash`.
    pub model: String,
    /// Language the summary is written in. Default: `Japanese`.
    pub language: String,
    /// Default: 0.2.
    pub temperature: f32,
    /// Default: 1024.
    pub max_tokens: usize,
    /// Default: 3.
    pub max_retries: u32,
    /// Default: 500 ms.
    pub retry_backoff_ms: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_SUMMARY_MODEL.to_string(),
            language: "Japanese".to_string(),
            temperature: 0.2,
            max_tokens: 1024,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

/// Summarises page images through an `edgequake-llm` provider.
pub struct Summarizer {
    provider: Arc<dyn LLMProvider>,
    config: SummaryConfig,
}

impl Summarizer {
    /// Build the Gemini provider from the environment.
    ///
    /// A missing `GEMINI_API_KEY` is fatal and is reported before any
    /// capture work starts.
    pub fn from_env(config: SummaryConfig) -> Result<Self, ReaderError> {
        require_api_key(std::env::var(API_KEY_VAR).ok())?;
        let provider = ProviderFactory::create_llm_provider(SUMMARY_PROVIDER, &config.model)
            .map_err(|e| ReaderError::ProviderNotConfigured {
                provider: SUMMARY_PROVIDER.to_string(),
                hint: format!("{e}"),
            })?;
        info!("Summary provider: {} / {}", SUMMARY_PROVIDER, config.model);
        Ok(Self { provider, config })
    }

    /// Use an already constructed provider.
    pub fn with_provider(provider: Arc<dyn LLMProvider>, config: SummaryConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &SummaryConfig {
        &self.config
    }

    /// Summarise one page. Never fails: errors become a placeholder text.
    pub async fn summarize_page(&self, page_num: usize, image: &Path) -> PageText {
        let start = Instant::now();

        let image_data = match encode_page_file(image) {
            Ok(data) => data,
            Err(e) => {
                warn!("Page {}: could not load {}: {}", page_num, image.display(), e);
                return failed_page(page_num, 0, e.to_string(), start);
            }
        };

        let messages = vec![
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user_with_images(
                &summary_request(page_num, &self.config.language),
                vec![image_data],
            ),
        ];
        let options = build_options(&self.config);

        let mut last_err: Option<String> = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Page {}: retry {}/{} after {}ms",
                    page_num, attempt, self.config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "Page {}: {} input tokens, {} output tokens, {:?}",
                        page_num,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    let mut page = PageText::new(page_num, response.content.trim().to_string());
                    page.input_tokens = response.prompt_tokens as usize;
                    page.output_tokens = response.completion_tokens as usize;
                    page.duration_ms = start.elapsed().as_millis() as u64;
                    page.retries = attempt as u8;
                    return page;
                }
                Err(e) => {
                    warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, e);
                    last_err = Some(e.to_string());
                }
            }
        }

        failed_page(
            page_num,
            self.config.max_retries as u8,
            last_err.unwrap_or_else(|| "Unknown error".to_string()),
            start,
        )
    }

    /// Summarise pages sequentially, in order.
    ///
    /// Cancelling `cancel` abandons the in-flight call and returns
    /// [`ReaderError::Interrupted`].
    pub async fn summarize_pages(
        &self,
        pages: &[(usize, PathBuf)],
        cancel: &CancellationToken,
        progress: Option<&ProgressCallback>,
    ) -> Result<Vec<PageText>, ReaderError> {
        let total = pages.len();
        let mut results = Vec::with_capacity(total);
        for (page_num, image) in pages {
            if let Some(cb) = progress {
                cb.on_page_start(*page_num, total);
            }
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Summaries interrupted after {}/{} pages", results.len(), total);
                    return Err(ReaderError::Interrupted {
                        processed: results.len(),
                        total,
                    });
                }
                page = self.summarize_page(*page_num, image) => page,
            };
            if let Some(cb) = progress {
                match &result.error {
                    None => cb.on_page_complete(*page_num, total, result.text.len()),
                    Some(e) => cb.on_page_error(*page_num, total, &e.to_string()),
                }
            }
            results.push(result);
        }
        Ok(results)
    }
}

fn require_api_key(key: Option<String>) -> Result<(), ReaderError> {
    match key {
        Some(k) if !k.trim().is_empty() => Ok(()),
        _ => Err(ReaderError::ProviderNotConfigured {
            provider: SUMMARY_PROVIDER.to_string(),
            hint: format!("{API_KEY_VAR} environment variable not set. Export it before running a summary."),
        }),
    }
}

fn failed_page(page_num: usize, retries: u8, detail: String, start: Instant) -> PageText {
    let mut page = PageText::new(page_num, summary_failed_placeholder(page_num, &detail));
    page.duration_ms = start.elapsed().as_millis() as u64;
    page.retries = retries;
    page.error = Some(PageError::SummaryFailed {
        page: page_num,
        retries,
        detail,
    });
    page
}

fn build_options(config: &SummaryConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
