//! Upload boundary: publish a finished document and return its URL.
//!
//! [`GoogleDocsUploader`] talks to the Google Docs REST API with an OAuth
//! access token that was obtained beforehand and stored in `token.json`
//! (the `token` field of an authorised-user credentials file). Running the
//! OAuth consent flow or refreshing an expired token is not done here.

use crate::error::ReaderError;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Default location of the stored OAuth token.
pub const DEFAULT_TOKEN_PATH: &str = "token.json";

const DOCS_API: &str = "https://docs.googleapis.com/v1/documents";

/// Publishes a titled text document.
pub trait DocumentUploader {
    /// Fail fast, before any capture work, if the uploader cannot run.
    fn ensure_ready(&self) -> Result<(), ReaderError>;

    /// Create a document holding `text` and return its URL.
    fn upload(
        &self,
        title: &str,
        text: &str,
    ) -> impl Future<Output = Result<String, ReaderError>> + Send;
}

#[derive(Debug, Deserialize)]
struct StoredToken {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedDocument {
    document_id: String,
}

/// [`DocumentUploader`] backed by the Google Docs API.
#[derive(Debug, Clone)]
pub struct GoogleDocsUploader {
    token_path: PathBuf,
    endpoint: String,
    timeout: Duration,
}

impl Default for GoogleDocsUploader {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_PATH)
    }
}

impl GoogleDocsUploader {
    pub fn new(token_path: impl Into<PathBuf>) -> Self {
        Self {
            token_path: token_path.into(),
            endpoint: DOCS_API.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Point the uploader at a different Docs API base URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    fn access_token(&self) -> Result<String, ReaderError> {
        self.ensure_ready()?;
        let raw = std::fs::read_to_string(&self.token_path).map_err(|e| {
            ReaderError::UploadFailed(format!("reading {}: {e}", self.token_path.display()))
        })?;
        parse_token(&raw)
    }
}

impl DocumentUploader for GoogleDocsUploader {
    fn ensure_ready(&self) -> Result<(), ReaderError> {
        if self.token_path.is_file() {
            Ok(())
        } else {
            Err(ReaderError::CredentialsMissing {
                path: self.token_path.clone(),
                hint: "Authorise the Google Docs API once and store the token before uploading."
                    .into(),
            })
        }
    }

    async fn upload(&self, title: &str, text: &str) -> Result<String, ReaderError> {
        let token = self.access_token()?;
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ReaderError::UploadFailed(e.to_string()))?;

        let response = client
            .post(&self.endpoint)
            .bearer_auth(&token)
            .json(&json!({ "title": title }))
            .send()
            .await
            .map_err(|e| ReaderError::UploadFailed(format!("create document: {e}")))?;
        let response = check_status(response, "create document").await?;
        let created: CreatedDocument = response
            .json()
            .await
            .map_err(|e| ReaderError::UploadFailed(format!("create document: {e}")))?;
        info!("Document created: {}", title);

        let response = client
            .post(format!("{}/{}:batchUpdate", self.endpoint, created.document_id))
            .bearer_auth(&token)
            .json(&insert_text_request(text))
            .send()
            .await
            .map_err(|e| ReaderError::UploadFailed(format!("insert text: {e}")))?;
        check_status(response, "insert text").await?;

        let url = document_url(&created.document_id);
        info!("Upload complete: {}", url);
        Ok(url)
    }
}

async fn check_status(
    response: reqwest::Response,
    step: &str,
) -> Result<reqwest::Response, ReaderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ReaderError::UploadFailed(format!("{step}: HTTP {status}: {}", body.trim())))
}

fn parse_token(raw: &str) -> Result<String, ReaderError> {
    let stored: StoredToken = serde_json::from_str(raw)
        .map_err(|e| ReaderError::UploadFailed(format!("token file is not valid: {e}")))?;
    if stored.token.trim().is_empty() {
        return Err(ReaderError::UploadFailed("token file holds an empty token".into()));
    }
    Ok(stored.token)
}

/// The whole text is inserted at the start of the new document body.
fn insert_text_request(text: &str) -> serde_json::Value {
    json!({
        "requests": [
            { "insertText": { "location": { "index": 1 }, "text": text } }
        ]
    })
}

pub fn document_url(document_id: &str) -> String {
    format!("https://docs.google.com/document/d/{document_id}/edit")
}
