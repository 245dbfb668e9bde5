//! Session-scoped recognition cache.
//!
//! Recognition is the slowest step of the whole run, and the text detector
//! already recognises every page while capturing. The cache keeps those
//! results, keyed by the page image's storage path, so the transcription
//! stage (possibly in a later, separate process) never recognises a page
//! twice.
//!
//! Rules:
//! - **First writer wins.** Once a key is present its text is fixed for the
//!   rest of the session; a second recognition pass never replaces it.
//! - **Raw text only.** Values are exactly what the engine returned. Every
//!   consumer still runs [`crate::normalize::normalize`] on a hit.
//! - **Flat JSON on disk.** `{ "<image path>": "<raw text>", … }`, UTF-8,
//!   pretty-printed so two runs can be diffed.

use crate::error::ReaderError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Mapping from image storage path to raw recognised text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OcrCache {
    entries: BTreeMap<String, String>,
}

/// Canonical cache key for an image path.
pub fn cache_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl OcrCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw text recorded for `key`, if any.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Record `text` under `key` unless the key is already present.
    ///
    /// Returns `true` when the entry was inserted.
    pub fn record(&mut self, key: impl Into<String>, text: impl Into<String>) -> bool {
        let key = key.into();
        if self.entries.contains_key(&key) {
            debug!("cache already holds '{}', keeping first recognition", key);
            return false;
        }
        self.entries.insert(key, text.into());
        true
    }

    /// Drop the entry of a page that was discarded from the session.
    ///
    /// Only the capture loop calls this, for the terminal duplicate page whose
    /// image no longer exists.
    pub(crate) fn discard(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(key, raw text)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Write the whole mapping to `path` (temp file + rename).
    pub fn persist(&self, path: &Path) -> Result<(), ReaderError> {
        let write_err = |detail: String| ReaderError::CacheWriteFailed {
            path: path.to_path_buf(),
            detail,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| write_err(e.to_string()))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| write_err(e.to_string()))?;
        tmp.persist(path).map_err(|e| write_err(e.error.to_string()))?;

        info!("Recognition cache saved: {} ({} pages)", path.display(), self.len());
        Ok(())
    }

    /// Read a mapping previously written by [`Self::persist`].
    pub fn load(path: &Path) -> Result<Self, ReaderError> {
        let read_err = |detail: String| ReaderError::CacheReadFailed {
            path: path.to_path_buf(),
            detail,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| read_err(e.to_string()))?;
        let cache: OcrCache = serde_json::from_str(&raw).map_err(|e| read_err(e.to_string()))?;
        info!("Loaded cached recognition results ({} pages)", cache.len());
        Ok(cache)
    }

    /// Like [`Self::load`], but a missing file yields an empty cache.
    pub fn load_if_present(path: &Path) -> Result<Self, ReaderError> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No recognition cache at {}", path.display());
            Ok(Self::new())
        }
    }
}
