//! Text recognition boundary.
//!
//! The recognition engine is an external collaborator: this module only
//! defines the [`Recognizer`] capability and a thin wrapper around the
//! `tesseract` command-line tool. Output is returned raw (surrounding
//! whitespace trimmed); cleaning is [`crate::normalize`]'s job.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

/// A recognition failure for a single image.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The engine binary could not be started.
    #[error("could not run `{binary}`: {detail}")]
    Spawn { binary: String, detail: String },

    /// The engine ran but reported an error.
    #[error("recognition of '{path}' failed: {detail}")]
    Engine { path: PathBuf, detail: String },
}

/// Recognises the text on a stored page image.
pub trait Recognizer {
    fn recognize(&self, image: &Path) -> Result<String, OcrError>;
}

/// [`Recognizer`] that shells out to the Tesseract CLI.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: String,
    language: String,
    tessdata: Option<PathBuf>,
}

impl TesseractRecognizer {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: language.into(),
            tessdata: None,
        }
    }

    /// Use a specific `tesseract` executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Point Tesseract at a custom `tessdata` directory.
    pub fn with_tessdata(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tessdata = Some(dir.into());
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// First line of `tesseract --version`, to check the engine is installed.
    pub fn version(&self) -> Result<String, OcrError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .map_err(|e| self.spawn_err(e))?;
        // Older releases print the banner on stderr.
        let text = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        Ok(text.lines().next().unwrap_or("").trim().to_string())
    }

    fn spawn_err(&self, e: std::io::Error) -> OcrError {
        OcrError::Spawn {
            binary: self.binary.clone(),
            detail: e.to_string(),
        }
    }
}

impl Recognizer for TesseractRecognizer {
    fn recognize(&self, image: &Path) -> Result<String, OcrError> {
        let start = Instant::now();
        let mut cmd = Command::new(&self.binary);
        cmd.arg(image).arg("stdout").arg("-l").arg(&self.language);
        if let Some(dir) = &self.tessdata {
            cmd.env("TESSDATA_PREFIX", dir);
        }

        let output = cmd.output().map_err(|e| self.spawn_err(e))?;
        if !output.status.success() {
            return Err(OcrError::Engine {
                path: image.to_path_buf(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(
            "Recognised {} chars from {} in {}ms",
            text.chars().count(),
            image.display(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let r = TesseractRecognizer::new("eng").with_binary("reader2md-no-such-tesseract");
        assert!(matches!(
            r.recognize(Path::new("page_0001.png")),
            Err(OcrError::Spawn { .. })
        ));
        assert!(r.version().is_err());
    }

    #[test]
    fn language_is_kept() {
        assert_eq!(TesseractRecognizer::new("jpn_vert").language(), "jpn_vert");
    }
}
