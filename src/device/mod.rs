//! External collaborators of the capture loop.
//!
//! The loop never touches the OS directly. It talks to three narrow
//! capabilities, each a trait so tests can substitute in-memory doubles:
//!
//! ```text
//! FocusProvider ──▶ Option<Region>      best-effort, once per session
//! ImageSource   ──▶ DynamicImage        one screenshot per page
//! PageAdvancer  ──▶ ()                  one page-turn signal per page
//! ```
//!
//! Platform differences live entirely in the implementations:
//! [`screen::ScreenSource`] (xcap), [`keys::KeystrokeAdvancer`] and
//! [`focus::AppleScriptFocus`] (osascript on macOS, xdotool on Linux for keys).

pub mod focus;
pub mod keys;
pub mod screen;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Command;
use thiserror::Error;

/// Failure inside a collaborator. The capture loop decides whether it is
/// fatal (capture, advance) or degradable (focus).
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The capability has no implementation on this platform.
    #[error("not supported on this platform: {0}")]
    Unsupported(String),

    /// A helper process could not be started or exited unsuccessfully.
    #[error("`{program}` failed: {detail}")]
    Command { program: String, detail: String },

    /// The helper answered, but not in the expected shape.
    #[error("unexpected output from `{program}`: {output:?}")]
    Parse { program: String, output: String },

    /// The screen could not be captured.
    #[error("screen capture failed: {0}")]
    Capture(String),
}

/// Window bounds in screen points, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x={}, y={}, w={}, h={}", self.x, self.y, self.width, self.height)
    }
}

/// Produces an image of the page currently on screen.
pub trait ImageSource {
    /// Capture `region`, or the whole primary display when `None`.
    fn capture(&mut self, region: Option<Region>) -> Result<DynamicImage, DeviceError>;
}

/// Sends one page-turn signal. The settle delay is enforced by the caller so
/// that it can be interrupted.
pub trait PageAdvancer {
    fn advance(&mut self) -> Result<(), DeviceError>;
}

/// Brings the reader window to the front and reports its bounds.
///
/// `Ok(None)` means the window was focused but its bounds are unknown; the
/// session then captures the full screen.
pub trait FocusProvider {
    fn focus(&mut self) -> Result<Option<Region>, DeviceError>;
}

/// Run a helper program, returning its trimmed stdout.
pub(crate) fn run(program: &str, args: &[String]) -> Result<String, DeviceError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| DeviceError::Command {
            program: program.to_string(),
            detail: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(DeviceError::Command {
            program: program.to_string(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
