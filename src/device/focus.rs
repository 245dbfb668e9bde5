//! Window focusing and bounds discovery through AppleScript.
//!
//! Only macOS exposes this via System Events. Everywhere else
//! [`AppleScriptFocus::focus`] reports [`DeviceError::Unsupported`] and the
//! session falls back to full-screen capture.

use super::{run, DeviceError, FocusProvider, Region};
use std::time::Duration;
use tracing::{info, warn};

/// Pause after raising the window so multi-display setups finish switching.
const RAISE_SETTLE: Duration = Duration::from_secs(1);

/// [`FocusProvider`] that raises a named application's front window.
#[derive(Debug, Clone)]
pub struct AppleScriptFocus {
    app_name: String,
}

impl AppleScriptFocus {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    fn system_events(&self, command: &str) -> Result<String, DeviceError> {
        let script = format!(
            "tell application \"System Events\" to tell process \"{}\" to {}",
            self.app_name, command
        );
        run("osascript", &["-e".to_string(), script])
    }

    fn window_bounds(&self) -> Result<Region, DeviceError> {
        let position = self.system_events("get position of window 1")?;
        let size = self.system_events("get size of window 1")?;
        let parse_err = |output: &str| DeviceError::Parse {
            program: "osascript".into(),
            output: output.to_string(),
        };
        let (x, y) = parse_pair(&position).ok_or_else(|| parse_err(&position))?;
        let (w, h) = parse_pair(&size).ok_or_else(|| parse_err(&size))?;
        if w <= 0 || h <= 0 {
            return Err(parse_err(&size));
        }
        Ok(Region {
            x,
            y,
            width: w as u32,
            height: h as u32,
        })
    }
}

impl FocusProvider for AppleScriptFocus {
    fn focus(&mut self) -> Result<Option<Region>, DeviceError> {
        if !cfg!(target_os = "macos") {
            return Err(DeviceError::Unsupported("auto-focus (macOS only)".into()));
        }

        self.system_events("set frontmost to true")?;
        std::thread::sleep(RAISE_SETTLE);
        info!("Focused on {} app", self.app_name);

        match self.window_bounds() {
            Ok(region) => {
                info!("Window bounds: {}", region);
                Ok(Some(region))
            }
            Err(e) => {
                warn!("Could not get window bounds: {}", e);
                Ok(None)
            }
        }
    }
}

/// Parse AppleScript's `"12, 34"` list rendering.
fn parse_pair(s: &str) -> Option<(i32, i32)> {
    let (a, b) = s.split_once(',')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}
