//! Page turning by synthetic arrow-key presses.
//!
//! macOS goes through System Events (`osascript`), Linux/X11 through
//! `xdotool`. Both require the reader window to have keyboard focus.

use super::{run, DeviceError, PageAdvancer};
use crate::config::PageDirection;
use tracing::debug;

/// [`PageAdvancer`] that presses the left or right arrow key.
#[derive(Debug, Clone)]
pub struct KeystrokeAdvancer {
    direction: PageDirection,
}

impl KeystrokeAdvancer {
    pub fn new(direction: PageDirection) -> Self {
        Self { direction }
    }
}

impl PageAdvancer for KeystrokeAdvancer {
    fn advance(&mut self) -> Result<(), DeviceError> {
        let (program, args) = key_command(self.direction)?;
        debug!("Pressing {:?} via {}", self.direction, program);
        run(program, &args).map(|_| ())
    }
}

/// AppleScript key codes for the arrow keys.
fn mac_key_code(direction: PageDirection) -> u8 {
    match direction {
        PageDirection::Left => 123,
        PageDirection::Right => 124,
    }
}

fn xdotool_key(direction: PageDirection) -> &'static str {
    match direction {
        PageDirection::Left => "Left",
        PageDirection::Right => "Right",
    }
}

fn key_command(direction: PageDirection) -> Result<(&'static str, Vec<String>), DeviceError> {
    if cfg!(target_os = "macos") {
        let script = format!(
            "tell application \"System Events\" to key code {}",
            mac_key_code(direction)
        );
        Ok(("osascript", vec!["-e".into(), script]))
    } else if cfg!(target_os = "linux") {
        Ok(("xdotool", vec!["key".into(), xdotool_key(direction).into()]))
    } else {
        Err(DeviceError::Unsupported("synthetic key presses".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrow_key_codes() {
        assert_eq!(mac_key_code(PageDirection::Left), 123);
        assert_eq!(mac_key_code(PageDirection::Right), 124);
        assert_eq!(xdotool_key(PageDirection::Right), "Right");
    }

    #[test]
    fn missing_helper_is_a_command_error() {
        let err = run("reader2md-no-such-helper", &[]).unwrap_err();
        assert!(matches!(err, DeviceError::Command { .. }));
    }

}
