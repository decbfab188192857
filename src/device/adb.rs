//! ADB-backed implementation of the [`Device`] trait.
//!
//! Every operation shells out to `adb`, optionally pinned to one device
//! with `-s`. Output is scanned for the adb disconnect markers so that a
//! lost device surfaces as [`DeviceError::Disconnected`] instead of a
//! garbled parse further down.

use base64::{engine::general_purpose::STANDARD, Engine};
use std::process::Command;
use std::thread;
use std::time::Duration;

use super::{
    swipe_endpoints, Device, DeviceError, InstalledApp, Screenshot, SwipeCoords, SwipeDirection,
};

const ADB_KEYBOARD_IME: &str = "com.android.adbkeyboard/.AdbIME";

/// Android device driven over ADB.
pub struct AdbDevice {
    adb_path: String,
    device_id: Option<String>,
    apps: Vec<InstalledApp>,
}

impl AdbDevice {
    /// Create a driver for the given device (or the only connected one)
    /// with the catalog of launchable applications.
    pub fn new(device_id: Option<String>, apps: Vec<InstalledApp>) -> Self {
        Self {
            adb_path: "adb".to_string(),
            device_id,
            apps,
        }
    }

    /// Use a non-default adb binary.
    pub fn with_adb_path(mut self, adb_path: impl Into<String>) -> Self {
        self.adb_path = adb_path.into();
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.adb_path);
        if let Some(id) = &self.device_id {
            cmd.args(["-s", id]);
        }
        cmd
    }

    /// Run an adb command and return combined stdout/stderr as text.
    fn run_adb(&self, args: &[&str]) -> Result<String, DeviceError> {
        let output = self.command().args(args).output()?;
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        self.check_adb_output(&text)?;
        Ok(text)
    }

    /// Run an adb command whose stdout is binary (screencap).
    fn run_adb_raw(&self, args: &[&str]) -> Result<Vec<u8>, DeviceError> {
        let output = self.command().args(args).output()?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        self.check_adb_output(&stderr)?;
        Ok(output.stdout)
    }

    fn check_adb_output(&self, text: &str) -> Result<(), DeviceError> {
        let device = self.device_id.as_deref().unwrap_or("");
        if text.contains(&format!("device '{}' not found", device))
            || text.contains("device not found")
            || text.contains("adb: device offline")
            || text.contains("error: device offline")
        {
            return Err(DeviceError::Disconnected(
                "restart emulator / check USB or WiFi adb connection / restart adb server"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn current_ime(&self) -> Result<String, DeviceError> {
        let out = self.run_adb(&["shell", "settings", "get", "secure", "default_input_method"])?;
        Ok(out.trim().to_string())
    }
}

impl Device for AdbDevice {
    fn screenshot(&mut self) -> Result<Screenshot, DeviceError> {
        // exec-out streams the PNG straight to stdout, no device-side file
        let png = self.run_adb_raw(&["exec-out", "screencap", "-p"])?;
        if png.len() < 8 || &png[0..8] != b"\x89PNG\r\n\x1a\n" {
            return Err(DeviceError::Screenshot(format!(
                "screencap did not return PNG data ({} bytes)",
                png.len()
            )));
        }
        Screenshot::from_png(png)
    }

    fn screen_size(&mut self) -> Result<(u32, u32), DeviceError> {
        let out = self.run_adb(&["shell", "wm", "size"])?;
        parse_screen_size(&out)
    }

    fn tap(&mut self, x: i32, y: i32) -> Result<(), DeviceError> {
        self.run_adb(&["shell", "input", "tap", &x.to_string(), &y.to_string()])?;
        thread::sleep(Duration::from_secs(1));
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> Result<(), DeviceError> {
        // ADB Keyboard (https://github.com/senzhk/ADBKeyBoard) handles
        // unicode text as a base64 broadcast; switch to it, type, restore.
        let original_ime = self.current_ime()?;
        if !original_ime.contains(ADB_KEYBOARD_IME) {
            self.run_adb(&["shell", "ime", "set", ADB_KEYBOARD_IME])?;
            thread::sleep(Duration::from_secs(1));
        }

        self.run_adb(&["shell", "am", "broadcast", "-a", "ADB_CLEAR_TEXT"])?;
        let encoded = STANDARD.encode(text.as_bytes());
        self.run_adb(&[
            "shell", "am", "broadcast", "-a", "ADB_INPUT_B64", "--es", "msg", &encoded,
        ])?;
        thread::sleep(Duration::from_millis(300));
        // submit
        self.run_adb(&["shell", "input", "keyevent", "66"])?;

        if !original_ime.is_empty() && !original_ime.contains(ADB_KEYBOARD_IME) {
            self.run_adb(&["shell", "ime", "set", &original_ime])?;
        }
        Ok(())
    }

    fn swipe(&mut self, direction: SwipeDirection) -> Result<SwipeCoords, DeviceError> {
        let (width, height) = self.screen_size()?;
        let (x1, y1, x2, y2) = swipe_endpoints(direction, width, height);
        self.run_adb(&[
            "shell",
            "input",
            "swipe",
            &x1.to_string(),
            &y1.to_string(),
            &x2.to_string(),
            &y2.to_string(),
            "500",
        ])?;
        Ok((x1, y1, x2, y2))
    }

    fn home(&mut self) -> Result<(), DeviceError> {
        self.run_adb(&["shell", "input", "keyevent", "KEYCODE_HOME"])?;
        Ok(())
    }

    fn is_keyboard_open(&mut self) -> Result<bool, DeviceError> {
        let out = self.run_adb(&["shell", "dumpsys", "input_method"])?;
        Ok(out.contains("mInputShown=true") || out.contains("isInputViewShown=true"))
    }

    fn is_home_screen(&mut self) -> Result<bool, DeviceError> {
        // the pipe runs in the device shell
        let out = self.run_adb(&[
            "shell",
            "dumpsys activity activities | grep mLastFocusedRootTask",
        ])?;
        Ok(out.contains("type=home"))
    }

    fn launch_app(&mut self, app_id: &str) -> Result<(), DeviceError> {
        self.run_adb(&[
            "shell",
            "monkey",
            "-p",
            app_id,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ])?;
        Ok(())
    }

    fn installed_apps(&mut self) -> Result<Vec<InstalledApp>, DeviceError> {
        Ok(self.apps.clone())
    }
}

/// Parse `wm size` output; the resolution sits on the last line, e.g.
/// `Physical size: 1080x2400`.
fn parse_screen_size(output: &str) -> Result<(u32, u32), DeviceError> {
    let line = output
        .trim()
        .lines()
        .last()
        .ok_or_else(|| DeviceError::MalformedOutput("empty wm size output".to_string()))?;
    let resolution = line
        .split_whitespace()
        .last()
        .ok_or_else(|| DeviceError::MalformedOutput(format!("no resolution in {line:?}")))?;
    let (w, h) = resolution
        .split_once('x')
        .ok_or_else(|| DeviceError::MalformedOutput(format!("no WxH in {resolution:?}")))?;
    match (w.parse(), h.parse()) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(DeviceError::MalformedOutput(format!(
            "unparsable resolution {resolution:?}"
        ))),
    }
}
