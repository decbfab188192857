//! Device collaborator contract.
//!
//! The decision loop drives a device through this trait; the shipped
//! implementation is [`AdbDevice`]. Device failures are fatal to the run
//! and propagate to the caller, which owns recovery.

mod adb;

pub use adb::AdbDevice;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Device control errors. All of these abort the current run.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("device disconnected: {0}")]
    Disconnected(String),
    #[error("device command failed: {0}")]
    CommandFailed(String),
    #[error("screenshot capture failed: {0}")]
    Screenshot(String),
    #[error("unexpected device output: {0}")]
    MalformedOutput(String),
    #[error("device io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A captured screen image, kept both as raw PNG and base64 for the
/// model-service payloads.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub png: Vec<u8>,
    pub base64: String,
    pub width: u32,
    pub height: u32,
}

impl Screenshot {
    /// Build a screenshot from raw PNG bytes, reading dimensions from the
    /// image header.
    pub fn from_png(png: Vec<u8>) -> Result<Self, DeviceError> {
        let img = image::load_from_memory(&png)
            .map_err(|e| DeviceError::Screenshot(e.to_string()))?;
        let base64 = STANDARD.encode(&png);
        Ok(Self {
            width: img.width(),
            height: img.height(),
            png,
            base64,
        })
    }

    /// Data URL form used inside chat message image parts.
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.base64)
    }
}

/// One installed application, as label plus launchable package id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledApp {
    pub label: String,
    pub id: String,
}

/// The four directional swipe gestures the planner may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    UpToBottom,
    BottomToUp,
    LeftToRight,
    RightToLeft,
}

impl SwipeDirection {
    /// Recognize a direction token inside free action text.
    pub fn from_action_text(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        if lower.contains("bottom-to-up") {
            Some(Self::BottomToUp)
        } else if lower.contains("up-to-bottom") {
            Some(Self::UpToBottom)
        } else if lower.contains("right-to-left") {
            Some(Self::RightToLeft)
        } else if lower.contains("left-to-right") {
            Some(Self::LeftToRight)
        } else {
            None
        }
    }
}

/// Swipe gesture endpoints `(x1, y1, x2, y2)`.
pub type SwipeCoords = (i32, i32, i32, i32);

/// Fractional gesture geometry: vertical swipes travel between 1/8 and 7/8
/// of the height at horizontal center, horizontal ones mirror that on the
/// x axis.
pub fn swipe_endpoints(direction: SwipeDirection, width: u32, height: u32) -> SwipeCoords {
    let (w, h) = (width as i32, height as i32);
    match direction {
        SwipeDirection::BottomToUp => (w / 2, h / 8, w / 2, 7 * h / 8),
        SwipeDirection::UpToBottom => (w / 2, 7 * h / 8, w / 2, h / 8),
        SwipeDirection::RightToLeft => (7 * w / 8, h / 2, w / 8, h / 2),
        SwipeDirection::LeftToRight => (w / 8, h / 2, 7 * w / 8, h / 2),
    }
}

/// Device control surface consumed by the dispatcher and the decision loop.
pub trait Device {
    fn screenshot(&mut self) -> Result<Screenshot, DeviceError>;
    fn screen_size(&mut self) -> Result<(u32, u32), DeviceError>;
    fn tap(&mut self, x: i32, y: i32) -> Result<(), DeviceError>;
    fn type_text(&mut self, text: &str) -> Result<(), DeviceError>;
    fn swipe(&mut self, direction: SwipeDirection) -> Result<SwipeCoords, DeviceError>;
    fn home(&mut self) -> Result<(), DeviceError>;
    fn is_keyboard_open(&mut self) -> Result<bool, DeviceError>;
    fn is_home_screen(&mut self) -> Result<bool, DeviceError>;
    fn launch_app(&mut self, app_id: &str) -> Result<(), DeviceError>;
    fn installed_apps(&mut self) -> Result<Vec<InstalledApp>, DeviceError>;
}
