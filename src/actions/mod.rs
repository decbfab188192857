//! Action vocabulary and dispatch outcomes.

mod dispatcher;
pub mod overlay;

pub use dispatcher::{ActionDispatcher, DispatchError, DispatchRequest};

use crate::device::SwipeDirection;

/// Screen target resolved by the perception service for the current step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub point: (i32, i32),
    pub bbox: Option<[i32; 4]>,
}

/// One device-facing action recognized from the planner's action text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click,
    Type,
    Swipe(SwipeDirection),
    Home,
    Stop,
    OpenApp(String),
    /// Unrecognized or absent action text; an explicit no-effect step.
    None,
}

impl Action {
    /// Recognize an action by containment, most specific token first.
    /// "go to app" wins over "type"/"click" because app names may contain
    /// either word.
    pub fn recognize(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("go to app") {
            Action::OpenApp(app_name_from(&lower))
        } else if lower.contains("type") {
            Action::Type
        } else if lower.contains("click") {
            Action::Click
        } else if lower.contains("swipe") {
            match SwipeDirection::from_action_text(&lower) {
                Some(direction) => Action::Swipe(direction),
                None => Action::None,
            }
        } else if lower.contains("home") {
            Action::Home
        } else if lower.contains("stop") {
            Action::Stop
        } else {
            Action::None
        }
    }

    /// Click and Type steps need a resolved screen target.
    pub fn needs_target(&self) -> bool {
        matches!(self, Action::Click | Action::Type)
    }
}

/// App name is whatever follows the final " - " separator.
fn app_name_from(text: &str) -> String {
    text.rsplit('-').next().unwrap_or("").trim().to_string()
}

/// Outcome of dispatching one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The action ran; `coordinates` carries swipe endpoints when present,
    /// `typed` the ground-truth text when a tap forced immediate typing.
    Advanced {
        coordinates: [i32; 4],
        typed: Option<String>,
    },
    /// Target could not be resolved; retry the same step, record nothing.
    NoOp,
    /// Terminal stop requested by the planner.
    Stopped,
}
