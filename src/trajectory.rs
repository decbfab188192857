//! Trajectory records: the per-run, per-step log of the decision loop.
//!
//! One run produces one JSON document, written once at loop exit into a
//! freshly created file. Steps are immutable once appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

/// Sentinel for coordinates that were never set.
pub const NO_COORDINATE: i32 = -1;

/// Completion verdict carried on each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Success,
    Failure,
    #[default]
    Unknown,
}

/// One recorded loop iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,
    /// Screenshot reference (path of the saved capture).
    pub img: String,
    pub thought: String,
    pub summary: String,
    pub action: String,
    pub command: String,
    /// Tap and lift coordinates `[x1, y1, x2, y2]`, [`NO_COORDINATE`] when
    /// the action had none.
    pub coordinates: [i32; 4],
    pub status: CompletionStatus,
    pub reflection_done: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

/// Ordered, append-only log of one instruction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub intent: String,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<Step>,
}

impl Trajectory {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            started_at: Utc::now(),
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Write the whole run as a single JSON document, replacing any
    /// previous file at `path`.
    pub fn write_json(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).map_err(io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn step(index: usize) -> Step {
        Step {
            index,
            img: format!("screenshot_{index}.png"),
            thought: "open settings".to_string(),
            summary: "Tap the settings icon to open it".to_string(),
            action: "Click (the settings icon)".to_string(),
            command: "open settings".to_string(),
            coordinates: [NO_COORDINATE; 4],
            status: CompletionStatus::Failure,
            reflection_done: String::new(),
            analysis: None,
            description: "\"Settings\" gear icon".to_string(),
            answer: None,
        }
    }

    #[test]
    fn written_file_is_one_valid_json_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajectory_log_run.json");

        let mut trajectory = Trajectory::new("Open Settings");
        trajectory.push(step(0));
        trajectory.push(step(1));
        trajectory.write_json(&path).unwrap();
        // a second write replaces, never appends
        trajectory.write_json(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: Trajectory = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.intent, "Open Settings");
        assert_eq!(parsed.steps.len(), 2);
        assert_eq!(parsed.steps[1].index, 1);
    }

    #[test]
    fn wire_field_names_are_stable() {
        let json = serde_json::to_value(step(0)).unwrap();
        for key in [
            "img",
            "thought",
            "summary",
            "action",
            "command",
            "coordinates",
            "status",
            "reflection_done",
            "description",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["status"], "failure");
        assert_eq!(json["coordinates"], serde_json::json!([-1, -1, -1, -1]));
        // absent optionals stay out of the document
        assert!(json.get("analysis").is_none());
        assert!(json.get("answer").is_none());
    }
}
