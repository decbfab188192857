//! Parser for the labeled-line reply grammar used by the model services.
//!
//! Model replies are free text carrying `Label: value` lines. Each field is
//! taken from the first line that starts with its label; a label that never
//! appears yields `None` rather than an error, so callers decide whether a
//! missing field degrades the step or retries it.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Labels recognized by [`parse`].
const LABELS: [&str; 9] = [
    "Thought",
    "Action",
    "Operation",
    "Command",
    "Description",
    "Ground truth",
    "Answer",
    "Status",
    "Rate",
];

/// Auxiliary labels used by individual pipeline stages.
const EXTRA_LABELS: [&str; 5] = [
    "Thoughts",
    "Analysis",
    "Completed contents",
    "Important content",
    "app",
];

static LABEL_PATTERNS: Lazy<HashMap<&'static str, Regex>> = Lazy::new(|| {
    LABELS
        .iter()
        .chain(EXTRA_LABELS.iter())
        .map(|label| {
            let pattern = format!(r"(?m)^[ \t]*{}:[ \t]*(.*)$", regex::escape(label));
            (*label, Regex::new(&pattern).unwrap())
        })
        .collect()
});

/// Structured view over one model reply.
///
/// Single-valued fields hold the first matching line. `statuses` and
/// `rates` keep every occurrence so texts carrying one line per evaluator
/// come back as parallel sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredFields {
    pub thought: Option<String>,
    pub action: Option<String>,
    pub operation: Option<String>,
    pub command: Option<String>,
    pub description: Option<String>,
    pub ground_truth: Option<String>,
    pub answer: Option<String>,
    pub statuses: Vec<String>,
    pub rates: Vec<String>,
}

impl StructuredFields {
    /// First evaluator status, if any.
    pub fn status(&self) -> Option<&str> {
        self.statuses.first().map(String::as_str)
    }

    /// First evaluator rate, if any.
    pub fn rate(&self) -> Option<&str> {
        self.rates.first().map(String::as_str)
    }

    /// True when no recognized label matched at all, signaling an invalid
    /// reply that should be retried upstream or treated as a no-op.
    pub fn is_empty(&self) -> bool {
        self.thought.is_none()
            && self.action.is_none()
            && self.operation.is_none()
            && self.command.is_none()
            && self.description.is_none()
            && self.ground_truth.is_none()
            && self.answer.is_none()
            && self.statuses.is_empty()
            && self.rates.is_empty()
    }
}

/// Extract every recognized field from `text`.
pub fn parse(text: &str) -> StructuredFields {
    StructuredFields {
        thought: labeled_field(text, "Thought"),
        action: labeled_field(text, "Action"),
        operation: labeled_field(text, "Operation"),
        command: labeled_field(text, "Command"),
        description: labeled_field(text, "Description"),
        ground_truth: labeled_field(text, "Ground truth"),
        answer: labeled_field(text, "Answer"),
        statuses: labeled_fields(text, "Status"),
        rates: labeled_fields(text, "Rate"),
    }
}

/// First `label: value` line in `text`, trimmed.
pub fn labeled_field(text: &str, label: &str) -> Option<String> {
    let re = LABEL_PATTERNS.get(label)?;
    re.captures(text).map(|c| c[1].trim().to_string())
}

/// Every `label: value` line in `text`, in order of appearance.
pub fn labeled_fields(text: &str, label: &str) -> Vec<String> {
    let Some(re) = LABEL_PATTERNS.get(label) else {
        return Vec::new();
    };
    re.captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_labeled_lines() {
        let fields = parse("Action: Click (a button)\nThought: go\n");
        assert_eq!(fields.action.as_deref(), Some("Click (a button)"));
        assert_eq!(fields.thought.as_deref(), Some("go"));
        assert_eq!(fields.command, None);
    }

    #[test]
    fn unrecognized_text_yields_all_absent() {
        let fields = parse("the model rambled on without any structure");
        assert!(fields.is_empty());
    }

    #[test]
    fn captures_full_reply() {
        let text = "Thought: open the browser\n\
                    Action: Click (the Chrome icon)\n\
                    Operation: Tap Chrome to open it\n\
                    Command: open chrome\n\
                    Description: \"Chrome\" icon in the dock\n\
                    Ground truth: \n\
                    Answer: N/A\n";
        let fields = parse(text);
        assert_eq!(fields.operation.as_deref(), Some("Tap Chrome to open it"));
        assert_eq!(fields.command.as_deref(), Some("open chrome"));
        assert_eq!(
            fields.description.as_deref(),
            Some("\"Chrome\" icon in the dock")
        );
        // present-but-empty is still present
        assert_eq!(fields.ground_truth.as_deref(), Some(""));
    }

    #[test]
    fn multiple_status_and_rate_lines_are_parallel_sequences() {
        let text = "Status: success\nRate: 6\nStatus: failure\nRate: 3\n";
        let fields = parse(text);
        assert_eq!(fields.statuses, vec!["success", "failure"]);
        assert_eq!(fields.rates, vec!["6", "3"]);
        assert_eq!(fields.status(), Some("success"));
    }

    #[test]
    fn label_must_start_the_line() {
        let fields = parse("I decided that Action: Click is best\n");
        assert_eq!(fields.action, None);
    }

    #[test]
    fn thought_does_not_match_thoughts() {
        assert_eq!(labeled_field("Thoughts: reasoning here\n", "Thought"), None);
        assert_eq!(
            labeled_field("Thoughts: reasoning here\n", "Thoughts").as_deref(),
            Some("reasoning here")
        );
    }

    #[test]
    fn tolerates_crlf_and_indentation() {
        let fields = parse("  Action: Home\r\nThought: done\r\n");
        assert_eq!(fields.action.as_deref(), Some("Home"));
        assert_eq!(fields.thought.as_deref(), Some("done"));
    }

    #[test]
    fn missing_trailing_newline_still_matches() {
        let fields = parse("Status: success");
        assert_eq!(fields.status(), Some("success"));
    }

    #[test]
    fn auxiliary_labels() {
        assert_eq!(
            labeled_field("Completed contents: opened settings\n", "Completed contents").as_deref(),
            Some("opened settings")
        );
        assert_eq!(
            labeled_field("app: Google Chrome\n", "app").as_deref(),
            Some("Google Chrome")
        );
    }

    #[test]
    fn garbage_bytes_do_not_panic() {
        // parser must stay total over arbitrary input
        for text in ["", ":", ":::\n\n:", "Rate:", "Action:Click", "\u{0}\u{1}Status: x"] {
            let _ = parse(text);
        }
        assert_eq!(parse("Action:Click").action.as_deref(), Some("Click"));
    }
}
