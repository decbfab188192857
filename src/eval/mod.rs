//! Consensus evaluator: multiple independent completion checks combined
//! into one pass/fail decision.
//!
//! Two differently-worded "is the instruction satisfied" prompts run
//! concurrently against the chat endpoint. The run only counts as complete
//! when every evaluator says success AND the summed confidence ratings
//! reach the threshold; anything unparsable fails closed.

use crate::config::prompts;
use crate::model::{Conversation, GatewayError, ModelService};
use crate::parser;

/// Minimum summed confidence across evaluators for an overall pass.
pub const CONFIDENCE_THRESHOLD: i64 = 10;

/// One evaluator's parsed reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluatorVerdict {
    pub status: Option<String>,
    pub rate: Option<i64>,
    pub rationale: Option<String>,
    pub answer: Option<String>,
}

impl EvaluatorVerdict {
    /// Parse a verdict out of one evaluator reply.
    pub fn from_reply(text: &str) -> Self {
        let fields = parser::parse(text);
        Self {
            status: fields.status().map(str::to_string),
            rate: fields.rate().and_then(|raw| raw.parse::<i64>().ok()),
            rationale: parser::labeled_field(text, "Thoughts"),
            answer: fields.answer,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.to_lowercase().contains("success"))
            .unwrap_or(false)
    }
}

/// Joined verdicts plus the derived overall decision.
#[derive(Debug, Clone, Default)]
pub struct ConsensusVerdict {
    pub verdicts: Vec<EvaluatorVerdict>,
    pub passed: bool,
    pub answer: Option<String>,
}

impl ConsensusVerdict {
    /// Evaluator statuses joined for the trajectory log.
    pub fn statuses_line(&self) -> String {
        self.verdicts
            .iter()
            .filter_map(|v| v.status.clone())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Evaluator rationales joined for the trajectory log.
    pub fn rationales_line(&self) -> String {
        self.verdicts
            .iter()
            .filter_map(|v| v.rationale.clone())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Exact combination rule: every status reads success and the rates sum to
/// the threshold. Missing statuses or rates fail closed.
pub fn combine(verdicts: &[EvaluatorVerdict]) -> bool {
    if verdicts.is_empty() {
        return false;
    }
    if !verdicts.iter().all(EvaluatorVerdict::is_success) {
        return false;
    }
    let total: Option<i64> = verdicts.iter().map(|v| v.rate).sum();
    match total {
        Some(total) => total >= CONFIDENCE_THRESHOLD,
        None => false,
    }
}

/// Issues the completion-check prompts and combines their verdicts.
#[derive(Clone)]
pub struct ConsensusEvaluator {
    service: ModelService,
}

impl ConsensusEvaluator {
    pub fn new(service: ModelService) -> Self {
        Self { service }
    }

    /// Run both completion checks concurrently and combine the verdicts.
    ///
    /// Each check owns its conversation and prompt; the tasks share
    /// nothing and are joined before combination.
    pub async fn evaluate(
        &self,
        instruction: &str,
        action_history: &[String],
        screen_description: &str,
    ) -> Result<ConsensusVerdict, GatewayError> {
        let checks = [
            (
                prompts::eval_system_web(),
                prompts::final_eval_web(instruction, action_history),
            ),
            (
                prompts::eval_system_general(),
                prompts::final_eval_general(instruction, action_history),
            ),
        ];

        let mut tasks = Vec::with_capacity(checks.len());
        for (system, check) in checks {
            let service = self.service.clone();
            let prompt = prompts::with_screen_state(&check, screen_description);
            tasks.push(tokio::spawn(async move {
                let mut chat = Conversation::with_system(system);
                chat.push_user(&prompt, &[]);
                service.chat(&chat).await
            }));
        }

        let mut verdicts = Vec::with_capacity(tasks.len());
        for task in tasks {
            // a task only vanishes when the run is being torn down
            let reply = task.await.map_err(|_| GatewayError::Cancelled)??;
            verdicts.push(EvaluatorVerdict::from_reply(&reply));
        }

        let answer = verdicts.iter().find_map(|v| v.answer.clone());
        let passed = combine(&verdicts);
        if passed {
            tracing::info!("consensus: instruction judged complete");
        }
        Ok(ConsensusVerdict {
            verdicts,
            passed,
            answer,
        })
    }
}
