//! Per-step decision pipeline.
//!
//! One planning round runs: screen caption -> consensus completion gate ->
//! action-text generation -> target localization. The consensus gate comes
//! first so a finished instruction short-circuits the round with empty
//! action fields.

use crate::actions::{Action, ResolvedTarget};
use crate::config::prompts;
use crate::device::Screenshot;
use crate::eval::{ConsensusEvaluator, ConsensusVerdict};
use crate::model::{Conversation, DescribedTarget, GatewayError, ModelService};
use crate::parser;

/// Result of one planning round.
#[derive(Debug)]
pub enum PlanOutcome {
    /// Consensus judged the instruction complete; no action proposed.
    Complete(ConsensusVerdict),
    /// Next action to dispatch.
    Proposed(StepPlan),
}

/// Parsed, localized plan for the current step.
#[derive(Debug, Clone)]
pub struct StepPlan {
    pub thought: String,
    /// The "Operation" line: a short summary of the step.
    pub summary: String,
    pub action_text: String,
    pub action: Action,
    pub command: String,
    pub description: String,
    pub ground_truth: String,
    pub answer: Option<String>,
    /// The (failed) consensus verdict that preceded this plan.
    pub verdict: ConsensusVerdict,
    pub target: Option<ResolvedTarget>,
}

/// Runs the decision pipeline against the model service.
pub struct Planner {
    service: ModelService,
    evaluator: ConsensusEvaluator,
}

impl Planner {
    pub fn new(service: ModelService) -> Self {
        let evaluator = ConsensusEvaluator::new(service.clone());
        Self { service, evaluator }
    }

    /// Run one planning round for the current screen.
    pub async fn plan(
        &self,
        instruction: &str,
        action_prompt: &str,
        action_history: &[String],
        screen: &Screenshot,
    ) -> Result<PlanOutcome, GatewayError> {
        let caption = self.describe_screen(screen).await?;

        let verdict = self
            .evaluator
            .evaluate(instruction, action_history, &caption)
            .await?;
        if verdict.passed {
            return Ok(PlanOutcome::Complete(verdict));
        }

        let prompt = prompts::plan_prompt_with_screen(&caption, action_prompt);
        let text = self
            .service
            .generate_plan(&prompt, instruction, action_history, screen)
            .await?;

        let fields = parser::parse(&text);
        if fields.action.is_none() {
            tracing::warn!("plan reply carried no action line");
        }
        let action_text = fields.action.unwrap_or_default();
        let action = Action::recognize(&action_text);
        let command = fields.command.unwrap_or_default();
        let description = fields.description.unwrap_or_default();

        let target = if needs_target(&action, &command) {
            let query = DescribedTarget::from_plan(&description, &command);
            let located = self.service.locate(&query, screen).await?;
            located.click_point.map(|point| ResolvedTarget {
                point,
                bbox: located.bbox,
            })
        } else {
            None
        };

        Ok(PlanOutcome::Proposed(StepPlan {
            thought: fields.thought.unwrap_or_default(),
            summary: fields.operation.unwrap_or_default(),
            action_text,
            action,
            command,
            description,
            ground_truth: fields.ground_truth.unwrap_or_default(),
            answer: fields.answer,
            verdict,
            target,
        }))
    }

    async fn describe_screen(&self, screen: &Screenshot) -> Result<String, GatewayError> {
        let mut chat = Conversation::with_system(prompts::DESCRIBE_SYSTEM);
        chat.push_user(prompts::DESCRIBE_REQUEST, &[screen]);
        self.service.chat(&chat).await
    }
}

/// Localization runs for click/type actions, or whenever the command text
/// says so even if the action line was vaguer.
fn needs_target(action: &Action, command: &str) -> bool {
    if action.needs_target() {
        return true;
    }
    let command = command.to_lowercase();
    command.contains("click") || command.contains("type")
}
