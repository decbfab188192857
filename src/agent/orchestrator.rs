//! The decision loop: perceive -> plan -> act -> record, with optional
//! analysis, reflection and memory stages, until the planner stops, the
//! consensus gate passes, or the step budget runs out.
//!
//! Remote-service flakiness never aborts the loop (the gateway retries or
//! the affected stage degrades); device errors do, after the trajectory
//! collected so far is persisted.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::history::{RunningMemory, StepHistories};
use super::planner::{PlanOutcome, Planner, StepPlan};
use crate::actions::{ActionDispatcher, Dispatch, DispatchError, DispatchRequest};
use crate::config::{prompts, ConfigError};
use crate::device::{Device, DeviceError, Screenshot};
use crate::eval::ConsensusVerdict;
use crate::model::{Conversation, GatewayError, ModelService, ServiceConfig};
use crate::parser;
use crate::trajectory::{CompletionStatus, Step, Trajectory, NO_COORDINATE};

/// Agent errors. Everything here ends the run; see the module docs for
/// what degrades instead of failing.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("model gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DispatchError> for AgentError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::Device(e) => AgentError::Device(e),
            DispatchError::Gateway(e) => AgentError::Gateway(e),
        }
    }
}

/// Configuration for one instruction run.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// The natural-language instruction to carry out.
    pub instruction: String,
    /// Maximum loop iterations before giving up.
    pub max_steps: u32,
    /// Name for this run's artifacts (log file, screenshot folder).
    pub run_name: String,
    /// Where run artifacts are written.
    pub output_dir: PathBuf,
    /// Hint text injected into action prompts.
    pub hint: String,
    /// Wait between an action and the next perception, letting the UI
    /// settle.
    pub settle: Duration,
    pub use_analysis: bool,
    pub use_reflection: bool,
    pub use_memory: bool,
    pub use_open_app: bool,
    /// Offer the STOP action to the planner.
    pub do_stop: bool,
    /// Optional TTF/OTF font for overlay labels.
    pub overlay_font: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            instruction: String::new(),
            max_steps: 20,
            run_name: format!("run-{}", Uuid::new_v4().simple()),
            output_dir: PathBuf::from("output"),
            hint: prompts::DEFAULT_HINT.to_string(),
            settle: Duration::from_secs(11),
            use_analysis: false,
            use_reflection: true,
            use_memory: true,
            use_open_app: true,
            do_stop: true,
            overlay_font: None,
        }
    }
}

impl AgentConfig {
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_run_name(mut self, run_name: impl Into<String>) -> Self {
        self.run_name = run_name.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_modules(
        mut self,
        analysis: bool,
        reflection: bool,
        memory: bool,
        open_app: bool,
    ) -> Self {
        self.use_analysis = analysis;
        self.use_reflection = reflection;
        self.use_memory = memory;
        self.use_open_app = open_app;
        self
    }

    /// Check the invariants that must hold before the loop starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instruction.trim().is_empty() {
            return Err(ConfigError::Missing("instruction"));
        }
        if self.max_steps < 1 {
            return Err(ConfigError::Invalid(
                "max_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Mutable working copy of the current step; becomes a [`Step`] when the
/// iteration is recorded, and feeds the closing record at exit.
#[derive(Debug, Clone)]
struct StepDraft {
    thought: String,
    summary: String,
    action: String,
    command: String,
    description: String,
    ground_truth: String,
    answer: Option<String>,
    status: CompletionStatus,
    reflection: String,
    analysis: Option<String>,
    coordinates: [i32; 4],
}

impl Default for StepDraft {
    fn default() -> Self {
        Self {
            thought: String::new(),
            summary: String::new(),
            action: String::new(),
            command: String::new(),
            description: String::new(),
            ground_truth: String::new(),
            answer: None,
            status: CompletionStatus::Unknown,
            reflection: String::new(),
            analysis: None,
            coordinates: [NO_COORDINATE; 4],
        }
    }
}

impl StepDraft {
    fn apply_plan(&mut self, plan: &StepPlan) {
        self.thought = plan.thought.clone();
        self.summary = plan.summary.clone();
        self.action = plan.action_text.clone();
        self.command = plan.command.clone();
        self.description = plan.description.clone();
        self.ground_truth = plan.ground_truth.clone();
        self.answer = plan.answer.clone().or_else(|| plan.verdict.answer.clone());
        self.status = CompletionStatus::Failure;
        self.reflection = plan.verdict.rationales_line();
        self.coordinates = [NO_COORDINATE; 4];
    }

    /// The early-exit record: success status, empty action fields.
    fn for_completion(verdict: &ConsensusVerdict) -> Self {
        Self {
            answer: verdict.answer.clone(),
            status: CompletionStatus::Success,
            reflection: verdict.rationales_line(),
            ..Self::default()
        }
    }

    fn to_step(&self, index: usize, img: String) -> Step {
        Step {
            index,
            img,
            thought: self.thought.clone(),
            summary: self.summary.clone(),
            action: self.action.clone(),
            command: self.command.clone(),
            coordinates: self.coordinates,
            status: self.status,
            reflection_done: self.reflection.clone(),
            analysis: self.analysis.clone(),
            description: self.description.clone(),
            answer: self.answer.clone(),
        }
    }
}

/// The perception-action decision loop for one device and one instruction
/// at a time.
pub struct Agent<D: Device> {
    config: AgentConfig,
    device: D,
    service: ModelService,
    planner: Planner,
    dispatcher: ActionDispatcher,
    cancel: CancellationToken,
}

impl<D: Device> Agent<D> {
    pub fn new(
        config: AgentConfig,
        service_config: ServiceConfig,
        device: D,
    ) -> Result<Self, AgentError> {
        config.validate()?;

        let cancel = CancellationToken::new();
        let service = ModelService::new(service_config, cancel.clone());
        let planner = Planner::new(service.clone());
        let mut dispatcher =
            ActionDispatcher::new(service.clone()).with_overlay_dir(run_dir(&config));
        if let Some(font) = &config.overlay_font {
            dispatcher = dispatcher.with_overlay_font(font);
        }

        Ok(Self {
            config,
            device,
            service,
            planner,
            dispatcher,
            cancel,
        })
    }

    /// Token an outer supervisor can use to abort a stuck run; unbounded
    /// retries stop promptly once cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the instruction to completion and return the trajectory.
    ///
    /// The trajectory, including the closing screenshot step, is persisted
    /// even when the loop fails; the error is returned afterwards.
    pub async fn run(&mut self) -> Result<Trajectory, AgentError> {
        let run_dir = run_dir(&self.config);
        fs::create_dir_all(&run_dir)?;

        let mut trajectory = Trajectory::new(self.config.instruction.clone());
        let mut draft = StepDraft::default();

        let outcome = self
            .run_loop(&mut trajectory, &mut draft, &run_dir)
            .await;
        if let Err(error) = &outcome {
            tracing::error!(%error, "run aborted");
        }

        self.append_final_step(&mut trajectory, &draft, &run_dir);
        let log_path = run_dir.join(format!("trajectory_log_{}.json", self.config.run_name));
        trajectory.write_json(&log_path)?;
        tracing::info!(path = %log_path.display(), steps = trajectory.len(), "trajectory saved");

        outcome?;
        Ok(trajectory)
    }

    async fn run_loop(
        &mut self,
        trajectory: &mut Trajectory,
        draft: &mut StepDraft,
        run_dir: &Path,
    ) -> Result<(), AgentError> {
        let instruction = self.config.instruction.clone();
        let mut histories = StepHistories::default();
        let mut memory = RunningMemory::default();
        let mut completed = String::new();
        let mut prev_screen: Option<Screenshot> = None;
        let mut prev_command;

        for iteration in 0..self.config.max_steps as usize {
            let use_open_app = self.config.use_open_app && self.device.is_home_screen()?;
            let keyboard = self.device.is_keyboard_open()?;
            let screen = self.device.screenshot()?;
            let img = save_screenshot(&screen, run_dir, &format!("screenshot_{iteration}"))?;
            tracing::info!(iteration, keyboard, use_open_app, "step started");

            let action_prompt = if self.config.use_analysis {
                prompts::action_prompt_with_analysis(
                    &instruction,
                    keyboard,
                    &histories.summaries,
                    &histories.thoughts,
                    &histories.analyses,
                    &self.config.hint,
                    &completed,
                    memory.as_str(),
                    self.config.do_stop,
                    use_open_app,
                )
            } else {
                prompts::action_prompt(
                    &instruction,
                    keyboard,
                    &histories.summaries,
                    &histories.thoughts,
                    &self.config.hint,
                    &completed,
                    memory.as_str(),
                    self.config.do_stop,
                    use_open_app,
                )
            };

            let plan = match self
                .planner
                .plan(&instruction, &action_prompt, &histories.actions, &screen)
                .await?
            {
                PlanOutcome::Complete(verdict) => {
                    *draft = StepDraft::for_completion(&verdict);
                    tracing::info!(iteration, "consensus passed, exiting loop");
                    return Ok(());
                }
                PlanOutcome::Proposed(plan) => plan,
            };
            tracing::info!(action = %plan.action_text, command = %plan.command, "planned");

            prev_command = draft.command.clone();
            draft.apply_plan(&plan);

            let request = DispatchRequest {
                action: &plan.action,
                ground_truth: &plan.ground_truth,
                target: plan.target.as_ref(),
                label: &instruction,
                step_index: iteration,
            };
            match self
                .dispatcher
                .dispatch(&mut self.device, &request, &screen)
                .await
                .map_err(AgentError::from)?
            {
                Dispatch::NoOp => {
                    tracing::info!(iteration, "no-op step, replanning from same state");
                    continue;
                }
                Dispatch::Stopped => {
                    trajectory.push(draft.to_step(trajectory.len(), img));
                    return Ok(());
                }
                Dispatch::Advanced { coordinates, typed } => {
                    draft.coordinates = coordinates;
                    if let Some(text) = typed {
                        draft.command = format!("{} and typed {}", draft.command, text);
                    }
                }
            }

            tokio::time::sleep(self.config.settle).await;

            draft.analysis = None;
            if self.config.use_analysis && iteration >= 1 {
                if let Some(prev) = &prev_screen {
                    self.run_analysis(
                        &instruction,
                        &prev_command,
                        prev,
                        &screen,
                        &mut histories,
                        draft,
                    )
                    .await?;
                }
            }

            trajectory.push(draft.to_step(trajectory.len(), img));
            histories.record(
                draft.thought.clone(),
                draft.summary.clone(),
                format!("{} {}", draft.command, draft.description),
            );

            if self.config.use_reflection {
                self.run_reflection(&instruction, &histories, &mut completed, &screen)
                    .await?;
            }

            if self.config.use_memory {
                self.run_memory(&histories, &mut memory, &screen).await?;
            }

            prev_screen = Some(screen);
        }

        tracing::info!(max_steps = self.config.max_steps, "step budget exhausted");
        Ok(())
    }

    /// Compare the two most recent pre-action screenshots to judge the
    /// previous step. Exhausted retries degrade to an empty entry.
    async fn run_analysis(
        &self,
        instruction: &str,
        prev_command: &str,
        prev: &Screenshot,
        current: &Screenshot,
        histories: &mut StepHistories,
        draft: &mut StepDraft,
    ) -> Result<(), AgentError> {
        let prompt = prompts::analysis_prompt(instruction, prev_command, &histories.analyses);
        match self.service.generate_analysis(&prompt, prev, current).await {
            Ok(text) => {
                let cleaned = text.replace("Analysis:", "").trim().to_string();
                if cleaned.is_empty() {
                    histories.analyses.push(String::new());
                } else {
                    histories.analyses.push(cleaned.clone());
                    draft.analysis = Some(cleaned);
                }
                Ok(())
            }
            Err(GatewayError::AttemptsExhausted {
                attempts,
                last_error,
            }) => {
                tracing::warn!(attempts, %last_error, "analysis degraded for this step");
                histories.analyses.push(String::new());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ask the model to update the running completed-contents summary; a
    /// reply without the expected label keeps the previous value.
    async fn run_reflection(
        &self,
        instruction: &str,
        histories: &StepHistories,
        completed: &mut String,
        screen: &Screenshot,
    ) -> Result<(), AgentError> {
        let prompt = prompts::process_prompt(
            instruction,
            &histories.thoughts,
            &histories.summaries,
            &histories.actions,
            completed,
            &self.config.hint,
        );
        let mut chat = Conversation::with_system(prompts::PROCESS_SYSTEM);
        chat.push_user(&prompt, &[screen]);
        let reply = self.service.chat(&chat).await?;
        match parser::labeled_field(&reply, "Completed contents") {
            Some(updated) if !updated.is_empty() => *completed = updated,
            _ => tracing::debug!("reflection reply unusable, keeping previous summary"),
        }
        Ok(())
    }

    /// Ask whether the screen carries content worth keeping and append
    /// novel findings to the running memory.
    async fn run_memory(
        &self,
        histories: &StepHistories,
        memory: &mut RunningMemory,
        screen: &Screenshot,
    ) -> Result<(), AgentError> {
        let prompt = prompts::memory_prompt(&histories.summaries);
        let mut chat = Conversation::with_system(prompts::MEMORY_SYSTEM);
        chat.push_user(&prompt, &[screen]);
        let reply = self.service.chat(&chat).await?;
        let finding = extract_important_content(&reply);
        if memory.note(&finding) {
            tracing::debug!(finding = %finding, "memory grew");
        }
        Ok(())
    }

    /// Always close the trajectory with one final capture; when the device
    /// itself is gone the step is recorded without an image.
    fn append_final_step(
        &mut self,
        trajectory: &mut Trajectory,
        draft: &StepDraft,
        run_dir: &Path,
    ) {
        let img = match self.device.screenshot() {
            Ok(screen) => {
                save_screenshot(&screen, run_dir, "screenshot_final").unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "could not save final screenshot");
                    String::new()
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "final capture failed");
                String::new()
            }
        };
        let mut step = draft.to_step(trajectory.len(), img);
        step.coordinates = [NO_COORDINATE; 4];
        trajectory.push(step);
    }
}

fn run_dir(config: &AgentConfig) -> PathBuf {
    config.output_dir.join(&config.run_name)
}

fn save_screenshot(
    screen: &Screenshot,
    dir: &Path,
    name: &str,
) -> Result<String, AgentError> {
    let path = dir.join(format!("{name}.png"));
    fs::write(&path, &screen.png)?;
    Ok(path.display().to_string())
}

/// The memory reply's payload sits after the last important-content header,
/// up to the first blank line.
fn extract_important_content(reply: &str) -> String {
    let tail = reply
        .rsplit("### Important content ###")
        .next()
        .unwrap_or(reply);
    tail.split("\n\n").next().unwrap_or(tail).trim().to_string()
}
