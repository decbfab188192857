//! Agent module: the decision loop, its planner, and running state.

mod history;
mod orchestrator;
mod planner;

pub use history::{RunningMemory, StepHistories};
pub use orchestrator::{Agent, AgentConfig, AgentError};
pub use planner::{PlanOutcome, Planner, StepPlan};
