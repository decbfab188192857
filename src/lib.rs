//! # Mobile Agent
//!
//! Vision-language-model driven agent for automating Android phone
//! interactions.
//!
//! The agent runs a perception-action decision loop: capture the screen,
//! ask the remote model services what to do next, execute the action over
//! ADB, and keep going until a consensus of evaluators judges the
//! instruction complete, the planner stops, or the step budget runs out.
//! Every run leaves a trajectory log plus per-step screenshots and debug
//! overlays.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mobile_agent::{AdbDevice, Agent, AgentConfig, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AgentConfig::default()
//!         .with_instruction("Open Settings")
//!         .with_max_steps(10);
//!     let device = AdbDevice::new(None, mobile_agent::config::DEFAULT_APP_CATALOG.clone());
//!
//!     let mut agent = Agent::new(config, ServiceConfig::default(), device)?;
//!     let trajectory = agent.run().await?;
//!
//!     println!("finished after {} steps", trajectory.len());
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod agent;
pub mod config;
pub mod device;
pub mod eval;
pub mod model;
pub mod parser;
pub mod trajectory;

pub use actions::{Action, ActionDispatcher, Dispatch, DispatchRequest, ResolvedTarget};
pub use agent::{Agent, AgentConfig, AgentError, PlanOutcome, Planner, StepPlan};
pub use config::ConfigError;
pub use device::{
    swipe_endpoints, AdbDevice, Device, DeviceError, InstalledApp, Screenshot, SwipeCoords,
    SwipeDirection,
};
pub use eval::{ConsensusEvaluator, ConsensusVerdict, EvaluatorVerdict, CONFIDENCE_THRESHOLD};
pub use model::{
    Backoff, DescribedTarget, GatewayError, ModelService, RetryPolicy, RpcGateway, ServiceConfig,
};
pub use parser::StructuredFields;
pub use trajectory::{CompletionStatus, Step, Trajectory, NO_COORDINATE};
