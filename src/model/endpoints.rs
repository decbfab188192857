//! Typed wire contracts for the model-service endpoints.
//!
//! HTTP paths and JSON field names follow the existing services and must
//! not drift. Replies are validated while they are decoded, so a reply
//! that is syntactically JSON but semantically broken (worker error code,
//! empty choices) counts as a failed attempt and is retried per policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::gateway::{Backoff, GatewayError, RetryPolicy, RpcGateway, BOUNDED_RETRY_ATTEMPTS};
use super::messages::{Conversation, Message};
use crate::device::Screenshot;

/// Endpoint addresses and call parameters for one model-service deployment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Host serving `/worker_generate_plan`.
    pub plan_host: String,
    /// Host serving `/v1/chat/completions`.
    pub chat_host: String,
    /// Host serving `/worker_generate` (perception/localization).
    pub perceive_host: String,
    /// Host serving `/worker_generate_analysis`.
    pub analysis_host: String,
    /// Model name sent with chat requests.
    pub model_name: String,
    pub plan_timeout: Duration,
    pub chat_timeout: Duration,
    pub perceive_timeout: Duration,
    pub analysis_timeout: Duration,
    /// Attempt cap for the bounded (auxiliary) policy.
    pub bounded_attempts: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            plan_host: "127.0.0.1:21002".to_string(),
            chat_host: "127.0.0.1:23333".to_string(),
            perceive_host: "127.0.0.1:21003".to_string(),
            analysis_host: "127.0.0.1:23333".to_string(),
            model_name: "internlm2".to_string(),
            plan_timeout: Duration::from_secs(200),
            chat_timeout: Duration::from_secs(10),
            perceive_timeout: Duration::from_secs(10),
            analysis_timeout: Duration::from_secs(200),
            bounded_attempts: BOUNDED_RETRY_ATTEMPTS,
        }
    }
}

impl ServiceConfig {
    pub fn with_plan_host(mut self, host: impl Into<String>) -> Self {
        self.plan_host = host.into();
        self
    }

    pub fn with_chat_host(mut self, host: impl Into<String>) -> Self {
        self.chat_host = host.into();
        self
    }

    pub fn with_perceive_host(mut self, host: impl Into<String>) -> Self {
        self.perceive_host = host.into();
        self
    }

    pub fn with_analysis_host(mut self, host: impl Into<String>) -> Self {
        self.analysis_host = host.into();
        self
    }

    /// Point every endpoint at a single host (common in test and
    /// single-box deployments).
    pub fn with_single_host(self, host: impl Into<String>) -> Self {
        let host = host.into();
        self.with_plan_host(host.clone())
            .with_chat_host(host.clone())
            .with_perceive_host(host.clone())
            .with_analysis_host(host)
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct PlanRequest<'a> {
    prompt: &'a str,
    instruction: &'a str,
    action_history: &'a [String],
    image: &'a str,
}

#[derive(Debug, Serialize)]
struct AnalysisRequest<'a> {
    instruction: &'a str,
    images: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct LocateRequest<'a> {
    prompt: &'a str,
    image: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    top_p: u32,
    temperature: f32,
    messages: &'a [Message],
}

/// Worker reply envelope; a non-zero exit code is a failed attempt.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawWorkerReply")]
pub struct WorkerReply {
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct RawWorkerReply {
    #[serde(default)]
    exit_code: i32,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

impl TryFrom<RawWorkerReply> for WorkerReply {
    type Error = String;

    fn try_from(raw: RawWorkerReply) -> Result<Self, Self::Error> {
        match (raw.exit_code, raw.text) {
            (0, Some(text)) => Ok(WorkerReply { text }),
            (0, None) => Err("worker reply missing text".to_string()),
            (code, _) => Err(format!(
                "worker error (exit_code {code}): {}",
                raw.error_code.unwrap_or_default()
            )),
        }
    }
}

/// Perception reply; a null click point is a valid "target not found".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocateReply {
    #[serde(default)]
    pub click_point: Option<(i32, i32)>,
    #[serde(rename = "box", default)]
    pub bbox: Option<[i32; 4]>,
}

/// Chat-completions reply reduced to the first choice's content.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawChatReply")]
pub struct ChatReply {
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct RawChatReply {
    choices: Vec<RawChoice>,
}

#[derive(Debug, Deserialize)]
struct RawChoice {
    message: RawChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct RawChoiceMessage {
    content: String,
}

impl TryFrom<RawChatReply> for ChatReply {
    type Error = String;

    fn try_from(raw: RawChatReply) -> Result<Self, Self::Error> {
        raw.choices
            .into_iter()
            .next()
            .map(|choice| ChatReply {
                content: choice.message.content,
            })
            .ok_or_else(|| "no choices in chat reply".to_string())
    }
}

/// Search query handed to the perception service, derived from the
/// planner's element description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribedTarget(String);

impl DescribedTarget {
    /// Build the perception query from the description, falling back to the
    /// command text when the planner produced no description.
    pub fn from_plan(description: &str, command: &str) -> Self {
        let description = description
            .to_lowercase()
            .replace("address bar", "url address bar");
        let description = description.trim();
        if description.is_empty() {
            Self(command.trim().to_string())
        } else {
            Self(format!("click {description}"))
        }
    }

    pub fn prompt(&self) -> &str {
        &self.0
    }
}

/// Facade over the four model-service endpoints.
#[derive(Clone)]
pub struct ModelService {
    gateway: RpcGateway,
    config: ServiceConfig,
}

impl ModelService {
    pub fn new(config: ServiceConfig, cancel: CancellationToken) -> Self {
        Self {
            gateway: RpcGateway::new(cancel),
            config,
        }
    }

    /// Use a non-default backoff for every call.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.gateway = self.gateway.with_backoff(backoff);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Primary planning call: structured action text for the current step.
    /// Retries until a reply decodes.
    pub async fn generate_plan(
        &self,
        prompt: &str,
        instruction: &str,
        action_history: &[String],
        screen: &Screenshot,
    ) -> Result<String, GatewayError> {
        let url = format!("http://{}/worker_generate_plan", self.config.plan_host);
        let request = PlanRequest {
            prompt,
            instruction,
            action_history,
            image: &screen.base64,
        };
        let reply: WorkerReply = self
            .gateway
            .call(&url, &request, self.config.plan_timeout, RetryPolicy::Unbounded)
            .await?;
        Ok(reply.text)
    }

    /// Auxiliary analysis call over a before/after screenshot pair.
    /// Bounded retry; exhaustion degrades the step, never the run.
    pub async fn generate_analysis(
        &self,
        instruction: &str,
        before: &Screenshot,
        after: &Screenshot,
    ) -> Result<String, GatewayError> {
        let url = format!(
            "http://{}/worker_generate_analysis",
            self.config.analysis_host
        );
        let request = AnalysisRequest {
            instruction,
            images: vec![&before.base64, &after.base64],
        };
        let reply: WorkerReply = self
            .gateway
            .call(
                &url,
                &request,
                self.config.analysis_timeout,
                RetryPolicy::Bounded {
                    max_attempts: self.config.bounded_attempts,
                },
            )
            .await?;
        Ok(reply.text)
    }

    /// Perception call resolving a described target to a point and box.
    pub async fn locate(
        &self,
        target: &DescribedTarget,
        screen: &Screenshot,
    ) -> Result<LocateReply, GatewayError> {
        let url = format!("http://{}/worker_generate", self.config.perceive_host);
        let request = LocateRequest {
            prompt: target.prompt(),
            image: &screen.base64,
        };
        self.gateway
            .call(
                &url,
                &request,
                self.config.perceive_timeout,
                RetryPolicy::Unbounded,
            )
            .await
    }

    /// Chat-completions call returning the assistant text.
    pub async fn chat(&self, conversation: &Conversation) -> Result<String, GatewayError> {
        let url = format!("http://{}/v1/chat/completions", self.config.chat_host);
        let request = ChatRequest {
            model: &self.config.model_name,
            top_p: 1,
            temperature: 0.0,
            messages: conversation.messages(),
        };
        let reply: ChatReply = self
            .gateway
            .call(&url, &request, self.config.chat_timeout, RetryPolicy::Unbounded)
            .await?;
        Ok(reply.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn worker_reply_requires_zero_exit_code() {
        let ok: WorkerReply =
            serde_json::from_str(r#"{"exit_code": 0, "text": "Action: Home"}"#).unwrap();
        assert_eq!(ok.text, "Action: Home");

        let err = serde_json::from_str::<WorkerReply>(
            r#"{"exit_code": 1, "text": "", "error_code": "cuda oom"}"#,
        );
        assert!(err.is_err());

        let missing = serde_json::from_str::<WorkerReply>(r#"{"exit_code": 0}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn chat_reply_takes_first_choice() {
        let reply: ChatReply = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "hello"}}]}"#,
        )
        .unwrap();
        assert_eq!(reply.content, "hello");

        assert!(serde_json::from_str::<ChatReply>(r#"{"choices": []}"#).is_err());
    }

    #[test]
    fn locate_reply_allows_null_target() {
        let reply: LocateReply =
            serde_json::from_str(r#"{"click_point": null, "box": null}"#).unwrap();
        assert_eq!(reply.click_point, None);
        assert_eq!(reply.bbox, None);

        let hit: LocateReply =
            serde_json::from_str(r#"{"click_point": [120, 640], "box": [100, 600, 140, 680]}"#)
                .unwrap();
        assert_eq!(hit.click_point, Some((120, 640)));
        assert_eq!(hit.bbox, Some([100, 600, 140, 680]));
    }

    #[test]
    fn described_target_rewrites_address_bar() {
        let target = DescribedTarget::from_plan("the Address Bar at the top", "open google");
        assert_eq!(target.prompt(), "click the url address bar at the top");
    }

    #[test]
    fn described_target_falls_back_to_command() {
        let target = DescribedTarget::from_plan("  ", "click the search icon");
        assert_eq!(target.prompt(), "click the search icon");
    }
}
