//! Model-service access: gateway, typed endpoints, conversation building.

mod endpoints;
mod gateway;
mod messages;

pub use endpoints::{
    ChatReply, DescribedTarget, LocateReply, ModelService, ServiceConfig, WorkerReply,
};
pub use gateway::{Backoff, GatewayError, RetryPolicy, RpcGateway, BOUNDED_RETRY_ATTEMPTS};
pub use messages::{ContentPart, Conversation, ImageUrl, Message};
