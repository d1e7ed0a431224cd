//! LLM provider domain models and traits

mod message;
mod provider;
mod request;
mod response;

pub use message::{Message, MessageRole};
pub use provider::{LlmProvider, LlmStream};
pub use request::LlmRequest;
pub use response::{FinishReason, LlmResponse, StreamChunk, Usage};

#[cfg(test)]
pub use provider::mock::MockLlmProvider;
