//! LLM provider implementations

mod factory;
mod openai_compatible;

pub use factory::LlmProviderFactory;
pub use openai_compatible::OpenAiCompatibleProvider;
