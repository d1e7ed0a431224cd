use serde::{Deserialize, Serialize};

use super::{Message, MessageRole};

/// One chat completion call
///
/// Agent steps always send an instruction (system turn) followed by a
/// single user turn; generation options left unset are filled in by the
/// router from the provider's settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub stream: bool,
}

impl LlmRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
            stop: None,
            stream: false,
        }
    }

    /// System instruction plus user input
    pub fn instructed(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self::new(vec![Message::system(system), Message::user(user)])
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Fill in generation options the caller left unset
    pub fn with_defaults(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature.get_or_insert(temperature);
        self.max_tokens.get_or_insert(max_tokens);
        self
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
    }

    /// The last user turn
    pub fn user_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instructed_request() {
        let request = LlmRequest::instructed("Rewrite the question", "What is X?")
            .with_temperature(0.0)
            .with_max_tokens(100);

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.system_prompt(), Some("Rewrite the question"));
        assert_eq!(request.user_prompt(), Some("What is X?"));
        assert_eq!(request.temperature, Some(0.0));
        assert!(!request.stream);
    }

    #[test]
    fn test_defaults_do_not_override_explicit_options() {
        let request = LlmRequest::new(vec![Message::user("Hello!")])
            .with_temperature(0.0)
            .with_defaults(0.7, 512);

        assert_eq!(request.temperature, Some(0.0));
        assert_eq!(request.max_tokens, Some(512));
        assert_eq!(request.system_prompt(), None);
    }
}
