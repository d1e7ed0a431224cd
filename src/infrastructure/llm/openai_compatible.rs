use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, future, stream};
use serde::{Deserialize, Serialize};

use crate::domain::{
    DomainError, FinishReason, LlmProvider, LlmRequest, LlmResponse, LlmStream, Message,
    MessageRole, StreamChunk, Usage,
};
use crate::infrastructure::http_client::{HttpClientTrait, HttpError};

/// Chat provider for any OpenAI-compatible `/chat/completions` endpoint
/// (OpenAI, Groq, Gemini's OpenAI endpoint, Ollama's `/v1`)
#[derive(Debug)]
pub struct OpenAiCompatibleProvider<C: HttpClientTrait> {
    client: C,
    name: String,
    auth_header: Option<String>,
    base_url: String,
    timeout: Duration,
}

impl<C: HttpClientTrait> OpenAiCompatibleProvider<C> {
    /// `base_url` includes the API version segment, e.g. `https://api.groq.com/openai/v1`
    pub fn new(client: C, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            auth_header: None,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_api_key(mut self, api_key: impl AsRef<str>) -> Self {
        self.auth_header = Some(format!("Bearer {}", api_key.as_ref()));
        self
    }

    /// Reported in `ProviderTimeout` errors
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request(&self, model: &str, request: &LlmRequest) -> serde_json::Value {
        let messages: Vec<OpenAiMessage> =
            request.messages.iter().map(OpenAiMessage::from_domain).collect();

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": request.stream,
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if let Some(ref stop) = request.stop {
            body["stop"] = serde_json::json!(stop);
        }

        body
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        let mut headers = vec![("Content-Type", "application/json")];
        if let Some(ref auth) = self.auth_header {
            headers.push(("Authorization", auth.as_str()));
        }
        headers
    }

    fn translate(&self, error: HttpError) -> DomainError {
        translate_http_error(&self.name, self.timeout, error)
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<LlmResponse, DomainError> {
        let response: OpenAiResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::malformed_response(&self.name, format!("Failed to parse response: {}", e))
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::malformed_response(&self.name, "No choices in response"))?;

        let message = Message::assistant(choice.message.content.unwrap_or_default());
        let mut llm_response = LlmResponse::new(response.id, response.model, message);

        if let Some(reason) = choice.finish_reason {
            llm_response = llm_response.with_finish_reason(parse_finish_reason(&reason));
        }

        if let Some(usage) = response.usage {
            llm_response =
                llm_response.with_usage(Usage::new(usage.prompt_tokens, usage.completion_tokens));
        }

        Ok(llm_response)
    }
}

#[async_trait]
impl<C: HttpClientTrait> LlmProvider for OpenAiCompatibleProvider<C> {
    async fn chat(&self, model: &str, request: LlmRequest) -> Result<LlmResponse, DomainError> {
        let mut req = request;
        req.stream = false;

        let body = self.build_request(model, &req);
        let response = self
            .client
            .post_json(&self.chat_completions_url(), self.headers(), &body)
            .await
            .map_err(|e| self.translate(e))?;

        self.parse_response(response)
    }

    async fn chat_stream(&self, model: &str, request: LlmRequest) -> Result<LlmStream, DomainError> {
        let mut req = request;
        req.stream = true;

        let body = self.build_request(model, &req);
        let byte_stream = self
            .client
            .post_json_stream(&self.chat_completions_url(), self.headers(), &body)
            .await
            .map_err(|e| self.translate(e))?;

        let name = self.name.clone();
        let timeout = self.timeout;
        let model = model.to_string();

        // SSE events can straddle network chunks; complete lines only
        let stream = byte_stream
            .scan(String::new(), move |buffer, result| {
                let items = match result {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        drain_sse_lines(buffer, &name, &model)
                    }
                    Err(e) => vec![Err(translate_http_error(&name, timeout, e))],
                };
                future::ready(Some(stream::iter(items)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }

    fn provider_name(&self) -> &str {
        &self.name
    }
}

fn translate_http_error(provider: &str, timeout: Duration, error: HttpError) -> DomainError {
    match error {
        HttpError::Timeout => DomainError::provider_timeout(provider, timeout.as_millis() as u64),
        HttpError::Status { status: 429, .. } => DomainError::rate_limited(provider),
        HttpError::Decode(message) => DomainError::malformed_response(provider, message),
        other => DomainError::provider(provider, other.to_string()),
    }
}

/// Parse every complete line in `buffer`, leaving a trailing partial line
fn drain_sse_lines(
    buffer: &mut String,
    provider: &str,
    model: &str,
) -> Vec<Result<StreamChunk, DomainError>> {
    let mut chunks = Vec::new();

    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        if let Some(chunk) = parse_sse_line(line.trim_end(), provider, model) {
            chunks.push(chunk);
        }
    }

    chunks
}

fn parse_sse_line(line: &str, provider: &str, model: &str) -> Option<Result<StreamChunk, DomainError>> {
    let data = line.strip_prefix("data:")?.trim();

    if data == "[DONE]" {
        return Some(Ok(
            StreamChunk::new(String::new(), model.to_string()).with_finish_reason(FinishReason::Stop)
        ));
    }

    let chunk = match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            return Some(Err(DomainError::malformed_response(
                provider,
                format!("Invalid stream event: {}", e),
            )));
        }
    };

    let choice = chunk.choices.into_iter().next()?;
    let mut stream_chunk = StreamChunk::new(chunk.id, chunk.model.unwrap_or_else(|| model.to_string()));

    if let Some(delta) = choice.delta.content {
        stream_chunk = stream_chunk.with_delta(delta);
    }

    if let Some(reason) = choice.finish_reason {
        stream_chunk = stream_chunk.with_finish_reason(parse_finish_reason(&reason));
    }

    Some(Ok(stream_chunk))
}

fn parse_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

// OpenAI wire types

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> OpenAiMessage<'a> {
    fn from_domain(message: &'a Message) -> Self {
        let role = match message.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };

        Self {
            role,
            content: message.content_text(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    id: String,
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    id: String,
    model: Option<String>,
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::mock::MockHttpClient;
    use bytes::Bytes;

    const BASE_URL: &str = "https://api.groq.com/openai/v1";
    const TEST_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

    fn provider(client: MockHttpClient) -> OpenAiCompatibleProvider<MockHttpClient> {
        OpenAiCompatibleProvider::new(client, "groq", BASE_URL).with_api_key("test-key")
    }

    #[tokio::test]
    async fn test_chat() {
        let mock_response = serde_json::json!({
            "id": "chatcmpl-123",
            "model": "llama-3.3-70b-versatile",
            "choices": [{
                "message": { "role": "assistant", "content": "Hello! How can I help you?" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 8, "total_tokens": 18 }
        });
        let provider = provider(MockHttpClient::new().with_response(TEST_URL, mock_response));

        let request = LlmRequest::instructed("Be brief", "Hello!").with_temperature(0.2);
        let response = provider.chat("llama-3.3-70b-versatile", request).await.unwrap();

        assert_eq!(response.id, "chatcmpl-123");
        assert_eq!(response.content(), "Hello! How can I help you?");
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
        let usage = response.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 8);
    }

    #[tokio::test]
    async fn test_request_body() {
        let client = MockHttpClient::new().with_response(
            TEST_URL,
            serde_json::json!({
                "id": "x", "model": "m",
                "choices": [{ "message": { "content": "ok" }, "finish_reason": "stop" }]
            }),
        );
        let provider = provider(client);

        let request = LlmRequest::instructed("sys", "hi").with_max_tokens(64);
        provider.chat("m", request).await.unwrap();

        let (url, body) = provider.client.requests().remove(0);
        assert_eq!(url, TEST_URL);
        assert_eq!(body["model"], "m");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_rate_limited() {
        let client = MockHttpClient::new().with_error(
            TEST_URL,
            HttpError::Status {
                status: 429,
                body: "Too Many Requests".to_string(),
            },
        );

        let error = provider(client)
            .chat("m", LlmRequest::new(vec![Message::user("Hello!")]))
            .await
            .unwrap_err();

        assert!(matches!(error, DomainError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_provider_timeout() {
        let client = MockHttpClient::new().with_error(TEST_URL, HttpError::Timeout);
        let provider = provider(client).with_timeout(Duration::from_secs(5));

        let error = provider
            .chat("m", LlmRequest::new(vec![Message::user("Hello!")]))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            DomainError::ProviderTimeout { timeout_ms: 5000, .. }
        ));
    }

    #[tokio::test]
    async fn test_unexpected_body_is_malformed() {
        let client = MockHttpClient::new().with_response(TEST_URL, serde_json::json!({"error": "?"}));

        let error = provider(client)
            .chat("m", LlmRequest::new(vec![Message::user("Hello!")]))
            .await
            .unwrap_err();

        assert_eq!(error.code(), "MALFORMED_RESPONSE");
    }

    #[tokio::test]
    async fn test_ollama_without_api_key_sends_no_auth() {
        let provider = OpenAiCompatibleProvider::new(
            MockHttpClient::new(),
            "ollama",
            "http://localhost:11434/v1/",
        );

        assert_eq!(provider.chat_completions_url(), "http://localhost:11434/v1/chat/completions");
        assert!(provider.headers().iter().all(|(key, _)| *key != "Authorization"));
        assert_eq!(provider.provider_name(), "ollama");
    }

    #[tokio::test]
    async fn test_stream_reassembles_split_events() {
        let chunks = vec![
            Bytes::from("data: {\"id\":\"c1\",\"model\":\"m\",\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"id\":\"c1\","),
            Bytes::from("\"model\":\"m\",\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n"),
            Bytes::from("data: [DONE]\n\n"),
        ];
        let provider = provider(MockHttpClient::new().with_stream_response(TEST_URL, chunks));

        let stream = provider
            .chat_stream("m", LlmRequest::new(vec![Message::user("Hi")]))
            .await
            .unwrap();
        let chunks: Vec<StreamChunk> = stream.map(|c| c.unwrap()).collect().await;

        let text: String = chunks.iter().filter_map(|c| c.delta.clone()).collect();
        assert_eq!(text, "Hello");
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn test_non_data_lines_ignored() {
        assert!(parse_sse_line(": keep-alive", "groq", "m").is_none());
        assert!(parse_sse_line("event: ping", "groq", "m").is_none());
        assert!(matches!(
            parse_sse_line("data: {not json", "groq", "m"),
            Some(Err(DomainError::MalformedResponse { .. }))
        ));
    }
}
