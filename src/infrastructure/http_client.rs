use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use thiserror::Error;

/// Stream type for HTTP responses
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>>;

/// Transport-level failures, translated by each caller into its own error kind
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Trait for HTTP client operations (for mocking)
#[async_trait]
pub trait HttpClientTrait: Send + Sync + std::fmt::Debug {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, HttpError>;

    async fn put_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, HttpError>;

    async fn post_json_stream(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<ByteStream, HttpError>;
}

/// Real HTTP client using reqwest
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HttpError::from_reqwest)?;

        Ok(Self { client })
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, HttpError> {
        let mut request = request;
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(HttpError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(HttpError::Status { status, body });
        }

        Ok(response)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, HttpError> {
        let response = self.send(self.client.post(url), headers, body).await?;

        response.json().await.map_err(HttpError::from_reqwest)
    }

    async fn put_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, HttpError> {
        let response = self.send(self.client.put(url), headers, body).await?;

        response.json().await.map_err(HttpError::from_reqwest)
    }

    async fn post_json_stream(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<ByteStream, HttpError> {
        let response = self.send(self.client.post(url), headers, body).await?;

        let stream = response
            .bytes_stream()
            .map(|result| result.map_err(HttpError::from_reqwest));

        Ok(Box::pin(stream))
    }
}
