use thiserror::Error;

/// Core domain errors
///
/// Collaborator failures (HTTP drivers, store clients, JSON decoding) are
/// translated into one of these variants at the point of use, so callers of
/// the orchestrator never see driver-specific error types.
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    #[error("All LLM providers exhausted after {attempts} attempt(s): {last_error}")]
    AllProvidersExhausted { attempts: usize, last_error: String },

    #[error("Retrieval unavailable: {message}")]
    RetrievalUnavailable { message: String },

    #[error("Query timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("Provider {provider} timed out after {timeout_ms}ms")]
    ProviderTimeout { provider: String, timeout_ms: u64 },

    #[error("Provider {provider} rate limited the request")]
    RateLimited { provider: String },

    #[error("Malformed response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },

    #[error("Store error: {store} - {message}")]
    Store { store: String, message: String },

    #[error("Embedding error: {message}")]
    Embedding { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn all_providers_exhausted(attempts: usize, last_error: impl Into<String>) -> Self {
        Self::AllProvidersExhausted {
            attempts,
            last_error: last_error.into(),
        }
    }

    pub fn retrieval_unavailable(message: impl Into<String>) -> Self {
        Self::RetrievalUnavailable {
            message: message.into(),
        }
    }

    pub fn timeout(elapsed_ms: u64) -> Self {
        Self::Timeout { elapsed_ms }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn provider_timeout(provider: impl Into<String>, timeout_ms: u64) -> Self {
        Self::ProviderTimeout {
            provider: provider.into(),
            timeout_ms,
        }
    }

    pub fn rate_limited(provider: impl Into<String>) -> Self {
        Self::RateLimited {
            provider: provider.into(),
        }
    }

    pub fn malformed_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn store(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            store: store.into(),
            message: message.into(),
        }
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::AllProvidersExhausted { .. } => "ALL_PROVIDERS_EXHAUSTED",
            Self::RetrievalUnavailable { .. } => "RETRIEVAL_UNAVAILABLE",
            Self::Timeout { .. } => "QUERY_TIMEOUT",
            Self::Provider { .. } => "PROVIDER_ERROR",
            Self::ProviderTimeout { .. } => "PROVIDER_TIMEOUT",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            Self::Store { .. } => "STORE_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether this error aborts a whole query
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AllProvidersExhausted { .. }
                | Self::RetrievalUnavailable { .. }
                | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_error_message() {
        let error = DomainError::all_providers_exhausted(3, "ollama: connection refused");
        assert_eq!(
            error.to_string(),
            "All LLM providers exhausted after 3 attempt(s): ollama: connection refused"
        );
        assert_eq!(error.code(), "ALL_PROVIDERS_EXHAUSTED");
    }

    #[test]
    fn test_validation_error() {
        let error = DomainError::validation("Invalid input");
        assert_eq!(error.to_string(), "Validation error: Invalid input");
        assert!(!error.is_fatal());
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(DomainError::all_providers_exhausted(1, "x").is_fatal());
        assert!(DomainError::retrieval_unavailable("both down").is_fatal());
        assert!(DomainError::timeout(1000).is_fatal());
        assert!(!DomainError::rate_limited("groq").is_fatal());
        assert!(!DomainError::store("qdrant", "unreachable").is_fatal());
    }

    #[test]
    fn test_timeout_code() {
        let error = DomainError::timeout(120_000);
        assert_eq!(error.code(), "QUERY_TIMEOUT");
        assert_eq!(error.to_string(), "Query timed out after 120000ms");
    }
}
