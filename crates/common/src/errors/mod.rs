//! Error types for the Genesis knowledge core
//!
//! Provides a single error enum with:
//! - Distinct variants for each failure mode of retrieval and routing
//! - Machine-readable error codes for the transport layer
//! - A terminal/absorbable split so only user-visible failures propagate

use crate::provider::Provider;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    UnknownProvider,

    // Resource errors (4xxx)
    PageNotFound,

    // External service errors (8xxx)
    ProviderCallFailed,
    CredentialExhausted,
    RoutingExhausted,
    RetrievalDegraded,
    UpstreamError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::UnknownProvider => 1002,

            ErrorCode::PageNotFound => 4001,

            ErrorCode::ProviderCallFailed => 8001,
            ErrorCode::CredentialExhausted => 8002,
            ErrorCode::RoutingExhausted => 8003,
            ErrorCode::RetrievalDegraded => 8004,
            ErrorCode::UpstreamError => 8005,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Why a single provider call failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderFailureKind {
    /// The call did not finish within the per-call timeout
    Timeout { timeout_ms: u64 },
    /// The provider answered with a non-success status
    Status { status: u16 },
    /// Connection, TLS or request-building failure
    Transport,
    /// The body could not be decoded
    MalformedResponse,
    /// The body decoded but carried no text
    EmptyResponse,
}

impl fmt::Display for ProviderFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderFailureKind::Timeout { timeout_ms } => write!(f, "timeout after {}ms", timeout_ms),
            ProviderFailureKind::Status { status } => write!(f, "status {}", status),
            ProviderFailureKind::Transport => f.write_str("transport error"),
            ProviderFailureKind::MalformedResponse => f.write_str("malformed response"),
            ProviderFailureKind::EmptyResponse => f.write_str("empty response"),
        }
    }
}

/// A failed call against one provider with one credential
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{provider} call failed ({kind}): {message}")]
pub struct ProviderCallError {
    pub provider: Provider,
    pub kind: ProviderFailureKind,
    pub message: String,
}

impl ProviderCallError {
    pub fn new(provider: Provider, kind: ProviderFailureKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(provider: Provider, timeout_ms: u64) -> Self {
        Self::new(
            provider,
            ProviderFailureKind::Timeout { timeout_ms },
            "no response within the call timeout",
        )
    }
}

/// Per-provider outcome recorded while routing a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProviderDiagnostic {
    /// The pool had no active credential left before or during routing
    NoActiveCredentials { provider: Provider, calls_made: u32 },
    /// Every attempted credential failed and the retry budget ran out
    CallsFailed {
        provider: Provider,
        failures: Vec<ProviderCallError>,
    },
}

impl ProviderDiagnostic {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderDiagnostic::NoActiveCredentials { provider, .. } => *provider,
            ProviderDiagnostic::CallsFailed { provider, .. } => *provider,
        }
    }
}

/// Structured payload of a terminal routing failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Exhaustion {
    /// No candidate provider has any configured credential
    NoProvidersConfigured,
    /// Candidates existed but none produced an answer for this request
    AllProvidersFailed { diagnostics: Vec<ProviderDiagnostic> },
}

impl Exhaustion {
    /// Total provider calls issued before giving up
    pub fn calls_made(&self) -> u32 {
        match self {
            Exhaustion::NoProvidersConfigured => 0,
            Exhaustion::AllProvidersFailed { diagnostics } => diagnostics
                .iter()
                .map(|d| match d {
                    ProviderDiagnostic::NoActiveCredentials { calls_made, .. } => *calls_made,
                    ProviderDiagnostic::CallsFailed { failures, .. } => failures.len() as u32,
                })
                .sum(),
        }
    }
}

impl fmt::Display for Exhaustion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exhaustion::NoProvidersConfigured => f.write_str("no providers configured"),
            Exhaustion::AllProvidersFailed { diagnostics } => {
                let providers: Vec<String> = diagnostics
                    .iter()
                    .map(|d| d.provider().to_string())
                    .collect();
                write!(
                    f,
                    "all configured providers failed this request ({})",
                    providers.join(", ")
                )
            }
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Unknown provider: {name}")]
    UnknownProvider { name: String },

    #[error("Page {page} not located")]
    PageNotFound { page: u32 },

    #[error(transparent)]
    ProviderCall(#[from] ProviderCallError),

    #[error("No active credentials for provider {provider}")]
    CredentialExhausted { provider: Provider },

    #[error("Routing exhausted: {0}")]
    RoutingExhausted(Exhaustion),

    #[error("Semantic search failed: {message}")]
    SemanticSearch { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Configuration source error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::UnknownProvider { .. } => ErrorCode::UnknownProvider,
            AppError::PageNotFound { .. } => ErrorCode::PageNotFound,
            AppError::ProviderCall(_) => ErrorCode::ProviderCallFailed,
            AppError::CredentialExhausted { .. } => ErrorCode::CredentialExhausted,
            AppError::RoutingExhausted(_) => ErrorCode::RoutingExhausted,
            AppError::SemanticSearch { .. } => ErrorCode::RetrievalDegraded,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } | AppError::Config(_) => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether this error should reach the caller.
    ///
    /// Everything else is converted into fallback behaviour plus a status
    /// flag inside the core.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppError::RoutingExhausted(_)
                | AppError::Validation { .. }
                | AppError::UnknownProvider { .. }
                | AppError::Configuration { .. }
                | AppError::Config(_)
        )
    }

    /// The exhaustion payload, if this is a terminal routing failure
    pub fn exhaustion(&self) -> Option<&Exhaustion> {
        match self {
            AppError::RoutingExhausted(exhaustion) => Some(exhaustion),
            _ => None,
        }
    }
}

/// Structured error body for the transport layer
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        let details = err
            .exhaustion()
            .and_then(|exhaustion| serde_json::to_value(exhaustion).ok());

        ErrorResponse {
            error: ErrorDetails {
                code: err.code(),
                message: err.to_string(),
                details,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::RoutingExhausted(Exhaustion::NoProvidersConfigured);
        assert_eq!(err.code(), ErrorCode::RoutingExhausted);
        assert_eq!(err.code().as_code(), 8003);
        assert!(err.is_terminal());
    }

    #[test]
    fn test_absorbable_errors_are_not_terminal() {
        let call = ProviderCallError::timeout(Provider::Groq, 500);
        assert!(!AppError::from(call).is_terminal());
        assert!(!AppError::PageNotFound { page: 3 }.is_terminal());
        assert!(!AppError::SemanticSearch { message: "down".into() }.is_terminal());
        assert!(!AppError::CredentialExhausted { provider: Provider::Google }.is_terminal());
    }

    #[test]
    fn test_exhaustion_distinguishes_reasons() {
        let none = Exhaustion::NoProvidersConfigured;
        assert_eq!(none.to_string(), "no providers configured");
        assert_eq!(none.calls_made(), 0);

        let failed = Exhaustion::AllProvidersFailed {
            diagnostics: vec![
                ProviderDiagnostic::NoActiveCredentials {
                    provider: Provider::Google,
                    calls_made: 0,
                },
                ProviderDiagnostic::CallsFailed {
                    provider: Provider::SambaNova,
                    failures: vec![
                        ProviderCallError::new(
                            Provider::SambaNova,
                            ProviderFailureKind::Status { status: 429 },
                            "quota",
                        ),
                        ProviderCallError::timeout(Provider::SambaNova, 1000),
                    ],
                },
            ],
        };
        assert_eq!(failed.calls_made(), 2);
        assert!(failed.to_string().contains("google, sambanova"));
    }

    #[test]
    fn test_error_response_carries_diagnostics() {
        let err = AppError::RoutingExhausted(Exhaustion::AllProvidersFailed {
            diagnostics: vec![ProviderDiagnostic::NoActiveCredentials {
                provider: Provider::Groq,
                calls_made: 0,
            }],
        });
        let body = ErrorResponse::from(&err);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["error"]["code"], "ROUTING_EXHAUSTED");
        assert_eq!(json["error"]["details"]["reason"], "all_providers_failed");
        assert_eq!(
            json["error"]["details"]["diagnostics"][0]["outcome"],
            "no_active_credentials"
        );
    }
}
