//! Language-model provider adapters
//!
//! Each adapter turns a system prompt plus user prompt into one HTTP call
//! and maps every non-success outcome to a typed [`ProviderCallError`], so
//! the router can report the credential that was used.

mod gemini;
mod openai_compat;

pub use gemini::GeminiAdapter;
pub use openai_compat::OpenAiCompatAdapter;

use async_trait::async_trait;
use genesis_common::errors::{AppError, ProviderCallError, ProviderFailureKind, Result};
use genesis_common::{AppConfig, Provider, Secret};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Characters of an error body kept in a failure message
const ERROR_BODY_PREVIEW: usize = 300;

/// Sampling temperature for grounded answers
pub(crate) const TEMPERATURE: f32 = 0.2;

/// One completion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
}

/// A "complete(system, user) -> text" capability backed by one provider
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Run one completion with `credential`.
    ///
    /// Any outcome other than non-empty text is an error.
    async fn complete(
        &self,
        credential: &Secret,
        request: &CompletionRequest,
    ) -> std::result::Result<String, ProviderCallError>;
}

/// Adapters keyed by provider
pub type AdapterMap = HashMap<Provider, Arc<dyn ProviderAdapter>>;

/// HTTP adapters for every known provider, sharing one client
pub fn build_adapters(config: &AppConfig) -> Result<AdapterMap> {
    // The router enforces the per-call timeout; the client timeout is a backstop.
    let client = http_client(config.call_timeout() + Duration::from_secs(5))?;
    let providers = &config.providers;

    let mut adapters: AdapterMap = HashMap::new();
    for provider in Provider::ALL {
        let base_url = providers.base_url(provider);
        let adapter: Arc<dyn ProviderAdapter> = match provider {
            Provider::Google => Arc::new(GeminiAdapter::new(client.clone(), base_url)),
            Provider::Groq | Provider::SambaNova | Provider::OpenRouter => {
                Arc::new(OpenAiCompatAdapter::new(provider, client.clone(), base_url))
            }
        };
        adapters.insert(provider, adapter);
    }
    Ok(adapters)
}

pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// Check the status and decode a JSON body
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: Provider,
    response: reqwest::Response,
) -> std::result::Result<T, ProviderCallError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
        return Err(ProviderCallError::new(
            provider,
            ProviderFailureKind::Status {
                status: status.as_u16(),
            },
            preview,
        ));
    }

    response.json::<T>().await.map_err(|e| {
        ProviderCallError::new(provider, ProviderFailureKind::MalformedResponse, e.to_string())
    })
}

pub(crate) fn transport_error(provider: Provider, error: reqwest::Error) -> ProviderCallError {
    ProviderCallError::new(provider, ProviderFailureKind::Transport, error.to_string())
}

/// Reject blank completions
pub(crate) fn non_empty(
    provider: Provider,
    text: Option<String>,
) -> std::result::Result<String, ProviderCallError> {
    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ProviderCallError::new(
            provider,
            ProviderFailureKind::EmptyResponse,
            "completion contained no text",
        )),
    }
}
