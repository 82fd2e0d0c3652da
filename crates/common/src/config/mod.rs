//! Configuration management for the Genesis knowledge core
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Legacy single-key provider variables (GOOGLE_API_KEY_1, ...)
//! - Default values

use crate::errors::{AppError, Result};
use crate::provider::Provider;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Knowledge retrieval budgets
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Conversation history window
    #[serde(default)]
    pub history: HistoryConfig,

    /// Prompt assembly
    #[serde(default)]
    pub assembler: AssemblerConfig,

    /// Provider routing policy
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Provider endpoints and credentials
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Maximum characters of a located priority page
    #[serde(default = "default_priority_page_chars")]
    pub priority_page_chars: usize,

    /// Maximum characters of full document text in injection mode
    #[serde(default = "default_injection_chars")]
    pub injection_chars: usize,

    /// Maximum characters of full document text when semantic search falls back
    #[serde(default = "default_fallback_chars")]
    pub fallback_chars: usize,

    /// Chunks requested per document in semantic mode
    #[serde(default = "default_semantic_top_k")]
    pub semantic_top_k: usize,

    /// Hard cap on all injected knowledge text
    #[serde(default = "default_knowledge_budget")]
    pub knowledge_budget_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    /// Most recent turns carried into the prompt
    #[serde(default = "default_history_turns")]
    pub max_turns: usize,

    /// Per-turn truncation length
    #[serde(default = "default_turn_chars")]
    pub turn_max_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssemblerConfig {
    /// Global character budget for the outbound prompt
    #[serde(default = "default_prompt_budget")]
    pub prompt_budget_chars: usize,

    /// Name the assistant introduces itself with
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,

    /// Language every answer must be written in
    #[serde(default = "default_response_language")]
    pub response_language: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
    /// Distinct credentials tried per provider before advancing
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Per-call timeout in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Provider order used after keyword heuristics
    #[serde(default = "default_fallback_order")]
    pub fallback_order: Vec<Provider>,

    /// System prompt sent with every completion
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

/// Endpoint and credentials for one provider
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderSettings {
    /// Credentials, in configuration order
    #[serde(default)]
    pub api_keys: Vec<String>,

    /// API base URL override
    pub base_url: Option<String>,

    /// Model used when the caller does not name one
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub google: ProviderSettings,
    #[serde(default)]
    pub groq: ProviderSettings,
    #[serde(default)]
    pub sambanova: ProviderSettings,
    #[serde(default)]
    pub openrouter: ProviderSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name attached to log lines
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_priority_page_chars() -> usize { 20_000 }
fn default_injection_chars() -> usize { 200_000 }
fn default_fallback_chars() -> usize { 100_000 }
fn default_semantic_top_k() -> usize { 15 }
fn default_knowledge_budget() -> usize { 240_000 }
fn default_history_turns() -> usize { 20 }
fn default_turn_chars() -> usize { 1_000 }
fn default_prompt_budget() -> usize { 260_000 }
fn default_assistant_name() -> String { "Genesis".to_string() }
fn default_response_language() -> String { "Spanish".to_string() }
fn default_retry_budget() -> u32 { 3 }
fn default_call_timeout() -> u64 { 120 }
fn default_fallback_order() -> Vec<Provider> {
    vec![Provider::Google, Provider::Groq, Provider::SambaNova, Provider::OpenRouter]
}
fn default_system_prompt() -> String {
    "You are a helpful assistant. Answer using the context supplied in the user message \
     and format your answers clearly."
        .to_string()
}
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "genesis-context".to_string() }

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            priority_page_chars: default_priority_page_chars(),
            injection_chars: default_injection_chars(),
            fallback_chars: default_fallback_chars(),
            semantic_top_k: default_semantic_top_k(),
            knowledge_budget_chars: default_knowledge_budget(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_history_turns(),
            turn_max_chars: default_turn_chars(),
        }
    }
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            prompt_budget_chars: default_prompt_budget(),
            assistant_name: default_assistant_name(),
            response_language: default_response_language(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            retry_budget: default_retry_budget(),
            call_timeout_secs: default_call_timeout(),
            fallback_order: default_fallback_order(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

/// Keys parsed as comma-separated lists when read from the environment
const LIST_KEYS: &[&str] = &[
    "providers.google.api_keys",
    "providers.groq.api_keys",
    "providers.sambanova.api_keys",
    "providers.openrouter.api_keys",
    "routing.fallback_order",
];

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__ROUTING__RETRY_BUDGET=2
            .add_source(Self::environment())
            .build()?;

        Self::from_sources(config, |name| std::env::var(name).ok())
    }

    /// Load from a specific file, still honouring APP__ overrides
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Self::environment())
            .build()?;

        Self::from_sources(config, |name| std::env::var(name).ok())
    }

    /// Deserialize built sources, merge legacy credentials, then validate
    fn from_sources<F>(sources: Config, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: AppConfig = sources.try_deserialize()?;
        config.providers.merge_legacy_env(lookup);
        config.validate()?;
        Ok(config)
    }

    fn environment() -> Environment {
        let mut source = Environment::with_prefix("APP")
            .separator("__")
            .list_separator(",")
            .try_parsing(true);
        for key in LIST_KEYS {
            source = source.with_list_parse_key(key);
        }
        source
    }

    /// Reject budget and routing settings the core cannot honour
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        if r.priority_page_chars == 0 || r.injection_chars == 0 || r.fallback_chars == 0 {
            return Err(invalid("retrieval budgets must be greater than zero"));
        }
        if r.injection_chars <= r.priority_page_chars {
            return Err(invalid(
                "retrieval.injection_chars must be larger than retrieval.priority_page_chars",
            ));
        }
        if r.knowledge_budget_chars < r.priority_page_chars {
            return Err(invalid(
                "retrieval.knowledge_budget_chars must fit at least one priority page",
            ));
        }
        if r.semantic_top_k == 0 {
            return Err(invalid("retrieval.semantic_top_k must be greater than zero"));
        }
        if self.assembler.prompt_budget_chars == 0 {
            return Err(invalid("assembler.prompt_budget_chars must be greater than zero"));
        }
        if self.routing.retry_budget == 0 {
            return Err(invalid("routing.retry_budget must be at least 1"));
        }
        if self.routing.call_timeout_secs == 0 {
            return Err(invalid("routing.call_timeout_secs must be greater than zero"));
        }
        Ok(())
    }

    /// Get the per-call provider timeout as Duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.routing.call_timeout_secs)
    }
}

fn invalid(message: &str) -> AppError {
    AppError::Configuration {
        message: message.to_string(),
    }
}

impl ProvidersConfig {
    pub fn settings(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::Google => &self.google,
            Provider::Groq => &self.groq,
            Provider::SambaNova => &self.sambanova,
            Provider::OpenRouter => &self.openrouter,
        }
    }

    fn settings_mut(&mut self, provider: Provider) -> &mut ProviderSettings {
        match provider {
            Provider::Google => &mut self.google,
            Provider::Groq => &mut self.groq,
            Provider::SambaNova => &mut self.sambanova,
            Provider::OpenRouter => &mut self.openrouter,
        }
    }

    /// Configured credentials for a provider, in order
    pub fn api_keys(&self, provider: Provider) -> &[String] {
        &self.settings(provider).api_keys
    }

    pub fn base_url(&self, provider: Provider) -> String {
        self.settings(provider)
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(provider).to_string())
    }

    pub fn default_model(&self, provider: Provider) -> String {
        self.settings(provider)
            .default_model
            .clone()
            .unwrap_or_else(|| default_model(provider).to_string())
    }

    /// Append credentials found under the legacy variable names.
    ///
    /// `lookup` is injected so tests do not have to mutate the process environment.
    pub fn merge_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for provider in Provider::ALL {
            let found: Vec<String> = legacy_env_names(provider)
                .iter()
                .filter_map(|name| lookup(name))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .collect();
            if found.is_empty() {
                continue;
            }
            tracing::debug!(provider = %provider, count = found.len(), "Merged legacy credential variables");
            self.settings_mut(provider).api_keys.extend(found);
        }
    }
}

/// Pre-APP__ variable names still honoured for credentials
pub fn legacy_env_names(provider: Provider) -> &'static [&'static str] {
    match provider {
        Provider::Google => &[
            "GOOGLE_API_KEY",
            "GOOGLE_API_KEY_1",
            "GOOGLE_API_KEY_2",
            "GOOGLE_API_KEY_3",
        ],
        Provider::Groq => &["GROQ_API_KEY"],
        Provider::SambaNova => &["SAMBANOVA_API_KEY", "SAMBANOVA_API_KEY_2"],
        Provider::OpenRouter => &["OPENROUTER_API_KEY"],
    }
}

fn default_base_url(provider: Provider) -> &'static str {
    match provider {
        Provider::Google => "https://generativelanguage.googleapis.com/v1beta",
        Provider::Groq => "https://api.groq.com/openai/v1",
        Provider::SambaNova => "https://api.sambanova.ai/v1",
        Provider::OpenRouter => "https://openrouter.ai/api/v1",
    }
}

fn default_model(provider: Provider) -> &'static str {
    match provider {
        Provider::Google => "gemini-1.5-flash",
        Provider::Groq => "llama-3.3-70b-versatile",
        Provider::SambaNova => "Meta-Llama-3.3-70B-Instruct",
        Provider::OpenRouter => "meta-llama/llama-3.3-70b-instruct",
    }
}
