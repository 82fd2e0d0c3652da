//! Provider Router - Dispatches a prompt to an LLM provider
//!
//! Resolution order:
//! 1. An explicit provider (optionally pinned to a credential slot)
//! 2. The model-family heuristic table
//! 3. The configured fallback order
//!
//! Each candidate gets up to `retry_budget` attempts, each with a different
//! credential. Every failed attempt is reported to the credential store
//! before the next one.
//!
//! ```text
//! Idle -> SelectingProvider -> AttemptingCall -> Success
//!                ^                  |
//!                |                  +-> RetryingSameProvider -> AttemptingCall
//!                +------------------+-> AdvancingProvider
//!                                   +-> Exhausted
//! ```

use crate::credentials::{CredentialStore, Position};
use crate::providers::{AdapterMap, CompletionRequest, ProviderAdapter};
use genesis_common::config::RoutingConfig;
use genesis_common::errors::{
    AppError, Exhaustion, ProviderCallError, ProviderDiagnostic, ProviderFailureKind, Result,
};
use genesis_common::metrics::{self, ProviderCallTimer};
use genesis_common::{AppConfig, Provider, Secret};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Model-name keywords and the provider known to host that family.
///
/// Matched case-insensitively against the requested model; first hit wins.
pub const MODEL_HEURISTICS: &[(&str, Provider)] = &[
    ("gemini", Provider::Google),
    ("llama", Provider::SambaNova),
    ("deepseek", Provider::SambaNova),
    ("mixtral", Provider::Groq),
    ("gpt", Provider::OpenRouter),
    ("claude", Provider::OpenRouter),
];

/// Provider hosting the family named in `model`, if any
pub fn provider_for_model(model: &str) -> Option<Provider> {
    let model = model.to_ascii_lowercase();
    MODEL_HEURISTICS
        .iter()
        .find(|(keyword, _)| model.contains(keyword))
        .map(|(_, provider)| *provider)
}

/// How the caller asked for a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSelection {
    Auto,
    Provider(Provider),
    /// One attempt with the credential at a fixed slot
    Pinned(Provider, Position),
}

impl ProviderSelection {
    /// Parse `None`, `"auto"`, `"groq"` or `"groq_secondary"`
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Ok(ProviderSelection::Auto),
            Some(raw) if raw.eq_ignore_ascii_case("auto") => return Ok(ProviderSelection::Auto),
            Some(raw) => raw,
        };

        let unknown = || AppError::UnknownProvider {
            name: raw.to_string(),
        };

        if let Some((name, position)) = raw.rsplit_once('_') {
            if let Ok(position) = position.parse::<Position>() {
                let provider = name.parse::<Provider>().map_err(|_| unknown())?;
                return Ok(ProviderSelection::Pinned(provider, position));
            }
        }

        raw.parse::<Provider>()
            .map(ProviderSelection::Provider)
            .map_err(|_| unknown())
    }
}

/// One candidate in the routing plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub provider: Provider,
    pub model: String,
    pub retry_budget: u32,
}

/// Router states, logged as a request moves through them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Idle,
    SelectingProvider,
    AttemptingCall,
    RetryingSameProvider,
    AdvancingProvider,
    Success,
    Exhausted,
}

impl RouteState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RouteState::Success | RouteState::Exhausted)
    }
}

/// Successful routing result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteOutcome {
    pub text: String,
    pub provider: Provider,
    pub model: String,

    /// Provider calls made, including the successful one
    pub attempts: u32,
}

/// Walks the candidate plan against the credential store
pub struct ProviderRouter {
    config: RoutingConfig,
    adapters: AdapterMap,
    credentials: Arc<dyn CredentialStore>,
    default_models: HashMap<Provider, String>,
    call_timeout: Duration,
}

impl ProviderRouter {
    pub fn new(config: &AppConfig, adapters: AdapterMap, credentials: Arc<dyn CredentialStore>) -> Self {
        let default_models = Provider::ALL
            .into_iter()
            .map(|p| (p, config.providers.default_model(p)))
            .collect();

        Self {
            config: config.routing.clone(),
            adapters,
            credentials,
            default_models,
            call_timeout: config.call_timeout(),
        }
    }

    /// Override the per-call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Ordered candidates for a request, before availability filtering
    pub fn plan(&self, selection: ProviderSelection, explicit_model: Option<&str>) -> Vec<RoutingDecision> {
        let model_for = |provider: Provider, explicit: Option<&str>| {
            explicit
                .map(str::to_string)
                .or_else(|| self.default_models.get(&provider).cloned())
                .unwrap_or_default()
        };

        match selection {
            ProviderSelection::Pinned(provider, _) => vec![RoutingDecision {
                provider,
                model: model_for(provider, explicit_model),
                retry_budget: 1,
            }],
            ProviderSelection::Provider(provider) => vec![RoutingDecision {
                provider,
                model: model_for(provider, explicit_model),
                retry_budget: self.config.retry_budget,
            }],
            ProviderSelection::Auto => {
                let hinted = explicit_model.and_then(provider_for_model);
                if hinted.is_none() && explicit_model.is_some() {
                    debug!(model = ?explicit_model, "Model matches no provider family, using defaults");
                }

                let mut seen = HashSet::new();
                let mut plan = Vec::new();
                if let Some(provider) = hinted {
                    seen.insert(provider);
                    plan.push(RoutingDecision {
                        provider,
                        model: model_for(provider, explicit_model),
                        retry_budget: self.config.retry_budget,
                    });
                }
                for provider in &self.config.fallback_order {
                    if seen.insert(*provider) {
                        plan.push(RoutingDecision {
                            provider: *provider,
                            model: model_for(*provider, None),
                            retry_budget: self.config.retry_budget,
                        });
                    }
                }
                plan
            }
        }
    }

    /// Send `prompt` to the first provider that answers.
    ///
    /// Fails with [`AppError::RoutingExhausted`] once every candidate has
    /// run out of credentials or attempts.
    pub async fn route(
        &self,
        prompt: &str,
        explicit_provider: Option<&str>,
        explicit_model: Option<&str>,
    ) -> Result<RouteOutcome> {
        let selection = ProviderSelection::parse(explicit_provider)?;
        let pinned = match selection {
            ProviderSelection::Pinned(_, position) => Some(position),
            _ => None,
        };

        let mut state = RouteState::Idle;
        let plan: Vec<(RoutingDecision, &Arc<dyn ProviderAdapter>)> = self
            .plan(selection, explicit_model)
            .into_iter()
            .filter(|decision| self.credentials.has_credentials(decision.provider))
            .filter_map(|decision| {
                let adapter = self.adapters.get(&decision.provider)?;
                Some((decision, adapter))
            })
            .collect();

        if plan.is_empty() {
            transition(&mut state, RouteState::Exhausted);
            return Err(self.exhausted(Exhaustion::NoProvidersConfigured));
        }

        let mut diagnostics = Vec::with_capacity(plan.len());
        let mut attempts = 0u32;

        for (decision, adapter) in plan {
            transition(&mut state, RouteState::SelectingProvider);
            let provider = decision.provider;
            let request = CompletionRequest {
                model: decision.model.clone(),
                system_prompt: self.config.system_prompt.clone(),
                user_prompt: prompt.to_string(),
            };

            let mut failures: Vec<ProviderCallError> = Vec::new();
            let mut tried: HashSet<Secret> = HashSet::new();

            for attempt in 0..decision.retry_budget {
                let secret = match pinned {
                    Some(position) => self.credentials.select_by_position(provider, position),
                    None => self.credentials.select(provider),
                };
                let Some(secret) = secret else {
                    debug!(provider = %provider, "Credential pool exhausted");
                    break;
                };
                if !tried.insert(secret.clone()) {
                    break;
                }

                if attempt > 0 {
                    transition(&mut state, RouteState::RetryingSameProvider);
                }
                transition(&mut state, RouteState::AttemptingCall);
                attempts += 1;

                match self.call(adapter.as_ref(), &secret, &request).await {
                    Ok(text) => {
                        transition(&mut state, RouteState::Success);
                        info!(
                            provider = %provider,
                            model = %decision.model,
                            attempts,
                            "Provider call succeeded"
                        );
                        return Ok(RouteOutcome {
                            text,
                            provider,
                            model: decision.model,
                            attempts,
                        });
                    }
                    Err(error) => {
                        warn!(
                            provider = %provider,
                            credential = %secret,
                            error = %error,
                            "Provider call failed"
                        );
                        self.credentials.report_failure(provider, &secret);
                        failures.push(error);
                    }
                }
            }

            diagnostics.push(if failures.is_empty() {
                ProviderDiagnostic::NoActiveCredentials {
                    provider,
                    calls_made: 0,
                }
            } else {
                ProviderDiagnostic::CallsFailed { provider, failures }
            });
            transition(&mut state, RouteState::AdvancingProvider);
        }

        transition(&mut state, RouteState::Exhausted);
        Err(self.exhausted(Exhaustion::AllProvidersFailed { diagnostics }))
    }

    /// One provider call under the per-call timeout
    async fn call(
        &self,
        adapter: &dyn ProviderAdapter,
        secret: &Secret,
        request: &CompletionRequest,
    ) -> std::result::Result<String, ProviderCallError> {
        let provider = adapter.provider();
        let timer = ProviderCallTimer::start(provider.as_str());

        let result = match tokio::time::timeout(self.call_timeout, adapter.complete(secret, request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderCallError::timeout(
                provider,
                self.call_timeout.as_millis() as u64,
            )),
        };

        timer.finish(match &result {
            Ok(_) => "success",
            Err(e) => outcome_label(&e.kind),
        });
        result
    }

    fn exhausted(&self, exhaustion: Exhaustion) -> AppError {
        let reason = match exhaustion {
            Exhaustion::NoProvidersConfigured => "no_providers_configured",
            Exhaustion::AllProvidersFailed { .. } => "all_providers_failed",
        };
        metrics::record_routing_exhausted(reason);
        warn!(reason, calls = exhaustion.calls_made(), "Routing exhausted");
        AppError::RoutingExhausted(exhaustion)
    }
}

fn transition(state: &mut RouteState, next: RouteState) {
    debug_assert!(!state.is_terminal(), "left terminal state {:?}", state);
    debug!(from = ?state, to = ?next, "Route state");
    *state = next;
}

fn outcome_label(kind: &ProviderFailureKind) -> &'static str {
    match kind {
        ProviderFailureKind::Timeout { .. } => "timeout",
        ProviderFailureKind::Status { .. } => "status",
        ProviderFailureKind::Transport => "transport",
        ProviderFailureKind::MalformedResponse => "malformed",
        ProviderFailureKind::EmptyResponse => "empty",
    }
}
