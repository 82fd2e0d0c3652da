//! Metrics and observability utilities
//!
//! Provides metric descriptions and recording helpers for retrieval and
//! provider routing, using the `metrics` facade so any exporter can be
//! installed by the embedding binary.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Genesis metrics
pub const METRICS_PREFIX: &str = "genesis";

/// Register all metric descriptions
pub fn register_metrics() {
    // Provider metrics
    describe_counter!(
        format!("{}_provider_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Provider completion calls by provider and outcome"
    );

    describe_histogram!(
        format!("{}_provider_call_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Provider completion latency in seconds"
    );

    describe_counter!(
        format!("{}_credentials_deactivated_total", METRICS_PREFIX),
        Unit::Count,
        "Credentials removed from rotation after a failure"
    );

    describe_counter!(
        format!("{}_routing_exhausted_total", METRICS_PREFIX),
        Unit::Count,
        "Requests for which every provider failed"
    );

    // Retrieval metrics
    describe_counter!(
        format!("{}_retrieval_total", METRICS_PREFIX),
        Unit::Count,
        "Knowledge retrievals by effective mode"
    );

    describe_counter!(
        format!("{}_retrieval_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Semantic retrievals that degraded to full-text injection"
    );

    describe_counter!(
        format!("{}_page_lookups_total", METRICS_PREFIX),
        Unit::Count,
        "Page locator lookups by winning strategy"
    );

    describe_counter!(
        format!("{}_prompt_truncations_total", METRICS_PREFIX),
        Unit::Count,
        "Assembled prompts that had to be cut to the budget"
    );

    tracing::info!("Metrics registered");
}

/// Helper to time a single provider call
pub struct ProviderCallTimer {
    start: Instant,
    provider: String,
}

impl ProviderCallTimer {
    /// Start timing a call
    pub fn start(provider: &str) -> Self {
        Self {
            start: Instant::now(),
            provider: provider.to_string(),
        }
    }

    /// Record completion with an outcome label (success, timeout, status, ...)
    pub fn finish(self, outcome: &str) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_provider_calls_total", METRICS_PREFIX),
            "provider" => self.provider.clone(),
            "outcome" => outcome.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_provider_call_duration_seconds", METRICS_PREFIX),
            "provider" => self.provider
        )
        .record(duration);
    }
}

/// Helper to record a credential leaving rotation
pub fn record_credential_deactivated(provider: &str) {
    counter!(
        format!("{}_credentials_deactivated_total", METRICS_PREFIX),
        "provider" => provider.to_string()
    )
    .increment(1);
}

/// Helper to record a terminal routing failure
pub fn record_routing_exhausted(reason: &str) {
    counter!(
        format!("{}_routing_exhausted_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Helper to record retrieval metrics
pub fn record_retrieval(mode: &str, fell_back: bool) {
    counter!(
        format!("{}_retrieval_total", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .increment(1);

    if fell_back {
        counter!(format!("{}_retrieval_fallbacks_total", METRICS_PREFIX)).increment(1);
    }
}

/// Helper to record which page-locator strategy answered (or "miss")
pub fn record_page_lookup(strategy: &str) {
    counter!(
        format!("{}_page_lookups_total", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .increment(1);
}

/// Helper to record a prompt cut to the budget
pub fn record_prompt_truncation() {
    counter!(format!("{}_prompt_truncations_total", METRICS_PREFIX)).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_without_exporter() {
        let timer = ProviderCallTimer::start("groq");
        timer.finish("success");
        record_retrieval("injection (fallback)", true);
        record_page_lookup("mapped");
        // Just verify they run without panic when no recorder is installed
    }
}
