//! Knowledge Engine - Answers one query end to end
//!
//! Runs retrieval, then prompt assembly, then provider routing. Retrieval
//! (including any fallback) is complete before assembly starts.

use crate::assembler::{ContextAssembler, HistoryTurn};
use crate::credentials::{CredentialPool, CredentialStore};
use crate::providers::{build_adapters, AdapterMap};
use crate::retrieval::{
    EffectiveMode, RagMode, RetrievalCoordinator, RetrievalDegraded, SemanticSearch, SessionKnowledge,
};
use crate::router::{ProviderRouter, ProviderSelection};
use genesis_common::errors::{AppError, Result};
use genesis_common::{AppConfig, Provider};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// A question against the session's knowledge
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub query: String,
    pub session: SessionKnowledge,

    /// Prior turns, oldest first
    pub history: Vec<HistoryTurn>,

    pub rag_mode: RagMode,

    /// `None`, `"auto"`, a provider name, or `<provider>_primary|secondary`
    pub provider: Option<String>,

    pub model: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, session: SessionKnowledge) -> Self {
        Self {
            query: query.into(),
            session,
            ..Self::default()
        }
    }
}

/// Answer plus the metadata callers use to explain how it was produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub provider: Provider,
    pub model: String,
    pub rag_mode_used: EffectiveMode,
    pub requested_page: Option<u32>,
    pub page_located: bool,
    pub retrieval_degraded: Option<RetrievalDegraded>,
    pub prompt_truncated: bool,
}

pub struct KnowledgeEngine {
    coordinator: RetrievalCoordinator,
    assembler: ContextAssembler,
    router: ProviderRouter,
}

impl KnowledgeEngine {
    pub fn new(coordinator: RetrievalCoordinator, assembler: ContextAssembler, router: ProviderRouter) -> Self {
        Self {
            coordinator,
            assembler,
            router,
        }
    }

    /// Wire the engine with HTTP adapters and an in-memory credential pool
    pub fn from_config(config: &AppConfig, search: Arc<dyn SemanticSearch>) -> Result<Self> {
        let adapters = build_adapters(config)?;
        let credentials: Arc<dyn CredentialStore> = Arc::new(CredentialPool::from_config(&config.providers));
        Ok(Self::with_adapters(config, search, adapters, credentials))
    }

    pub fn with_adapters(
        config: &AppConfig,
        search: Arc<dyn SemanticSearch>,
        adapters: AdapterMap,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self::new(
            RetrievalCoordinator::new(config.retrieval.clone(), search),
            ContextAssembler::new(config.assembler.clone(), config.history.clone()),
            ProviderRouter::new(config, adapters, credentials),
        )
    }

    #[instrument(skip_all, fields(rag_mode = ?request.rag_mode, provider = ?request.provider))]
    pub async fn ask(&self, request: &QueryRequest) -> Result<Answer> {
        if request.query.trim().is_empty() {
            return Err(AppError::Validation {
                message: "query must not be empty".to_string(),
            });
        }
        // Reject a bad provider name before doing any retrieval work
        ProviderSelection::parse(request.provider.as_deref())?;

        let knowledge = self
            .coordinator
            .build_knowledge(&request.query, &request.session, request.rag_mode)
            .await;

        let context = self.assembler.assemble(
            &request.query,
            &request.history,
            &knowledge,
            knowledge.requested_page,
        );

        let outcome = self
            .router
            .route(&context.render(), request.provider.as_deref(), request.model.as_deref())
            .await?;

        info!(
            provider = %outcome.provider,
            model = %outcome.model,
            mode_used = %knowledge.mode_used,
            attempts = outcome.attempts,
            "Query answered"
        );

        Ok(Answer {
            text: outcome.text,
            provider: outcome.provider,
            model: outcome.model,
            rag_mode_used: knowledge.mode_used,
            requested_page: knowledge.requested_page,
            page_located: knowledge.page_located(),
            retrieval_degraded: knowledge.degraded,
            prompt_truncated: context.is_truncated(),
        })
    }
}
