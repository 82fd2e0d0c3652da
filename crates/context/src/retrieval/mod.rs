//! Knowledge retrieval for a session
//!
//! Provides two retrieval modes:
//! - Injection (page block plus truncated full text)
//! - Semantic (page block plus top-k chunks from the vector index)
//!
//! Semantic retrieval that yields nothing degrades to injection and says so.

mod budget;
mod coordinator;

pub use budget::{char_len, truncate_chars, CharBudget};
pub use coordinator::RetrievalCoordinator;

use crate::page::PageMapping;
use async_trait::async_trait;
use genesis_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Retrieval mode requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RagMode {
    /// Inject the document text directly
    #[default]
    Injection,
    /// Retrieve chunks through semantic search
    Semantic,
}

impl FromStr for RagMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "injection" => Ok(RagMode::Injection),
            "semantic" => Ok(RagMode::Semantic),
            other => Err(AppError::Validation {
                message: format!("unknown rag mode '{}'", other),
            }),
        }
    }
}

/// Retrieval mode that actually produced the knowledge text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectiveMode {
    #[serde(rename = "injection")]
    Injection,
    #[serde(rename = "semantic")]
    Semantic,
    /// Semantic was requested but injection supplied the text
    #[serde(rename = "injection (fallback)")]
    InjectionFallback,
}

impl EffectiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveMode::Injection => "injection",
            EffectiveMode::Semantic => "semantic",
            EffectiveMode::InjectionFallback => "injection (fallback)",
        }
    }
}

impl From<RagMode> for EffectiveMode {
    fn from(mode: RagMode) -> Self {
        match mode {
            RagMode::Injection => EffectiveMode::Injection,
            RagMode::Semantic => EffectiveMode::Semantic,
        }
    }
}

impl fmt::Display for EffectiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<&str> for EffectiveMode {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Chunk returned by semantic search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Chunk content
    pub content: String,

    /// Relevance score (higher is better)
    pub score: f32,
}

impl RetrievedChunk {
    pub fn new(content: impl Into<String>, score: f32) -> Self {
        Self {
            content: content.into(),
            score,
        }
    }
}

/// An ingested document attached to the session
#[derive(Debug, Clone)]
pub struct SessionDocument {
    /// Identifier used by the semantic search collaborator
    pub id: Uuid,

    /// Display title
    pub title: String,

    /// Extracted text with page markers
    pub text: String,

    /// Physical → internal page mapping, when ingestion produced one
    pub page_mapping: Option<PageMapping>,
}

impl SessionDocument {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            text: text.into(),
            page_mapping: None,
        }
    }

    pub fn with_mapping(mut self, mapping: PageMapping) -> Self {
        self.page_mapping = Some(mapping);
        self
    }
}

/// Pre-rendered code repository context attached to the session
#[derive(Debug, Clone)]
pub struct RepositoryContext {
    pub name: String,
    pub content: String,
}

/// Everything the session can draw knowledge from
#[derive(Debug, Clone, Default)]
pub struct SessionKnowledge {
    pub documents: Vec<SessionDocument>,
    pub repositories: Vec<RepositoryContext>,
}

impl SessionKnowledge {
    pub fn has_documents(&self) -> bool {
        !self.documents.is_empty()
    }

    pub fn has_repositories(&self) -> bool {
        !self.repositories.is_empty()
    }
}

/// Why retrieval came out weaker than requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RetrievalDegraded {
    /// Search answered but returned no chunks
    NoResults,
    /// Search failed for some documents
    SearchFailed { failed_documents: usize },
}

/// Knowledge assembled for one query, split into labelled blocks
#[derive(Debug, Clone)]
pub struct Knowledge {
    /// Repository file context
    pub repository_block: Option<String>,

    /// Located page content, delimited as priority context
    pub priority_block: Option<String>,

    /// Full text or retrieved chunks
    pub retrieval_block: Option<String>,

    /// Mode that produced `retrieval_block`
    pub mode_used: EffectiveMode,

    /// Page referenced by the query, if any
    pub requested_page: Option<u32>,

    /// Degradation status, when semantic retrieval under-delivered
    pub degraded: Option<RetrievalDegraded>,

    pub has_documents: bool,
    pub has_repositories: bool,
}

impl Knowledge {
    /// Knowledge for a session with nothing attached
    pub fn empty(mode: RagMode) -> Self {
        Self {
            repository_block: None,
            priority_block: None,
            retrieval_block: None,
            mode_used: mode.into(),
            requested_page: None,
            degraded: None,
            has_documents: false,
            has_repositories: false,
        }
    }

    pub fn page_located(&self) -> bool {
        self.priority_block.is_some()
    }

    /// All blocks concatenated in order
    pub fn text(&self) -> String {
        [&self.repository_block, &self.priority_block, &self.retrieval_block]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.repository_block.is_none()
            && self.priority_block.is_none()
            && self.retrieval_block.is_none()
    }
}

/// Semantic search collaborator (vector index lookup)
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Top-k chunks of one document for a query, best first.
    ///
    /// An empty list is a valid answer, not an error.
    async fn search(&self, document_id: Uuid, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>>;
}

/// Search backend for deployments without a vector index.
///
/// Always returns nothing, so semantic requests degrade to injection.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSemanticSearch;

#[async_trait]
impl SemanticSearch for NoSemanticSearch {
    async fn search(&self, _document_id: Uuid, _query: &str, _top_k: usize) -> Result<Vec<RetrievedChunk>> {
        Ok(Vec::new())
    }
}
