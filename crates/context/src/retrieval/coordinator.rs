//! Retrieval Coordinator - Chooses and runs the knowledge strategy
//!
//! Provides:
//! - Priority page injection whenever the query names a page
//! - Full-text injection or semantic chunk retrieval
//! - Automatic fallback to injection when semantic retrieval yields nothing
//! - A global character budget across all injected text

use super::budget::CharBudget;
use super::{
    EffectiveMode, Knowledge, RagMode, RetrievalDegraded, RetrievedChunk, SemanticSearch,
    SessionDocument, SessionKnowledge,
};
use crate::page::{PageLocator, PagePatternMatcher};
use futures::future::join_all;
use genesis_common::config::RetrievalConfig;
use genesis_common::metrics;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Delimiter row around priority page content
const PRIORITY_RULE: &str = "!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!";

/// Separator between semantic chunks
const CHUNK_SEPARATOR: &str = "\n---\n";

/// Outcome of semantic search across all session documents
struct SearchOutcome {
    chunks: Vec<RetrievedChunk>,
    failed_documents: usize,
}

/// Builds the knowledge block for a query
pub struct RetrievalCoordinator {
    config: RetrievalConfig,
    search: Arc<dyn SemanticSearch>,
    matcher: PagePatternMatcher,
    locator: PageLocator,
}

impl RetrievalCoordinator {
    /// Create a new coordinator
    pub fn new(config: RetrievalConfig, search: Arc<dyn SemanticSearch>) -> Self {
        Self {
            config,
            search,
            matcher: PagePatternMatcher::new(),
            locator: PageLocator::new(),
        }
    }

    /// Assemble knowledge for `query` from the session's documents and repositories.
    ///
    /// Never fails: search errors degrade the result and are reported through
    /// [`Knowledge::degraded`] and [`Knowledge::mode_used`].
    pub async fn build_knowledge(
        &self,
        query: &str,
        session: &SessionKnowledge,
        mode: RagMode,
    ) -> Knowledge {
        let mut knowledge = Knowledge::empty(mode);
        knowledge.has_documents = session.has_documents();
        knowledge.has_repositories = session.has_repositories();
        knowledge.requested_page = self.matcher.detect_page_number(query);

        let mut budget = CharBudget::new(self.config.knowledge_budget_chars);

        // The priority page is charged first; repositories and document text get what is left
        if let Some(page) = knowledge.requested_page {
            knowledge.priority_block = self.priority_block(page, &session.documents, &mut budget);
        }

        knowledge.repository_block = self.repository_block(session, &mut budget);

        if !session.has_documents() {
            debug!(mode = ?mode, "No session documents, skipping document retrieval");
            return knowledge;
        }

        match mode {
            RagMode::Injection => {
                knowledge.retrieval_block = self.full_text_block(
                    &session.documents,
                    self.config.injection_chars,
                    "FULL TEXT",
                    &mut budget,
                );
            }
            RagMode::Semantic => {
                let outcome = self.semantic_search(query, &session.documents).await;

                if outcome.failed_documents > 0 {
                    knowledge.degraded = Some(RetrievalDegraded::SearchFailed {
                        failed_documents: outcome.failed_documents,
                    });
                } else if outcome.chunks.is_empty() {
                    knowledge.degraded = Some(RetrievalDegraded::NoResults);
                }

                if !outcome.chunks.is_empty() {
                    knowledge.retrieval_block = Self::chunk_block(&outcome.chunks, &mut budget);
                } else if knowledge.priority_block.is_none() {
                    warn!(
                        failed_documents = outcome.failed_documents,
                        "Semantic retrieval empty, falling back to injection"
                    );
                    knowledge.mode_used = EffectiveMode::InjectionFallback;
                    knowledge.retrieval_block = self.full_text_block(
                        &session.documents,
                        self.config.fallback_chars,
                        "GENERAL CONTEXT (fallback)",
                        &mut budget,
                    );
                }
            }
        }

        metrics::record_retrieval(
            knowledge.mode_used.as_str(),
            knowledge.mode_used == EffectiveMode::InjectionFallback,
        );
        info!(
            requested_mode = ?mode,
            mode_used = %knowledge.mode_used,
            requested_page = ?knowledge.requested_page,
            page_located = knowledge.page_located(),
            degraded = ?knowledge.degraded,
            remaining_budget = budget.remaining(),
            "Knowledge assembled"
        );

        knowledge
    }

    fn repository_block(&self, session: &SessionKnowledge, budget: &mut CharBudget) -> Option<String> {
        let mut block = String::new();
        for repo in &session.repositories {
            block.push_str(&format!("=== REPOSITORY: {} ===\n{}\n\n", repo.name, repo.content));
        }
        budget.fit(&block)
    }

    /// Delimited block for every document in which `page` could be located
    fn priority_block(
        &self,
        page: u32,
        documents: &[SessionDocument],
        budget: &mut CharBudget,
    ) -> Option<String> {
        let mut page_budget = CharBudget::new(self.config.priority_page_chars);
        let mut block = String::new();

        for document in documents {
            let Some(located) = self.locator.locate(&document.text, page, document.page_mapping.as_ref())
            else {
                continue;
            };
            let Some(content) = page_budget.fit(&located.text) else {
                break;
            };
            info!(
                page,
                document = %document.title,
                internal_page = located.internal_page,
                strategy = located.strategy.label(),
                "Injected priority page"
            );
            block.push_str(&format!(
                "{rule}\nPRIORITY CONTEXT: PAGE {page} ({title})\n{rule}\n{content}\n{rule}\nEND OF PRIORITY CONTEXT\n\n",
                rule = PRIORITY_RULE,
                page = page,
                title = document.title,
                content = content,
            ));
        }

        if block.is_empty() {
            debug!(page, "Requested page not located in any session document");
            return None;
        }
        budget.fit(&block)
    }

    /// Document text, each document truncated to what is left of `limit`
    fn full_text_block(
        &self,
        documents: &[SessionDocument],
        limit: usize,
        label: &str,
        budget: &mut CharBudget,
    ) -> Option<String> {
        let mut mode_budget = CharBudget::new(limit);
        let mut block = String::new();

        for document in documents {
            let Some(text) = mode_budget.fit(&document.text) else {
                break;
            };
            block.push_str(&format!("--- {}: {} ---\n{}\n\n", label, document.title, text));
        }

        budget.fit(&block)
    }

    fn chunk_block(chunks: &[RetrievedChunk], budget: &mut CharBudget) -> Option<String> {
        let body: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let block = format!(
            "--- OTHER RELEVANT FRAGMENTS ({}) ---\n{}\n\n",
            chunks.len(),
            body.join(CHUNK_SEPARATOR)
        );
        budget.fit(&block)
    }

    /// Search every document concurrently; merged chunks are ordered by score,
    /// ties keeping document order
    async fn semantic_search(&self, query: &str, documents: &[SessionDocument]) -> SearchOutcome {
        let top_k = self.config.semantic_top_k;
        let searches = documents
            .iter()
            .map(|document| self.search.search(document.id, query, top_k));
        let results = join_all(searches).await;

        let mut outcome = SearchOutcome {
            chunks: Vec::new(),
            failed_documents: 0,
        };
        for (document, result) in documents.iter().zip(results) {
            match result {
                Ok(chunks) => {
                    debug!(document = %document.title, chunks = chunks.len(), "Semantic search returned");
                    outcome.chunks.extend(
                        chunks
                            .into_iter()
                            .filter(|c| !c.content.trim().is_empty()),
                    );
                }
                Err(e) => {
                    warn!(document = %document.title, error = %e, "Semantic search failed");
                    outcome.failed_documents += 1;
                }
            }
        }
        outcome.chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageMapping;
    use crate::retrieval::{NoSemanticSearch, RepositoryContext};
    use async_trait::async_trait;
    use genesis_common::errors::{AppError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Search stub returning fixed chunks, or failing
    struct FixedSearch {
        chunks: Vec<RetrievedChunk>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FixedSearch {
        fn returning(chunks: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                chunks: chunks.iter().map(|c| RetrievedChunk::new(*c, 0.9)).collect(),
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                chunks: Vec::new(),
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SemanticSearch for FixedSearch {
        async fn search(&self, _id: Uuid, _query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::SemanticSearch {
                    message: "index offline".into(),
                });
            }
            Ok(self.chunks.iter().take(top_k).cloned().collect())
        }
    }

    /// Search stub failing for one document and answering for the rest
    struct PartialSearch {
        failing: Uuid,
        chunks: Vec<RetrievedChunk>,
    }

    #[async_trait]
    impl SemanticSearch for PartialSearch {
        async fn search(&self, id: Uuid, _query: &str, _top_k: usize) -> Result<Vec<RetrievedChunk>> {
            if id == self.failing {
                return Err(AppError::SemanticSearch {
                    message: "shard unavailable".into(),
                });
            }
            Ok(self.chunks.clone())
        }
    }

    /// Search stub returning one scored chunk per document
    struct ScoredSearch {
        by_document: Vec<(Uuid, RetrievedChunk)>,
    }

    #[async_trait]
    impl SemanticSearch for ScoredSearch {
        async fn search(&self, id: Uuid, _query: &str, _top_k: usize) -> Result<Vec<RetrievedChunk>> {
            Ok(self
                .by_document
                .iter()
                .filter(|(document, _)| *document == id)
                .map(|(_, chunk)| chunk.clone())
                .collect())
        }
    }

    fn book() -> SessionDocument {
        SessionDocument::new(
            "Nuestro Planeta",
            "--- PAGE 1 ---\nIntro text\n--- PAGE 2 ---\nOceans cover the planet\n--- PAGE 3 ---\nEnd",
        )
    }

    fn session(documents: Vec<SessionDocument>) -> SessionKnowledge {
        SessionKnowledge {
            documents,
            repositories: Vec::new(),
        }
    }

    fn coordinator(search: Arc<dyn SemanticSearch>) -> RetrievalCoordinator {
        RetrievalCoordinator::new(RetrievalConfig::default(), search)
    }

    #[tokio::test]
    async fn test_injection_with_page_prepends_priority_block() {
        let coordinator = coordinator(Arc::new(NoSemanticSearch));
        let knowledge = coordinator
            .build_knowledge("¿Qué dice la página 2?", &session(vec![book()]), RagMode::Injection)
            .await;

        assert_eq!(knowledge.mode_used, EffectiveMode::Injection);
        assert_eq!(knowledge.requested_page, Some(2));
        let priority = knowledge.priority_block.as_deref().unwrap();
        assert!(priority.contains("PRIORITY CONTEXT: PAGE 2"));
        assert!(priority.contains("Oceans cover the planet"));

        let text = knowledge.text();
        let priority_at = text.find("PRIORITY CONTEXT").unwrap();
        let full_at = text.find("--- FULL TEXT").unwrap();
        assert!(priority_at < full_at);
    }

    #[tokio::test]
    async fn test_injection_truncates_full_text() {
        let mut config = RetrievalConfig::default();
        config.priority_page_chars = 5;
        config.injection_chars = 10;
        let coordinator = RetrievalCoordinator::new(config, Arc::new(NoSemanticSearch));

        let document = SessionDocument::new("Long", "x".repeat(1000));
        let knowledge = coordinator
            .build_knowledge("summarise", &session(vec![document]), RagMode::Injection)
            .await;

        let block = knowledge.retrieval_block.unwrap();
        assert!(block.contains(&"x".repeat(10)));
        assert!(!block.contains(&"x".repeat(11)));
    }

    #[tokio::test]
    async fn test_semantic_uses_chunks() {
        let search = FixedSearch::returning(&["chunk one", "chunk two"]);
        let coordinator = coordinator(search.clone());
        let knowledge = coordinator
            .build_knowledge("oceans", &session(vec![book()]), RagMode::Semantic)
            .await;

        assert_eq!(knowledge.mode_used, EffectiveMode::Semantic);
        assert_eq!(knowledge.degraded, None);
        let block = knowledge.retrieval_block.unwrap();
        assert!(block.contains("chunk one\n---\nchunk two"));
        assert!(block.contains("(2)"));
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_semantic_empty_falls_back_to_injection() {
        let coordinator = coordinator(FixedSearch::returning(&[]));
        let knowledge = coordinator
            .build_knowledge("oceans", &session(vec![book()]), RagMode::Semantic)
            .await;

        assert!(knowledge.mode_used == "injection (fallback)");
        assert_eq!(knowledge.degraded, Some(RetrievalDegraded::NoResults));
        let text = knowledge.text();
        assert!(!text.is_empty());
        assert!(text.contains("GENERAL CONTEXT (fallback)"));
        assert!(text.contains("Oceans cover the planet"));
    }

    #[tokio::test]
    async fn test_semantic_error_falls_back_and_is_recorded() {
        let coordinator = coordinator(FixedSearch::failing());
        let knowledge = coordinator
            .build_knowledge("oceans", &session(vec![book(), book()]), RagMode::Semantic)
            .await;

        assert_eq!(knowledge.mode_used, EffectiveMode::InjectionFallback);
        assert_eq!(
            knowledge.degraded,
            Some(RetrievalDegraded::SearchFailed { failed_documents: 2 })
        );
    }

    #[tokio::test]
    async fn test_semantic_with_page_does_not_fall_back() {
        let coordinator = coordinator(FixedSearch::returning(&[]));
        let knowledge = coordinator
            .build_knowledge("page 3 please", &session(vec![book()]), RagMode::Semantic)
            .await;

        // The page block already satisfies the request
        assert_eq!(knowledge.mode_used, EffectiveMode::Semantic);
        assert!(knowledge.page_located());
        assert!(knowledge.retrieval_block.is_none());
        assert_eq!(knowledge.degraded, Some(RetrievalDegraded::NoResults));
    }

    #[tokio::test]
    async fn test_semantic_page_block_precedes_chunks() {
        let coordinator = coordinator(FixedSearch::returning(&["related"]));
        let knowledge = coordinator
            .build_knowledge("pagina 1", &session(vec![book()]), RagMode::Semantic)
            .await;

        let text = knowledge.text();
        assert!(text.find("Intro text").unwrap() < text.find("related").unwrap());
    }

    #[tokio::test]
    async fn test_mapping_used_for_priority_page() {
        let mapping: PageMapping = [(1, 3)].into_iter().collect();
        let document = book().with_mapping(mapping);
        let coordinator = coordinator(Arc::new(NoSemanticSearch));
        let knowledge = coordinator
            .build_knowledge("page 1", &session(vec![document]), RagMode::Injection)
            .await;

        let priority = knowledge.priority_block.unwrap();
        assert!(priority.contains("End"));
        assert!(!priority.contains("Intro text"));
    }

    #[tokio::test]
    async fn test_no_documents_keeps_requested_mode() {
        let search = FixedSearch::returning(&[]);
        let coordinator = coordinator(search.clone());
        let session = SessionKnowledge {
            documents: Vec::new(),
            repositories: vec![RepositoryContext {
                name: "genesis-web".into(),
                content: "src/App.tsx".into(),
            }],
        };
        let knowledge = coordinator
            .build_knowledge("page 4", &session, RagMode::Semantic)
            .await;

        assert_eq!(knowledge.mode_used, EffectiveMode::Semantic);
        assert!(knowledge.repository_block.unwrap().contains("REPOSITORY: genesis-web"));
        assert!(knowledge.priority_block.is_none());
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_total_budget_is_respected() {
        let mut config = RetrievalConfig::default();
        config.knowledge_budget_chars = 300;
        config.priority_page_chars = 100;
        config.injection_chars = 10_000;
        let coordinator = RetrievalCoordinator::new(config, Arc::new(NoSemanticSearch));

        let text = format!("--- PAGE 1 ---\n{}\n--- PAGE 2 ---\n{}", "a".repeat(500), "b".repeat(5000));
        let knowledge = coordinator
            .build_knowledge("page 1", &session(vec![SessionDocument::new("Doc", text)]), RagMode::Injection)
            .await;

        assert!(knowledge.text().chars().count() <= 300);
        // priority content was cut to its own budget, not dropped
        assert!(knowledge.priority_block.unwrap().contains(&"a".repeat(100)));
    }

    #[tokio::test]
    async fn test_priority_page_survives_oversized_repository() {
        let mut config = RetrievalConfig::default();
        config.knowledge_budget_chars = 1_000;
        config.priority_page_chars = 200;
        config.injection_chars = 500;
        let coordinator = RetrievalCoordinator::new(config, Arc::new(NoSemanticSearch));

        let session = SessionKnowledge {
            documents: vec![SessionDocument::new(
                "Doc",
                "--- PAGE 1 ---\nfirst\n--- PAGE 2 ---\nPAGE TWO BODY\n--- PAGE 3 ---\nlast",
            )],
            repositories: vec![RepositoryContext {
                name: "monorepo".into(),
                content: "r".repeat(5_000),
            }],
        };
        let knowledge = coordinator
            .build_knowledge("page 2", &session, RagMode::Semantic)
            .await;

        assert!(knowledge.page_located());
        assert!(knowledge.priority_block.as_deref().unwrap().contains("PAGE TWO BODY"));
        assert_eq!(knowledge.mode_used, EffectiveMode::Semantic);
        // the repository only gets what the page left over
        assert!(knowledge.repository_block.is_some());
        assert!(knowledge.text().chars().count() <= 1_000);
    }

    #[tokio::test]
    async fn test_partial_search_failure_keeps_chunks() {
        let healthy = book();
        let broken = book();
        let search = Arc::new(PartialSearch {
            failing: broken.id,
            chunks: vec![RetrievedChunk::new("tides follow the moon", 0.8)],
        });
        let coordinator = coordinator(search);
        let knowledge = coordinator
            .build_knowledge("tides", &session(vec![healthy, broken]), RagMode::Semantic)
            .await;

        assert_eq!(knowledge.mode_used, EffectiveMode::Semantic);
        assert_eq!(
            knowledge.degraded,
            Some(RetrievalDegraded::SearchFailed { failed_documents: 1 })
        );
        let block = knowledge.retrieval_block.unwrap();
        assert!(block.contains("tides follow the moon"));
        assert!(!block.contains("GENERAL CONTEXT"));
    }

    #[tokio::test]
    async fn test_semantic_with_missing_page_still_falls_back() {
        let coordinator = coordinator(FixedSearch::returning(&[]));
        let knowledge = coordinator
            .build_knowledge("page 40", &session(vec![book()]), RagMode::Semantic)
            .await;

        assert_eq!(knowledge.requested_page, Some(40));
        assert!(!knowledge.page_located());
        assert_eq!(knowledge.mode_used, EffectiveMode::InjectionFallback);
        assert!(knowledge.text().contains("GENERAL CONTEXT (fallback)"));
    }

    #[tokio::test]
    async fn test_chunks_across_documents_ordered_by_score() {
        let first = book();
        let second = book();
        let search = Arc::new(ScoredSearch {
            by_document: vec![
                (first.id, RetrievedChunk::new("weak match", 0.2)),
                (second.id, RetrievedChunk::new("strong match", 0.95)),
            ],
        });
        let coordinator = coordinator(search);
        let knowledge = coordinator
            .build_knowledge("match", &session(vec![first, second]), RagMode::Semantic)
            .await;

        let block = knowledge.retrieval_block.unwrap();
        assert!(block.find("strong match").unwrap() < block.find("weak match").unwrap());
    }
}
