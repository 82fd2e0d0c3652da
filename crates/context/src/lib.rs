//! Genesis Context Engine
//!
//! Knowledge context assembly and provider routing:
//! - Page reference detection and page-block location
//! - Injection / semantic retrieval with automatic fallback
//! - Ordered, budgeted prompt assembly
//! - Credential pools with rotation and one-strike deactivation
//! - Provider routing with retries and structured exhaustion

pub mod assembler;
pub mod credentials;
pub mod engine;
pub mod page;
pub mod providers;
pub mod retrieval;
pub mod router;

pub use assembler::{AssembledContext, ContextAssembler, HistoryTurn, Role};
pub use credentials::{CredentialPool, CredentialStore, Position};
pub use engine::{Answer, KnowledgeEngine, QueryRequest};
pub use page::{detect_page_number, PageLocator, PageMapping, PagePatternMatcher};
pub use retrieval::{
    EffectiveMode, Knowledge, NoSemanticSearch, RagMode, RetrievalCoordinator, SemanticSearch,
    SessionDocument, SessionKnowledge,
};
pub use router::{ProviderRouter, RouteOutcome, RoutingDecision};
