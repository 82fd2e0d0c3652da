//! Genesis Context Engine - line-oriented driver
//!
//! Loads documents given on the command line, then answers one query per
//! stdin line and prints the answer as JSON.
//!
//! ```text
//! context book.txt [book.mapping.json]
//! ```

use anyhow::Context as _;
use genesis_common::{config::AppConfig, metrics, telemetry, VERSION};
use genesis_context::{KnowledgeEngine, NoSemanticSearch, PageMapping, QueryRequest, SessionDocument, SessionKnowledge};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;

    telemetry::init_tracing(&config.observability);
    metrics::register_metrics();

    info!("Starting Genesis Context Engine v{}", VERSION);

    let session = load_session(std::env::args().skip(1).collect()).await?;
    info!(documents = session.documents.len(), "Session loaded");

    let engine = KnowledgeEngine::from_config(&config, Arc::new(NoSemanticSearch))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if query.is_empty() {
            continue;
        }

        let request = QueryRequest::new(query, session.clone());
        match engine.ask(&request).await {
            Ok(answer) => println!("{}", serde_json::to_string(&answer)?),
            Err(e) => {
                error!(error = %e, code = ?e.code(), "Query failed");
                let body = genesis_common::errors::ErrorResponse::from(&e);
                println!("{}", serde_json::to_string(&body)?);
            }
        }
    }

    info!("Context Engine shutting down");
    Ok(())
}

/// Documents from `text_path [mapping_path]`
async fn load_session(args: Vec<String>) -> anyhow::Result<SessionKnowledge> {
    let mut session = SessionKnowledge::default();
    let Some(text_path) = args.first() else {
        return Ok(session);
    };

    let text = tokio::fs::read_to_string(text_path)
        .await
        .with_context(|| format!("failed to read {}", text_path))?;
    let title = Path::new(text_path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| text_path.clone());
    let mut document = SessionDocument::new(title, text);

    if let Some(mapping_path) = args.get(1) {
        let raw = tokio::fs::read_to_string(mapping_path)
            .await
            .with_context(|| format!("failed to read {}", mapping_path))?;
        document = document.with_mapping(PageMapping::from_json(&raw)?);
    }

    session.documents.push(document);
    Ok(session)
}
