use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

mod agent;
mod config;
mod db;
mod llm;
mod util;
mod web;

use crate::agent::pipeline::Agent;
use crate::agent::planner::QueryPlanner;
use crate::agent::summarizer::Summarizer;
use crate::config::{AppConfig, CliArgs};
use crate::db::db_pool::build_pool;
use crate::db::executor::SqlExecutor;
use crate::db::history_store::{DiscardHistory, DuckDbHistoryStore, HistoryRecorder};
use crate::db::introspector::SchemaIntrospector;
use crate::llm::prompt::PromptBuilder;
use crate::llm::{LlmManager, ModelClient};
use crate::util::logging::{init_json_tracing, init_tracing};
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = CliArgs::parse();

    // Initialize logging
    if args.json_logs {
        init_json_tracing();
    } else {
        init_tracing();
    }

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("Opening DuckDB database at {}", config.database.path);
    let pool = build_pool(&config.database)?;

    info!("Initializing LLM client with backend: {}", config.llm.backend);
    let model: Arc<dyn ModelClient> = Arc::new(LlmManager::new(&config.llm)?);

    let history: Arc<dyn HistoryRecorder> = if config.history.enabled {
        let store = DuckDbHistoryStore::new(pool.clone(), config.history.table.clone());
        store.ensure_table().await?;
        info!("Recording chat history in table {}", config.history.table);
        Arc::new(store)
    } else {
        Arc::new(DiscardHistory)
    };

    let prompts = Arc::new(PromptBuilder::new(config.llm.summary_row_limit));
    let introspector = SchemaIntrospector::new(
        pool.clone(),
        config.database.schema.clone(),
        config.database.introspection_concurrency,
    )
    .hide_table(config.history.table.clone());
    let executor = SqlExecutor::new(pool, config.database.query_timeout())
        .with_read_only_guard(config.database.read_only_guard);

    let agent = Agent::new(
        introspector,
        QueryPlanner::new(Arc::clone(&model), Arc::clone(&prompts), config.llm.timeout()),
        executor,
        Summarizer::new(model, prompts, config.llm.timeout()),
        history,
    );

    let app_state = Arc::new(AppState::new(config.clone(), agent));

    // Start the web server
    info!("Starting NL-Insight server on {}:{}", config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
