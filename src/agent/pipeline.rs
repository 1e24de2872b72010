use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

use super::composer::{compose, compose_chat, AgentResponse};
use super::planner::QueryPlanner;
use super::summarizer::Summarizer;
use super::AgentError;
use crate::db::executor::SqlExecutor;
use crate::db::history_store::HistoryRecorder;
use crate::db::introspector::{SchemaDescriptor, SchemaIntrospector};
use crate::llm::models::QueryPlan;

/// Answers one question end to end:
/// schema -> plan -> (chat | execute -> summarize -> compose) -> record.
///
/// Stages run strictly in that order. Schema, planning and execution
/// failures end the request; summary and history failures do not.
pub struct Agent {
    introspector: SchemaIntrospector,
    planner: QueryPlanner,
    executor: SqlExecutor,
    summarizer: Summarizer,
    history: Arc<dyn HistoryRecorder>,
}

impl Agent {
    pub fn new(
        introspector: SchemaIntrospector,
        planner: QueryPlanner,
        executor: SqlExecutor,
        summarizer: Summarizer,
        history: Arc<dyn HistoryRecorder>,
    ) -> Self {
        Self {
            introspector,
            planner,
            executor,
            summarizer,
            history,
        }
    }

    pub async fn schema(&self) -> Result<SchemaDescriptor, AgentError> {
        self.introspector
            .describe()
            .await
            .map_err(|e| AgentError::Schema(e.to_string()))
    }

    /// `actor_id` is the authenticated user, if any; only their requests
    /// are recorded.
    pub async fn answer(
        &self,
        question: &str,
        actor_id: Option<&str>,
    ) -> Result<AgentResponse, AgentError> {
        let span = info_span!("answer", question = %question);
        async move {
            info!("Processing query");
            let schema = self.schema().await?;
            info!("Schema loaded with {} tables", schema.len());
            debug!("Tables: {:?}", schema.table_names().collect::<Vec<_>>());

            let response = match self.planner.plan(question, &schema).await? {
                QueryPlan::Chat(plan) => {
                    info!("Answering conversationally");
                    AgentResponse::Chat(compose_chat(plan))
                }
                QueryPlan::Data(plan) => {
                    let rows = self
                        .executor
                        .execute(&plan.sql)
                        .await
                        .map_err(|e| AgentError::SqlExecution(e.to_string()))?;
                    info!("Query returned {} rows", rows.len());

                    let summary = self.summarizer.summarize(question, &plan.sql, &rows).await;
                    AgentResponse::Data(compose(plan, rows, summary))
                }
            };

            if let Some(actor_id) = actor_id {
                self.record(actor_id, question, &response);
            }
            Ok(response)
        }
        .instrument(span)
        .await
    }

    /// Dispatches the history write without waiting on it.
    fn record(&self, actor_id: &str, question: &str, response: &AgentResponse) {
        let response_json = match serde_json::to_string(response) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize response for history: {}", e);
                return;
            }
        };

        let history = Arc::clone(&self.history);
        let actor_id = actor_id.to_string();
        let question = question.to_string();
        tokio::spawn(
            async move {
                if let Err(e) = history.record(&actor_id, &question, &response_json).await {
                    warn!("{}", e);
                }
            }
            .in_current_span(),
        );
    }
}
