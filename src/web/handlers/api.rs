use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::agent::composer::AgentResponse;
use crate::agent::AgentError;
use crate::db::introspector::SchemaDescriptor;
use crate::web::state::AppState;

/// Set by the authentication layer in front of this service.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// `question` is kept loose so a non-string value gets the same 400 as a blank one.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: serde_json::Value,
}

const INVALID_QUESTION: &str = "A valid natural language question is required.";

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub schema: SchemaDescriptor,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub table_count: usize,
    pub llm_backend: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        let status = match &e {
            AgentError::Schema(_) | AgentError::SqlExecution(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AgentError::Model(_) | AgentError::ModelParse(_) => StatusCode::BAD_GATEWAY,
            AgentError::ModelPlan(_) => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "message": "API is healthy" }))
}

// POST /api/query
pub async fn process_query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<AgentResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| {
        info!("Rejected query body: {}", e);
        ApiError::bad_request(INVALID_QUESTION)
    })?;
    let question = payload
        .question
        .as_str()
        .map(str::trim)
        .filter(|question| !question.is_empty())
        .ok_or_else(|| ApiError::bad_request(INVALID_QUESTION))?;

    let actor_id = headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match state.agent.answer(question, actor_id).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            error!("Query failed: {}", e);
            Err(e.into())
        }
    }
}

// GET /api/schema
pub async fn get_schema(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SchemaResponse>, ApiError> {
    let schema = state.agent.schema().await.map_err(|e| {
        error!("Failed to read schema: {}", e);
        ApiError::from(e)
    })?;
    info!("Serving schema with {} tables", schema.len());
    Ok(Json(SchemaResponse { schema }))
}

// GET /api/status
pub async fn system_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SystemStatus>, ApiError> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();
    let table_count = state.agent.schema().await?.len();

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        table_count,
        llm_backend: state.config.llm.backend.clone(),
    }))
}
