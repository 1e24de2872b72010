use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::AgentError;
use crate::db::introspector::SchemaDescriptor;
use crate::llm::models::{ChatPlan, DataPlan, QueryPlan, VisualizationKind, VisualizationSpec};
use crate::llm::prompt::{PromptBuilder, PromptRequest};
use crate::llm::ModelClient;

/// Turns a question into a plan with one model call. Never retries.
pub struct QueryPlanner {
    client: Arc<dyn ModelClient>,
    prompts: Arc<PromptBuilder>,
    timeout: Duration,
}

impl QueryPlanner {
    pub fn new(
        client: Arc<dyn ModelClient>,
        prompts: Arc<PromptBuilder>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            prompts,
            timeout,
        }
    }

    pub async fn plan(
        &self,
        question: &str,
        schema: &SchemaDescriptor,
    ) -> Result<QueryPlan, AgentError> {
        let prompt = self
            .prompts
            .build(PromptRequest::Planning { question, schema })
            .map_err(|e| AgentError::Model(e.to_string()))?;

        info!("Requesting query plan from model");
        let raw = match tokio::time::timeout(self.timeout, self.client.generate(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(AgentError::Model(e.to_string())),
            Err(_) => {
                return Err(AgentError::Model(format!(
                    "model call timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
        };
        debug!("Raw planning response: {}", raw);

        parse_plan(&raw)
    }
}

/// Strict parse first, then the first balanced `{...}` span.
pub fn parse_plan(raw: &str) -> Result<QueryPlan, AgentError> {
    let object = match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(object)) => object,
        _ => {
            let recovered = first_json_object(raw)
                .and_then(|span| serde_json::from_str::<Value>(span).ok())
                .and_then(|value| match value {
                    Value::Object(object) => Some(object),
                    _ => None,
                });
            match recovered {
                Some(object) => {
                    warn!("Model wrapped its JSON in extra text; recovered the embedded object");
                    object
                }
                None => return Err(AgentError::ModelParse("unparseable model output".to_string())),
            }
        }
    };

    classify(object)
}

/// Finds the first `{` and returns the span up to its matching `}`,
/// skipping braces inside JSON string literals.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn classify(object: Map<String, Value>) -> Result<QueryPlan, AgentError> {
    let is_chat = field(&object, &["isChat", "is_chat"])
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let additional_questions =
        string_list(field(&object, &["additional_questions", "additionalQuestions"]));

    if is_chat {
        let nlp_text = field(&object, &["nlp_text", "nlpText"])
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        info!("Model classified the question as chat");
        return Ok(QueryPlan::Chat(ChatPlan {
            nlp_text,
            additional_questions,
        }));
    }

    let sql = object
        .get("sql")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|sql| !sql.is_empty())
        .ok_or_else(|| AgentError::ModelPlan("no SQL produced".to_string()))?
        .to_string();

    let visualization = visualization(object.get("visualization"));
    if !visualization.kind.is_recognized() {
        warn!("Model suggested unknown visualization type '{}'", visualization.kind);
    }

    Ok(QueryPlan::Data(DataPlan {
        sql,
        visualization,
        insights: string_list(object.get("insights")),
        additional_questions,
    }))
}

fn field<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| object.get(*name))
}

/// Non-array values become an empty list; non-string items are dropped.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn visualization(value: Option<&Value>) -> VisualizationSpec {
    let Some(Value::Object(spec)) = value else {
        return VisualizationSpec::default();
    };
    let column = |key: &str| spec.get(key).and_then(Value::as_str).map(str::to_string);

    VisualizationSpec {
        kind: spec
            .get("type")
            .and_then(Value::as_str)
            .map(|kind| VisualizationKind::from(kind.to_string()))
            .unwrap_or_default(),
        x: column("x"),
        y: column("y"),
    }
}
