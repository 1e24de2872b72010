use serde::Serialize;

use crate::db::executor::QueryResult;
use crate::llm::models::{ChatPlan, DataPlan, VisualizationSpec};

/// Answer to a data question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    pub data: QueryResult,
    pub insights: Vec<String>,
    pub visualization: VisualizationSpec,
    pub additional_questions: Vec<String>,
    pub nlp_text: String,
}

/// Answer to a question unrelated to the data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    #[serde(rename = "isChat")]
    is_chat: bool,
    pub additional_questions: Vec<String>,
    pub nlp_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AgentResponse {
    Chat(ChatResponse),
    Data(ComposedResponse),
}

/// The data-grounded summary replaces any narrative the plan carried.
pub fn compose(plan: DataPlan, rows: QueryResult, summary: String) -> ComposedResponse {
    ComposedResponse {
        sql: Some(plan.sql),
        data: rows,
        insights: plan.insights,
        visualization: plan.visualization,
        additional_questions: plan.additional_questions,
        nlp_text: summary,
    }
}

pub fn compose_chat(plan: ChatPlan) -> ChatResponse {
    ChatResponse {
        is_chat: true,
        additional_questions: plan.additional_questions,
        nlp_text: plan.nlp_text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::VisualizationKind;
    use serde_json::json;

    fn plan() -> DataPlan {
        DataPlan {
            sql: "SELECT SUM(amt) AS total FROM sales_data".to_string(),
            visualization: VisualizationSpec {
                kind: VisualizationKind::Bar,
                x: Some("dt".to_string()),
                y: Some("total".to_string()),
            },
            insights: vec!["'amt' is the sale amount.".to_string()],
            additional_questions: vec!["And in March?".to_string()],
        }
    }

    #[test]
    fn data_response_has_the_documented_shape() {
        let rows = vec![json!({ "total": 15234.5 }).as_object().unwrap().clone()];
        let response = compose(plan(), rows, "Sales were strong.".to_string());

        let value = serde_json::to_value(AgentResponse::Data(response)).unwrap();
        assert_eq!(
            value,
            json!({
                "sql": "SELECT SUM(amt) AS total FROM sales_data",
                "data": [{ "total": 15234.5 }],
                "insights": ["'amt' is the sale amount."],
                "visualization": { "type": "bar", "x": "dt", "y": "total" },
                "additional_questions": ["And in March?"],
                "nlp_text": "Sales were strong."
            })
        );
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            keys,
            vec!["sql", "data", "insights", "visualization", "additional_questions", "nlp_text"]
        );
    }

    #[test]
    fn chat_response_has_only_chat_fields() {
        let response = compose_chat(ChatPlan {
            nlp_text: "Paris is the capital of France.".to_string(),
            additional_questions: vec![],
        });
        assert_eq!(
            serde_json::to_value(AgentResponse::Chat(response)).unwrap(),
            json!({
                "isChat": true,
                "additional_questions": [],
                "nlp_text": "Paris is the capital of France."
            })
        );
    }
}
