use serde::{Deserialize, Serialize};
use std::fmt;

/// Chart kind suggested by the model.
///
/// Anything outside the four known kinds is kept verbatim in `Other` so the
/// rendering side can decide how to fall back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VisualizationKind {
    Bar,
    Line,
    Pie,
    #[default]
    Table,
    Other(String),
}

impl VisualizationKind {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, VisualizationKind::Other(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            VisualizationKind::Bar => "bar",
            VisualizationKind::Line => "line",
            VisualizationKind::Pie => "pie",
            VisualizationKind::Table => "table",
            VisualizationKind::Other(raw) => raw,
        }
    }
}

impl From<String> for VisualizationKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "bar" => VisualizationKind::Bar,
            "line" => VisualizationKind::Line,
            "pie" => VisualizationKind::Pie,
            "table" => VisualizationKind::Table,
            _ => VisualizationKind::Other(raw),
        }
    }
}

impl From<VisualizationKind> for String {
    fn from(kind: VisualizationKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for VisualizationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VisualizationSpec {
    #[serde(rename = "type")]
    pub kind: VisualizationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPlan {
    pub nlp_text: String,
    pub additional_questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPlan {
    pub sql: String,
    pub visualization: VisualizationSpec,
    pub insights: Vec<String>,
    pub additional_questions: Vec<String>,
}

/// How the model decided to answer a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    Chat(ChatPlan),
    Data(DataPlan),
}
