pub mod composer;
pub mod pipeline;
pub mod planner;
pub mod summarizer;

use std::error::Error;
use std::fmt;

/// Failures that abort a request. Summary and history failures never
/// surface here.
#[derive(Debug)]
pub enum AgentError {
    /// Tables or columns could not be read
    Schema(String),
    /// The model could not be reached or timed out
    Model(String),
    /// The model replied but no JSON object could be recovered
    ModelParse(String),
    /// The reply parsed but a data plan carried no SQL
    ModelPlan(String),
    /// The generated SQL failed against the database
    SqlExecution(String),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Schema(msg) => write!(f, "Failed to read database schema: {}", msg),
            AgentError::Model(msg) => write!(f, "Model request failed: {}", msg),
            AgentError::ModelParse(msg) => {
                write!(f, "Could not understand the model response: {}", msg)
            }
            AgentError::ModelPlan(msg) => {
                write!(f, "Failed to generate SQL from question: {}", msg)
            }
            AgentError::SqlExecution(msg) => write!(f, "SQL execution error: {}", msg),
        }
    }
}

impl Error for AgentError {}
