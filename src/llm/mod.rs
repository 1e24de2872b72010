pub mod models;
pub mod prompt;
pub mod providers;

#[cfg(test)]
pub mod scripted;

use crate::config::LlmConfig;
use async_trait::async_trait;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum LlmError {
    ConnectionError(String),
    ResponseError(String),
    ConfigError(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ConnectionError(msg) => write!(f, "LLM connection error: {}", msg),
            LlmError::ResponseError(msg) => write!(f, "LLM response error: {}", msg),
            LlmError::ConfigError(msg) => write!(f, "LLM configuration error: {}", msg),
        }
    }
}

impl Error for LlmError {}

/// A text-in, text-out generative model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

pub struct LlmManager {
    client: Box<dyn ModelClient>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client: Box<dyn ModelClient> = match config.backend.as_str() {
            "gemini" => Box::new(providers::gemini::GeminiProvider::new(config)?),
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self { client })
    }
}

#[async_trait]
impl ModelClient for LlmManager {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.client.generate(prompt).await
    }
}
