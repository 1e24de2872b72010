use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::executor::QueryResult;
use crate::llm::prompt::{PromptBuilder, PromptRequest};
use crate::llm::ModelClient;

pub const SUMMARY_FALLBACK: &str = "Could not generate a summary for the result.";

/// Narrates executed rows. Best-effort: any failure yields the fallback text.
pub struct Summarizer {
    client: Arc<dyn ModelClient>,
    prompts: Arc<PromptBuilder>,
    timeout: Duration,
}

impl Summarizer {
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

    pub async fn summarize(&self, question: &str, sql: &str, rows: &QueryResult) -> String {
        let prompt = match self.prompts.build(PromptRequest::Summary { question, sql, rows }) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Failed to build summary prompt: {}", e);
                return SUMMARY_FALLBACK.to_string();
            }
        };

        info!("Requesting result summary from model");
        let text = match tokio::time::timeout(self.timeout, self.client.generate(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("Summary generation failed: {}", e);
                return SUMMARY_FALLBACK.to_string();
            }
            Err(_) => {
                warn!("Summary generation timed out after {}s", self.timeout.as_secs());
                return SUMMARY_FALLBACK.to_string();
            }
        };
        debug!("Raw summary response: {}", text);

        let summary = strip_code_fence(&text);
        if summary.is_empty() {
            warn!("Model returned an empty summary");
            return SUMMARY_FALLBACK.to_string();
        }
        summary.to_string()
    }
}

/// Models sometimes fence plain prose anyway.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop a language tag on the opening fence line
    match inner.split_once('\n') {
        Some((tag, rest)) if !tag.trim().contains(' ') => rest.trim(),
        _ => inner.trim(),
    }
}
