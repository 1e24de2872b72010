use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::{LlmError, ModelClient};

pub enum Reply {
    Text(String),
    Fail(String),
    Hang,
}

/// Replays canned model replies in order and keeps every prompt it saw.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Reply::Text(text.into()));
        self
    }

    pub fn then_fail(self, msg: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Reply::Fail(msg.into()));
        self
    }

    pub fn then_hang(self) -> Self {
        self.replies.lock().unwrap().push_back(Reply::Hang);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(msg)) => Err(LlmError::ConnectionError(msg)),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(LlmError::ConnectionError("unreachable".to_string()))
            }
            None => Err(LlmError::ResponseError("script exhausted".to_string())),
        }
    }
}
