use async_trait::async_trait;
use parking_lot::Mutex;
use parley_protocol::{CompletionService, ServiceError};
use std::sync::Arc;

/// Answers every prompt with a fixed response and keeps the prompts it saw.
#[derive(Debug, Clone)]
pub struct RecordingCompleter {
    response: String,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl RecordingCompleter {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl CompletionService for RecordingCompleter {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        self.prompts.lock().push(prompt.to_string());
        Ok(self.response.clone())
    }
}

#[derive(Debug, Clone)]
pub struct FailingCompleter {
    message: String,
}

impl FailingCompleter {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl CompletionService for FailingCompleter {
    async fn complete(&self, _prompt: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Completion(self.message.clone()))
    }
}
