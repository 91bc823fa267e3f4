//! Adapter exposing an autoagents LLM provider as memory services.

use async_trait::async_trait;
use autoagents_llm::LLMProvider;
use autoagents_llm::chat::{ChatMessage, ChatProvider, ChatResponse, ChatRole, MessageType};
use autoagents_llm::embedding::EmbeddingProvider;
use parley_protocol::{CompletionService, EmbeddingService, ServiceError};
use std::sync::Arc;

/// Embedding and completion backed by one [`LLMProvider`].
#[derive(Clone)]
pub struct LlmServices {
    llm: Arc<dyn LLMProvider>,
}

impl LlmServices {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl EmbeddingService for LlmServices {
    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, ServiceError> {
        self.llm
            .embed(inputs)
            .await
            .map_err(|err| ServiceError::Embedding(err.to_string()))
    }
}

#[async_trait]
impl CompletionService for LlmServices {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        let messages = vec![ChatMessage {
            role: ChatRole::User,
            message_type: MessageType::Text,
            content: prompt.to_string(),
        }];
        let response = self
            .llm
            .chat_with_tools(&messages, None, None)
            .await
            .map_err(|err| ServiceError::Completion(err.to_string()))?;
        response
            .text()
            .ok_or_else(|| ServiceError::Completion("empty completion response".to_string()))
    }
}
