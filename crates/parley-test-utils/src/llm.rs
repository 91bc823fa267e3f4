use crate::embedding::HashEmbedder;
use async_trait::async_trait;
use autoagents_llm::LLMProvider;
use autoagents_llm::ToolCall;
use autoagents_llm::chat::{
    ChatMessage, ChatProvider, ChatResponse, StructuredOutputFormat, Tool,
};
use autoagents_llm::completion::{CompletionProvider, CompletionRequest, CompletionResponse};
use autoagents_llm::embedding::EmbeddingProvider;
use autoagents_llm::error::LLMError;
use autoagents_llm::models::ModelsProvider;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct TextResponse {
    text: Option<String>,
}

impl std::fmt::Display for TextResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text.as_deref().unwrap_or_default())
    }
}

impl ChatResponse for TextResponse {
    fn text(&self) -> Option<String> {
        self.text.clone()
    }

    fn tool_calls(&self) -> Option<Vec<ToolCall>> {
        None
    }
}

/// Chat replies come from a script (the last entry repeats); embeddings come
/// from a [`HashEmbedder`]. Every chat prompt is recorded.
#[derive(Debug, Clone)]
pub struct ScriptedLLM {
    replies: Vec<Option<String>>,
    embedder: HashEmbedder,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLLM {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(|reply| Some(reply.into())).collect(),
            embedder: HashEmbedder::new(8),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A model whose chat responses carry no text.
    pub fn silent() -> Self {
        Self {
            replies: vec![None],
            embedder: HashEmbedder::new(8),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.embedder = HashEmbedder::new(dimensions);
        self
    }

    fn reply_for(&self, prompt: String) -> Option<String> {
        let mut prompts = self.prompts.lock();
        let turn = prompts.len();
        prompts.push(prompt);
        self.replies
            .get(turn)
            .or_else(|| self.replies.last())
            .cloned()
            .flatten()
    }
}

#[async_trait]
impl ChatProvider for ScriptedLLM {
    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        _tools: Option<&[Tool]>,
        _json_schema: Option<StructuredOutputFormat>,
    ) -> Result<Box<dyn ChatResponse>, LLMError> {
        let prompt = messages
            .iter()
            .map(|message| message.content.clone())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Box::new(TextResponse {
            text: self.reply_for(prompt),
        }))
    }
}

#[async_trait]
impl CompletionProvider for ScriptedLLM {
    async fn complete(
        &self,
        _req: &CompletionRequest,
        _json_schema: Option<StructuredOutputFormat>,
    ) -> Result<CompletionResponse, LLMError> {
        Ok(CompletionResponse {
            text: self.reply_for(String::new()).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedLLM {
    async fn embed(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>, LLMError> {
        Ok(input.iter().map(|text| self.embedder.vector(text)).collect())
    }
}

#[async_trait]
impl ModelsProvider for ScriptedLLM {}

impl LLMProvider for ScriptedLLM {}

#[derive(Debug, Clone)]
pub struct FailingLLM {
    message: String,
}

impl FailingLLM {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl ChatProvider for FailingLLM {
    async fn chat_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: Option<&[Tool]>,
        _json_schema: Option<StructuredOutputFormat>,
    ) -> Result<Box<dyn ChatResponse>, LLMError> {
        Err(LLMError::ProviderError(self.message.clone()))
    }
}

#[async_trait]
impl CompletionProvider for FailingLLM {
    async fn complete(
        &self,
        _req: &CompletionRequest,
        _json_schema: Option<StructuredOutputFormat>,
    ) -> Result<CompletionResponse, LLMError> {
        Err(LLMError::ProviderError(self.message.clone()))
    }
}

#[async_trait]
impl EmbeddingProvider for FailingLLM {
    async fn embed(&self, _input: Vec<String>) -> Result<Vec<Vec<f32>>, LLMError> {
        Err(LLMError::ProviderError(self.message.clone()))
    }
}

#[async_trait]
impl ModelsProvider for FailingLLM {}

impl LLMProvider for FailingLLM {}
