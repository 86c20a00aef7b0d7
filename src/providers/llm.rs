//! LLM chat provider seam.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use super::ProviderError;

/// Role of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a chat request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A chat completion request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Token accounting reported by a provider, all fields optional.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUsage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

/// A chat completion response.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
}

/// Chat-capable LLM backend.
#[async_trait]
pub trait LlmProvider: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Model identifiers this provider can serve.
    fn models(&self) -> Vec<String>;

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Named LLM providers with a default slot.
#[derive(Debug, Default)]
pub struct LlmRegistry {
    providers: FxHashMap<String, Arc<dyn LlmProvider>>,
    default: Option<String>,
}

impl LlmRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider; the first registration becomes the default.
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        let name = provider.name().to_string();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.providers.insert(name, provider);
    }

    pub fn set_default(&mut self, name: &str) -> bool {
        if self.providers.contains_key(name) {
            self.default = Some(name.to_string());
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(name).cloned()
    }

    #[must_use]
    pub fn default_provider(&self) -> Option<Arc<dyn LlmProvider>> {
        self.default.as_deref().and_then(|name| self.get(name))
    }
}

/// Scripted in-memory provider for tests and dry runs.
///
/// Replies are served from a queue; once exhausted (or if none were
/// scripted) the provider echoes the last user message back.
#[derive(Debug)]
pub struct MockLlmProvider {
    model: String,
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::echo()
    }
}

impl MockLlmProvider {
    /// A provider that echoes the last user message.
    #[must_use]
    pub fn echo() -> Self {
        Self {
            model: "mock-echo".to_string(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that serves the given replies in order.
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            model: "mock-scripted".to_string(),
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request this provider has served, for assertions.
    #[must_use]
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("mock poisoned").clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn models(&self) -> Vec<String> {
        vec![self.model.clone()]
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let scripted = self.replies.lock().expect("mock poisoned").pop_front();
        let content = scripted.unwrap_or_else(|| {
            request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == ChatRole::User)
                .map(|m| m.content.clone())
                .unwrap_or_default()
        });
        let prompt_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
        self.requests.lock().expect("mock poisoned").push(request);
        Ok(ChatResponse {
            content,
            model: self.model.clone(),
            usage: Some(ChatUsage {
                prompt_tokens: Some((prompt_chars / 4) as u32),
                completion_tokens: Some(8),
                total_tokens: Some((prompt_chars / 4) as u32 + 8),
            }),
            finish_reason: Some("stop".to_string()),
            tool_calls: None,
        })
    }
}
