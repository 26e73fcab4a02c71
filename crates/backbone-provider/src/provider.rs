use async_trait::async_trait;
use backbone_core::types::{Role, ToolCall};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three adapters a request can be routed to (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    Anthropic,
    Openai,
    Ollama,
}

impl ProviderTag {
    /// Resolve a provider from a model name when the caller supplies none
    /// (spec.md §4.1: "model prefix `claude`→anthropic, `gpt`→openai, else
    /// ollama").
    pub fn resolve(model: &str) -> Self {
        if model.starts_with("claude") {
            ProviderTag::Anthropic
        } else if model.starts_with("gpt") {
            ProviderTag::Openai
        } else {
            ProviderTag::Ollama
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTag::Anthropic => "anthropic",
            ProviderTag::Openai => "openai",
            ProviderTag::Ollama => "ollama",
        }
    }
}

/// One message in a provider-neutral conversation (spec.md §9 redesign flag:
/// canonical Message variant all adapters convert to/from).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// A tool the model may call, described once in OpenAI function-call shape;
/// each adapter translates it into its own wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// `dispatch(request) -> response` input (spec.md §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub provider: Option<ProviderTag>,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Free-form provider options (temperature, max_tokens, ...), merged
    /// verbatim into the outbound request body by each adapter.
    #[serde(default)]
    pub options: serde_json::Value,
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_choice: Option<serde_json::Value>,
}

impl ChatRequest {
    pub fn provider(&self) -> ProviderTag {
        self.provider.unwrap_or_else(|| ProviderTag::resolve(&self.model))
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.options.get("max_tokens").and_then(|v| v.as_u64()).map(|v| v as u32)
    }
}

/// The dispatcher's uniform success shape (spec.md §4.1 `ProxyResponse`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub tool_calls: Option<Vec<ToolCall>>,
    /// "stop", "tool_use", "length", etc. — provider-normalized.
    pub stop_reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Typed adapter failure (spec.md §4.1).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream HTTP {status}: {body}")]
    ProviderHttp { status: u16, body: String },
    #[error("connection error: {0}")]
    Connect(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<ProviderError> for backbone_core::error::BackboneError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Http(err) => backbone_core::error::BackboneError::Connect(err.to_string()),
            ProviderError::ProviderHttp { status, body } => {
                backbone_core::error::BackboneError::Upstream { status, body }
            }
            ProviderError::Connect(c) => backbone_core::error::BackboneError::Connect(c),
            ProviderError::Decode(d) => backbone_core::error::BackboneError::Decode(d),
        }
    }
}

/// One provider adapter. Implementations translate `ChatRequest` into their
/// own wire shape and `ProxyResponse` back out.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, request: &ChatRequest) -> Result<ProxyResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_resolution_follows_model_prefix() {
        assert_eq!(ProviderTag::resolve("claude-sonnet-4"), ProviderTag::Anthropic);
        assert_eq!(ProviderTag::resolve("gpt-4o"), ProviderTag::Openai);
        assert_eq!(ProviderTag::resolve("llama3"), ProviderTag::Ollama);
    }
}
