pub mod anthropic;
pub mod config_providers;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use config_providers::{providers_from_config, ConfiguredProviders};
pub use ollama::{OllamaModelInfo, OllamaProvider};
pub use openai::OpenAiProvider;
pub use provider::{ChatMessage, ChatRequest, LlmProvider, ProviderError, ProviderTag, ProxyResponse, ToolDefinition};
pub use router::{ProviderRouter, ProviderSlot};
