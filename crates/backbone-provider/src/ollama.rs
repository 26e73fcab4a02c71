use async_trait::async_trait;
use backbone_core::types::Role;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::{ChatRequest, LlmProvider, ProviderError, ProxyResponse};

/// Ollama `/api/generate` adapter using raw instruct-style prompts
/// (spec.md §4.1, §6). Note: unlike a native chat-completions adapter, this
/// talks to `/api/generate` with `raw=true, stream=false` and a linearized
/// prompt — spec.md is explicit about this shape.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

/// Linearize a canonical message list into a Llama-2 instruct-style prompt
/// (spec.md §4.1, GLOSSARY "Instruct-style prompt"):
///   - system text becomes `[INST] <<SYS>>...<</SYS>> [/INST]`
///   - each user message becomes its own `[INST] ... [/INST]` block
///   - an assistant message immediately following a user message is appended
///     inline (space-separated) into that same block, so a trailing
///     unpaired `[INST]...[/INST]` signals it is the model's turn to reply.
pub fn linearize_prompt(messages: &[crate::provider::ChatMessage]) -> String {
    let mut parts: Vec<String> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                parts.push(format!("[INST] <<SYS>>{}<</SYS>> [/INST]", msg.content));
            }
            Role::User => {
                parts.push(format!("[INST] {} [/INST]", msg.content));
            }
            Role::Assistant => {
                if let Some(last) = parts.last_mut() {
                    last.push(' ');
                    last.push_str(&msg.content);
                } else {
                    parts.push(msg.content.clone());
                }
            }
            Role::Tool => {
                // Ollama has no tool-call wire format; fold tool output in as
                // plain text so the model still sees it.
                parts.push(msg.content.clone());
            }
        }
    }

    parts.join(" ")
}

fn build_request_body(request: &ChatRequest) -> Value {
    let prompt = linearize_prompt(&request.messages);

    let mut body = json!({
        "model": request.model,
        "prompt": prompt,
        "raw": true,
        "stream": false,
    });

    if let Some(obj) = request.options.as_object() {
        if let Some(map) = body.as_object_mut() {
            for (k, v) in obj {
                map.insert(k.clone(), v.clone());
            }
        }
    }

    body
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    done: bool,
}

fn parse_response(body: OllamaResponse) -> ProxyResponse {
    ProxyResponse {
        text: body.response.trim().to_string(),
        prompt_tokens: body.prompt_eval_count.unwrap_or(0),
        completion_tokens: body.eval_count.unwrap_or(0),
        tool_calls: None,
        stop_reason: if body.done { "stop".to_string() } else { "length".to_string() },
        timestamp: chrono::Utc::now(),
    }
}

/// One entry from Ollama's native `/api/tags` model enumeration.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModelInfo {
    pub name: String,
    #[serde(default)]
    pub modified_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModelInfo>,
}

impl OllamaProvider {
    /// Lists models known to this backend (spec.md §6 "GET /v1/models ...
    /// translated from the backend's native model enumeration").
    pub async fn list_models(&self) -> Result<Vec<OllamaModelInfo>, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ProviderError::Connect(e.to_string())
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::ProviderHttp { status: status.as_u16(), body });
        }

        let parsed: OllamaTagsResponse =
            resp.json().await.map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(parsed.models)
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn send(&self, request: &ChatRequest) -> Result<ProxyResponse, ProviderError> {
        let body = build_request_body(request);
        debug!(provider = "ollama", body = %body, "outbound request");

        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ProviderError::Connect(e.to_string())
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::ProviderHttp {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let parsed: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(parse_response(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;

    #[test]
    fn unpaired_trailing_inst_signals_models_turn() {
        let messages = vec![ChatMessage::system("be terse"), ChatMessage::user("hi")];
        let prompt = linearize_prompt(&messages);
        assert_eq!(
            prompt,
            "[INST] <<SYS>>be terse<</SYS>> [/INST] [INST] hi [/INST]"
        );
        assert!(prompt.trim_end().ends_with("[/INST]"));
    }

    #[test]
    fn assistant_reply_is_folded_inline_after_user_turn() {
        let messages = vec![
            ChatMessage::user("hi"),
            ChatMessage {
                role: Role::Assistant,
                content: "hello there".to_string(),
                tool_calls: None,
                tool_call_id: None,
            },
            ChatMessage::user("how are you"),
        ];
        let prompt = linearize_prompt(&messages);
        assert_eq!(
            prompt,
            "[INST] hi [/INST] hello there [INST] how are you [/INST]"
        );
    }
}
