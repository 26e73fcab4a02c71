use async_trait::async_trait;
use backbone_core::types::{Role, ToolCall};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::provider::{ChatMessage, ChatRequest, LlmProvider, ProviderError, ProxyResponse};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Anthropic `/v1/messages` adapter (spec.md §4.1, §6).
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }
}

/// Translate a canonical message list into Anthropic's `system` + `messages`
/// shape. Implements spec.md §4.1 transformations (i)-(iii):
///  (i)   system-role messages are pulled out into a top-level `system` field
///  (ii)  tool_calls on an assistant message become `tool_use` content blocks
///  (iii) following `role=tool` messages matching those tool_use ids are
///        consolidated into a single following `role=user` message of
///        `tool_result` blocks; orphans are logged and dropped; a tool_use
///        left without any matching tool_result is an error (property 5).
fn translate_messages(messages: &[ChatMessage]) -> Result<(Option<String>, Vec<Value>), ProviderError> {
    let mut system_parts = Vec::new();
    let mut out = Vec::new();

    let mut i = 0;
    while i < messages.len() {
        let msg = &messages[i];
        match msg.role {
            Role::System => {
                system_parts.push(msg.content.clone());
                i += 1;
            }
            Role::Assistant => {
                let mut content_blocks = Vec::new();
                if !msg.content.is_empty() {
                    content_blocks.push(json!({"type": "text", "text": msg.content}));
                }

                let mut pending_ids: Vec<String> = Vec::new();
                if let Some(tool_calls) = &msg.tool_calls {
                    for tc in tool_calls {
                        content_blocks.push(json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.name,
                            "input": tc.arguments,
                        }));
                        pending_ids.push(tc.id.clone());
                    }
                }

                out.push(json!({"role": "assistant", "content": content_blocks}));
                i += 1;

                if !pending_ids.is_empty() {
                    let mut tool_results = Vec::new();

                    // Consume contiguous tool messages, matching against pending_ids.
                    // Orphans (no matching tool_use) are dropped with a warning.
                    while i < messages.len() && messages[i].role == Role::Tool {
                        let tool_msg = &messages[i];
                        let call_id = tool_msg.tool_call_id.clone().unwrap_or_default();

                        if let Some(pos) = pending_ids.iter().position(|id| id == &call_id) {
                            tool_results.push(json!({
                                "type": "tool_result",
                                "tool_use_id": call_id,
                                "content": tool_msg.content,
                            }));
                            pending_ids.remove(pos);
                        } else {
                            warn!(tool_call_id = %call_id, "orphaned tool result message, dropping");
                        }
                        i += 1;
                    }

                    if !pending_ids.is_empty() {
                        return Err(ProviderError::Decode(format!(
                            "missing tool_result for tool_use id(s): {}",
                            pending_ids.join(", ")
                        )));
                    }

                    out.push(json!({"role": "user", "content": tool_results}));
                }
            }
            Role::User => {
                out.push(json!({"role": "user", "content": msg.content}));
                i += 1;
            }
            Role::Tool => {
                warn!(tool_call_id = ?msg.tool_call_id, "orphaned tool result message, dropping");
                i += 1;
            }
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n"))
    };

    Ok((system, out))
}

fn build_request_body(request: &ChatRequest) -> Result<Value, ProviderError> {
    let (system, messages) = translate_messages(&request.messages)?;

    let max_tokens = request.max_tokens().unwrap_or(DEFAULT_MAX_TOKENS);

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "max_tokens": max_tokens,
    });

    if let Some(obj) = request.options.as_object() {
        if let Some(map) = body.as_object_mut() {
            for (k, v) in obj {
                if k != "max_tokens" {
                    map.insert(k.clone(), v.clone());
                }
            }
        }
    }

    if let Some(system) = system {
        body["system"] = json!(system);
    }

    if let Some(tools) = &request.tools {
        let anthropic_tools: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "custom",
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();
        body["tools"] = json!(anthropic_tools);
    }

    Ok(body)
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    #[serde(other)]
    Unknown,
}

fn parse_response(body: AnthropicResponse) -> ProxyResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in body.content {
        match block {
            ContentBlock::Text { text: t } => {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&t);
            }
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall { id, name, arguments: input });
            }
            ContentBlock::Unknown => {}
        }
    }

    let stop_reason = match body.stop_reason.as_deref() {
        Some("tool_use") => "tool_use".to_string(),
        Some(other) => other.to_string(),
        None => "stop".to_string(),
    };

    ProxyResponse {
        text,
        prompt_tokens: body.usage.input_tokens,
        completion_tokens: body.usage.output_tokens,
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        stop_reason,
        timestamp: chrono::Utc::now(),
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn send(&self, request: &ChatRequest) -> Result<ProxyResponse, ProviderError> {
        let body = build_request_body(request)?;
        debug!(provider = "anthropic", body = %body, "outbound request");

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::ProviderHttp {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let parsed: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(parse_response(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backbone_core::types::ToolCall as CoreToolCall;

    #[test]
    fn translates_tool_round_trip() {
        // Scenario S3 from spec.md §8: one assistant message with a single
        // tool_calls entry, followed by one matching tool-role message.
        let messages = vec![
            ChatMessage::user("what's 40+2?"),
            ChatMessage {
                role: Role::Assistant,
                content: String::new(),
                tool_calls: Some(vec![CoreToolCall {
                    id: "t1".to_string(),
                    name: "f".to_string(),
                    arguments: json!({"x": 1}),
                }]),
                tool_call_id: None,
            },
            ChatMessage {
                role: Role::Tool,
                content: "42".to_string(),
                tool_calls: None,
                tool_call_id: Some("t1".to_string()),
            },
        ];

        let (system, out) = translate_messages(&messages).unwrap();
        assert!(system.is_none());
        assert_eq!(out.len(), 3);
        assert_eq!(out[1]["content"][0]["type"], "tool_use");
        assert_eq!(out[1]["content"][0]["id"], "t1");
        assert_eq!(out[2]["role"], "user");
        assert_eq!(out[2]["content"][0]["type"], "tool_result");
        assert_eq!(out[2]["content"][0]["tool_use_id"], "t1");
        assert_eq!(out[2]["content"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn missing_tool_result_is_an_error() {
        let messages = vec![ChatMessage {
            role: Role::Assistant,
            content: String::new(),
            tool_calls: Some(vec![CoreToolCall {
                id: "t1".to_string(),
                name: "f".to_string(),
                arguments: json!({}),
            }]),
            tool_call_id: None,
        }];

        assert!(translate_messages(&messages).is_err());
    }

    #[test]
    fn orphan_tool_result_is_dropped_not_errored() {
        let messages = vec![ChatMessage {
            role: Role::Tool,
            content: "stray".to_string(),
            tool_calls: None,
            tool_call_id: Some("unknown".to_string()),
        }];

        let (_, out) = translate_messages(&messages).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn system_messages_are_extracted() {
        let messages = vec![ChatMessage::system("be nice"), ChatMessage::user("hi")];
        let (system, out) = translate_messages(&messages).unwrap();
        assert_eq!(system, Some("be nice".to_string()));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["role"], "user");
    }
}
