use async_trait::async_trait;
use backbone_core::types::ToolCall;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::{ChatRequest, LlmProvider, ProviderError, ProxyResponse};

/// OpenAI-compatible `/v1/chat/completions` adapter (spec.md §4.1, §6).
/// `base_url`/`chat_path` are overridable so the same adapter serves any
/// OpenAI-compatible endpoint.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    chat_path: String,
    provider_name: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            chat_path: "/v1/chat/completions".to_string(),
            provider_name: "openai".to_string(),
        }
    }

    pub fn with_path(mut self, name: impl Into<String>, chat_path: impl Into<String>) -> Self {
        self.provider_name = name.into();
        self.chat_path = chat_path.into();
        self
    }
}

/// The one normalization spec.md §4.1 mandates for this adapter: a
/// `tool_calls` field that is a single object (rather than an array) is
/// wrapped into a one-element list. Everything else passes through verbatim.
fn normalize_tool_calls(mut messages: Vec<Value>) -> Vec<Value> {
    for msg in messages.iter_mut() {
        if let Some(obj) = msg.as_object_mut() {
            if let Some(tc) = obj.get("tool_calls") {
                if !tc.is_null() && !tc.is_array() {
                    let wrapped = json!([tc.clone()]);
                    obj.insert("tool_calls".to_string(), wrapped);
                }
            }
        }
    }
    messages
}

fn build_request_body(request: &ChatRequest) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| {
            let mut v = json!({
                "role": m.role.to_string(),
                "content": m.content,
            });
            if let Some(tool_calls) = &m.tool_calls {
                v["tool_calls"] = json!(tool_calls
                    .iter()
                    .map(|tc| json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {"name": tc.name, "arguments": tc.arguments.to_string()},
                    }))
                    .collect::<Vec<_>>());
            }
            if let Some(call_id) = &m.tool_call_id {
                v["tool_call_id"] = json!(call_id);
            }
            v
        })
        .collect();

    let mut body = json!({
        "model": request.model,
        "messages": normalize_tool_calls(messages),
    });

    if let Some(obj) = request.options.as_object() {
        if let Some(map) = body.as_object_mut() {
            for (k, v) in obj {
                map.insert(k.clone(), v.clone());
            }
        }
    }

    if let Some(tools) = &request.tools {
        body["tools"] = json!(tools
            .iter()
            .map(|t| json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                },
            }))
            .collect::<Vec<_>>());
    }

    if let Some(tc) = &request.tool_choice {
        body["tool_choice"] = tc.clone();
    }

    body
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

fn parse_response(body: OpenAiResponse) -> Result<ProxyResponse, ProviderError> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Decode("no choices in response".to_string()))?;

    let tool_calls = choice.message.tool_calls.map(|calls| {
        calls
            .into_iter()
            .map(|c| ToolCall {
                id: c.id,
                name: c.function.name,
                arguments: serde_json::from_str(&c.function.arguments).unwrap_or(Value::Null),
            })
            .collect::<Vec<_>>()
    });

    let stop_reason = match choice.finish_reason.as_deref() {
        Some("tool_calls") => "tool_use".to_string(),
        Some(other) => other.to_string(),
        None => "stop".to_string(),
    };

    let (prompt_tokens, completion_tokens) = body
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or((0, 0));

    Ok(ProxyResponse {
        text: choice.message.content.unwrap_or_default(),
        prompt_tokens,
        completion_tokens,
        tool_calls,
        stop_reason,
        timestamp: chrono::Utc::now(),
    })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn send(&self, request: &ChatRequest) -> Result<ProxyResponse, ProviderError> {
        let body = build_request_body(request);
        debug!(provider = %self.provider_name, body = %body, "outbound request");

        let resp = self
            .client
            .post(format!("{}{}", self.base_url, self.chat_path))
            .bearer_auth(&self.api_key)
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

        let parsed: OpenAiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        parse_response(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_object_tool_calls_is_wrapped_in_a_list() {
        let messages = vec![json!({
            "role": "assistant",
            "content": "",
            "tool_calls": {"id": "t1", "type": "function", "function": {"name": "f", "arguments": "{}"}},
        })];

        let out = normalize_tool_calls(messages);
        assert!(out[0]["tool_calls"].is_array());
        assert_eq!(out[0]["tool_calls"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn list_tool_calls_passes_through_unchanged() {
        let messages = vec![json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [{"id": "t1", "type": "function", "function": {"name": "f", "arguments": "{}"}}],
        })];

        let out = normalize_tool_calls(messages);
        assert_eq!(out[0]["tool_calls"].as_array().unwrap().len(), 1);
    }
}
