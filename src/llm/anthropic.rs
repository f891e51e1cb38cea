//! Anthropic LLM provider

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::llm::client::{
    CompletionRequest, CompletionResponse, FinishReason, LlmClient, Message, Role, ToolCall,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic client
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicClient {
    /// Create a new Anthropic client with a request timeout
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Override the API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: AnthropicContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseContent>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicResponseContent {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

/// Convert chat messages into Anthropic's format.
///
/// The system message is lifted out, and consecutive tool results are folded
/// into a single user turn since the API expects every `tool_result` for an
/// assistant turn to arrive together. Assistant turns with neither text nor
/// tool calls are dropped; the API rejects empty text content.
fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
    let system = messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.clone());

    let mut converted: Vec<AnthropicMessage> = Vec::new();
    for m in messages.iter().filter(|m| m.role != Role::System) {
        match m.role {
            Role::Tool => {
                let block = AnthropicContentBlock::ToolResult {
                    tool_use_id: m.tool_call_id.clone().unwrap_or_default(),
                    content: m.content.clone(),
                };
                if let Some(AnthropicMessage {
                    role: "user",
                    content: AnthropicContent::Blocks(blocks),
                }) = converted.last_mut()
                {
                    if blocks
                        .iter()
                        .all(|b| matches!(b, AnthropicContentBlock::ToolResult { .. }))
                    {
                        blocks.push(block);
                        continue;
                    }
                }
                converted.push(AnthropicMessage {
                    role: "user",
                    content: AnthropicContent::Blocks(vec![block]),
                });
            }
            Role::Assistant => {
                let has_tool_calls = m.tool_calls.as_ref().is_some_and(|c| !c.is_empty());
                if !has_tool_calls && m.content.trim().is_empty() {
                    continue;
                }
                let content = match &m.tool_calls {
                    Some(tool_calls) if !tool_calls.is_empty() => {
                        let mut blocks = Vec::with_capacity(tool_calls.len() + 1);
                        if !m.content.trim().is_empty() {
                            blocks.push(AnthropicContentBlock::Text {
                                text: m.content.clone(),
                            });
                        }
                        blocks.extend(tool_calls.iter().map(|tc| AnthropicContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            input: tc.arguments.clone(),
                        }));
                        AnthropicContent::Blocks(blocks)
                    }
                    _ => AnthropicContent::Text(m.content.clone()),
                };
                converted.push(AnthropicMessage {
                    role: "assistant",
                    content,
                });
            }
            Role::User | Role::System => converted.push(AnthropicMessage {
                role: "user",
                content: AnthropicContent::Text(m.content.clone()),
            }),
        }
    }

    (system, converted)
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let (system, messages) = convert_messages(&request.messages);

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| AnthropicTool {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        input_schema: t.parameters.clone(),
                    })
                    .collect(),
            )
        };

        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(4096),
            system,
            messages,
            tools,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("Anthropic API error ({}): {}", status, error)));
        }

        let data: AnthropicResponse = response.json().await?;

        let mut content: Option<String> = None;
        let mut tool_calls = vec![];

        for block in data.content {
            match block.r#type.as_str() {
                "text" => {
                    if let Some(text) = block.text {
                        match content.as_mut() {
                            Some(existing) => existing.push_str(&text),
                            None => content = Some(text),
                        }
                    }
                }
                "tool_use" => {
                    if let (Some(id), Some(name), Some(input)) = (block.id, block.name, block.input)
                    {
                        tool_calls.push(ToolCall {
                            id,
                            name,
                            arguments: input,
                        });
                    }
                }
                _ => {}
            }
        }

        let finish_reason = match data.stop_reason.as_deref() {
            Some("tool_use") => FinishReason::ToolCalls,
            Some("max_tokens") => FinishReason::MaxTokens,
            _ => FinishReason::Stop,
        };

        Ok(CompletionResponse {
            content,
            tool_calls,
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "upsert_memory".to_string(),
            arguments: serde_json::json!({"content": "c", "context": "x"}),
        }
    }

    #[test]
    fn test_system_message_is_lifted() {
        let (system, messages) =
            convert_messages(&[Message::system("be nice"), Message::user("hello")]);
        assert_eq!(system.as_deref(), Some("be nice"));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn test_consecutive_tool_results_are_merged() {
        let (_, messages) = convert_messages(&[
            Message::user("remember two things"),
            Message::assistant_with_tool_calls(None, vec![call("a"), call("b")]),
            Message::tool_result("a", "Stored memory a"),
            Message::tool_result("b", "Rejected memory: c in the category: other"),
        ]);

        assert_eq!(messages.len(), 3);
        let json = serde_json::to_value(&messages[2].content).unwrap();
        let blocks = json.as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["type"], "tool_result");
        assert_eq!(blocks[1]["tool_use_id"], "b");
    }

    #[test]
    fn test_empty_assistant_turns_are_dropped() {
        let (_, messages) = convert_messages(&[
            Message::user("hello"),
            Message::assistant(""),
            Message::user("anyone?"),
            Message::assistant_with_tool_calls(Some("  ".into()), vec![call("a")]),
        ]);

        let roles: Vec<&str> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["user", "user", "assistant"]);
        let json = serde_json::to_value(&messages[2].content).unwrap();
        let blocks = json.as_array().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["type"], "tool_use");
    }

    #[test]
    fn test_assistant_tool_calls_become_tool_use_blocks() {
        let (_, messages) = convert_messages(&[Message::assistant_with_tool_calls(
            Some("saving".into()),
            vec![call("a")],
        )]);
        let json = serde_json::to_value(&messages[0].content).unwrap();
        assert_eq!(json[0]["type"], "text");
        assert_eq!(json[1]["type"], "tool_use");
        assert_eq!(json[1]["name"], "upsert_memory");
    }
}
