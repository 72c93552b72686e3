use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::ops::ControlFlow;
use std::time::Duration;

use super::base::{ContentObserver, Provider, Usage};
use super::configs::AnthropicProviderConfig;
use super::stream::{for_each_line, sse_data, StreamCollector};
use super::utils::check_response;
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::Tool;

pub const ANTHROPIC_HOST: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: i32 = 4096;

/// Anthropic messages API, text only.
///
/// Tools are never sent, so the model answers in plain text and every turn comes back
/// as final content.
pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let input_tokens = data
            .pointer("/usage/input_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);
        let output_tokens = data
            .pointer("/usage/output_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);
        let total_tokens = match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };
        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    /// System messages become the top level `system` field; tool results are replayed as
    /// user text since this provider never issues tool calls of its own.
    fn messages_to_anthropic_spec(messages: &[Message]) -> (String, Vec<Value>) {
        let mut system = Vec::new();
        let mut anthropic_messages = Vec::new();

        for message in messages {
            let (role, content) = match message.role {
                Role::System => {
                    system.push(message.text());
                    continue;
                }
                Role::User => ("user", message.text().to_string()),
                Role::Assistant => ("assistant", message.text().to_string()),
                Role::Tool => (
                    "user",
                    format!(
                        "Result of {}:\n{}",
                        message.name.as_deref().unwrap_or("tool"),
                        message.text()
                    ),
                ),
            };

            if content.is_empty() {
                continue;
            }
            anthropic_messages.push(json!({
                "role": role,
                "content": content
            }));
        }

        (system.join("\n\n"), anthropic_messages)
    }

    fn payload(&self, messages: &[Message], stream: bool) -> Value {
        let (system, anthropic_messages) = Self::messages_to_anthropic_spec(messages);

        let mut payload = json!({
            "model": self.config.model,
            "messages": anthropic_messages,
            "max_tokens": self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
        });
        if !system.is_empty() {
            payload["system"] = json!(system);
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if stream {
            payload["stream"] = json!(true);
        }
        payload
    }

    async fn post(&self, payload: &Value) -> Result<Response> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(payload)
            .send()
            .await?;

        check_response(response).await
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn stream_completion(
        &self,
        messages: &[Message],
        tools: &[Tool],
        on_content: Option<&ContentObserver>,
    ) -> Result<(Message, Usage)> {
        if !tools.is_empty() {
            tracing::debug!(
                tools = tools.len(),
                "anthropic provider does not support tools, answering in plain text"
            );
        }

        let response = self.post(&self.payload(messages, true)).await?;

        let mut collector = StreamCollector::new(on_content);
        let mut usage = Usage::default();
        let outcome = for_each_line(response, |line| {
            let Some(data) = sse_data(line) else {
                return Ok(ControlFlow::Continue(()));
            };
            let event: Value = serde_json::from_str(data)
                .map_err(|e| anyhow!("Malformed stream event: {} ({})", e, data))?;

            match event["type"].as_str().unwrap_or_default() {
                "message_start" => {
                    usage = Self::get_usage(&event["message"]);
                }
                "content_block_delta" => {
                    if let Some(text) = event.pointer("/delta/text").and_then(|t| t.as_str()) {
                        collector.push(text);
                    }
                }
                "message_delta" => {
                    let delta = Self::get_usage(&event);
                    usage.output_tokens = delta.output_tokens.or(usage.output_tokens);
                    if let (Some(input), Some(output)) = (usage.input_tokens, usage.output_tokens) {
                        usage.total_tokens = Some(input + output);
                    }
                }
                "message_stop" => return Ok(ControlFlow::Break(())),
                "error" => return Err(anyhow!("Anthropic API error: {}", event["error"])),
                _ => {}
            }
            Ok(ControlFlow::Continue(()))
        })
        .await;

        let content = collector.finish();
        outcome?;

        let mut message = Message::assistant();
        if !content.is_empty() {
            message = message.with_text(content);
        }
        Ok((message, usage))
    }

    async fn complete(&self, messages: &[Message]) -> Result<(Message, Usage)> {
        let response: Value = self.post(&self.payload(messages, false)).await?.json().await?;

        let blocks = response
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| anyhow!("Invalid response format from Anthropic API"))?;
        let text: String = blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
            .collect();

        let message = Message::assistant().with_text(text);
        Ok((message, Self::get_usage(&response)))
    }
}
