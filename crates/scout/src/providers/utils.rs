use anyhow::{anyhow, Result};
use regex::Regex;
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::OnceLock;

use super::base::{ContentObserver, Usage};
use super::stream::{for_each_line, sse_data, StreamCollector, ToolCallAccumulator};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCallRequest};

/// Convert internal Message format to OpenAI's API message specification
///
/// Tool calls that never received a result (for example because their arguments could
/// not be parsed) are left out, the API rejects an assistant turn whose calls are not
/// all answered.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let answered: HashSet<&str> = messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();

    let mut messages_spec = Vec::new();
    for message in messages {
        match message.role {
            Role::System | Role::User => {
                messages_spec.push(json!({
                    "role": message.role,
                    "content": message.text(),
                }));
            }
            Role::Assistant => {
                let mut converted = json!({ "role": "assistant" });
                if message.has_text() {
                    converted["content"] = json!(message.text());
                }

                let tool_calls: Vec<Value> = message
                    .tool_calls
                    .iter()
                    .filter(|call| answered.contains(call.id.as_str()))
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": sanitize_function_name(&call.name),
                                "arguments": call.arguments,
                            }
                        })
                    })
                    .collect();
                if !tool_calls.is_empty() {
                    converted["tool_calls"] = json!(tool_calls);
                }

                if converted.get("content").is_some() || converted.get("tool_calls").is_some() {
                    messages_spec.push(converted);
                }
            }
            Role::Tool => {
                messages_spec.push(json!({
                    "role": "tool",
                    "content": message.text(),
                    "tool_call_id": message.tool_call_id,
                }));
            }
        }
    }

    messages_spec
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(result)
}

/// Build a chat completions payload shared by the OpenAI compatible providers
pub fn openai_payload(
    model: &str,
    messages: &[Message],
    tools: &[Tool],
    temperature: Option<f32>,
    max_tokens: Option<i32>,
    stream: bool,
) -> Result<Value> {
    let mut payload = json!({
        "model": model,
        "messages": messages_to_openai_spec(messages),
    });

    let tools_spec = tools_to_openai_spec(tools)?;
    if !tools_spec.is_empty() {
        payload["tools"] = json!(tools_spec);
    }
    if let Some(temp) = temperature {
        payload["temperature"] = json!(temp);
    }
    if let Some(tokens) = max_tokens {
        payload["max_tokens"] = json!(tokens);
    }
    if stream {
        payload["stream"] = json!(true);
    }

    Ok(payload)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: &Value) -> Result<Message> {
    let original = response
        .pointer("/choices/0/message")
        .ok_or_else(|| anyhow!("No message in completion response"))?;
    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(|c| c.as_str()) {
        message = message.with_text(text);
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default();
            let name = tool_call["function"]["name"].as_str().unwrap_or_default();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();
            message = message.with_tool_request(ToolCallRequest::new(id, name, arguments));
        }
    }

    Ok(message)
}

pub fn get_openai_usage(data: &Value) -> Option<Usage> {
    let usage = data.get("usage").filter(|u| u.is_object())?;

    let input_tokens = usage
        .get("prompt_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32);

    let output_tokens = usage
        .get("completion_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32);

    let total_tokens = usage
        .get("total_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32)
        .or_else(|| match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        });

    Some(Usage::new(input_tokens, output_tokens, total_tokens))
}

/// Apply one decoded chat completions chunk to the in-progress turn
pub fn apply_openai_stream_chunk(
    chunk: &Value,
    collector: &mut StreamCollector<'_>,
    tool_calls: &mut ToolCallAccumulator,
) -> Result<()> {
    if let Some(error) = chunk.get("error") {
        if let Some(err) = check_openai_context_length_error(error) {
            return Err(err.into());
        }
        return Err(anyhow!("Completion API error: {}", error));
    }

    let Some(delta) = chunk.pointer("/choices/0/delta") else {
        return Ok(());
    };

    if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
        collector.push(text);
    }

    if let Some(fragments) = delta.get("tool_calls").and_then(|t| t.as_array()) {
        for (position, fragment) in fragments.iter().enumerate() {
            let index = fragment
                .get("index")
                .and_then(|i| i.as_u64())
                .map(|i| i as usize)
                .unwrap_or(position);
            tool_calls.append(
                index,
                fragment.get("id").and_then(|v| v.as_str()),
                fragment.pointer("/function/name").and_then(|v| v.as_str()),
                fragment.pointer("/function/arguments").and_then(|v| v.as_str()),
            );
        }
    }

    Ok(())
}

/// Consume a chat completions SSE body into a single assistant message
pub async fn collect_openai_stream(
    response: Response,
    on_content: Option<&ContentObserver>,
) -> Result<(Message, Usage)> {
    let mut collector = StreamCollector::new(on_content);
    let mut tool_calls = ToolCallAccumulator::new();
    let mut usage = Usage::default();

    let outcome = for_each_line(response, |line| {
        let Some(data) = sse_data(line) else {
            return Ok(ControlFlow::Continue(()));
        };
        if data == "[DONE]" {
            return Ok(ControlFlow::Break(()));
        }
        let chunk: Value = serde_json::from_str(data)
            .map_err(|e| anyhow!("Malformed stream chunk: {} ({})", e, data))?;
        if let Some(chunk_usage) = get_openai_usage(&chunk) {
            usage = chunk_usage;
        }
        apply_openai_stream_chunk(&chunk, &mut collector, &mut tool_calls)?;
        Ok(ControlFlow::Continue(()))
    })
    .await;

    // Close the visual block even when the stream failed part way through.
    let content = collector.finish();
    outcome?;

    let mut message = Message::assistant();
    if !content.is_empty() {
        message = message.with_text(content);
    }
    for request in tool_calls.finish() {
        message = message.with_tool_request(request);
    }
    Ok((message, usage))
}

/// Turn a non-success HTTP status into an error carrying the response body
pub async fn check_response(response: Response) -> Result<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
            Err(anyhow!("Server error: {}", status))
        }
        status => {
            let body = response.text().await.unwrap_or_default();
            if let Ok(error) = serde_json::from_str::<Value>(&body) {
                if let Some(err) = error
                    .get("error")
                    .and_then(check_openai_context_length_error)
                {
                    return Err(err.into());
                }
            }
            Err(anyhow!("Request failed: {} - {}", status, body))
        }
    }
}

fn sanitize_function_name(name: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let re = INVALID.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("valid regex"));
    re.replace_all(name, "_").to_string()
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
