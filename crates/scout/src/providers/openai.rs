use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;

use super::base::{ContentObserver, Provider, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, check_response, collect_openai_stream, get_openai_usage,
    openai_payload, openai_response_to_message,
};
use crate::models::message::Message;
use crate::models::tool::Tool;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    async fn post(&self, payload: &Value) -> Result<Response> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        tracing::debug!(model = %self.config.model, "sending chat completion request");
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(payload)
            .send()
            .await?;

        check_response(response).await
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn stream_completion(
        &self,
        messages: &[Message],
        tools: &[Tool],
        on_content: Option<&ContentObserver>,
    ) -> Result<(Message, Usage)> {
        let mut payload = openai_payload(
            &self.config.model,
            messages,
            tools,
            self.config.temperature,
            self.config.max_tokens,
            true,
        )?;
        payload["stream_options"] = serde_json::json!({"include_usage": true});

        let response = self.post(&payload).await?;
        collect_openai_stream(response, on_content).await
    }

    async fn complete(&self, messages: &[Message]) -> Result<(Message, Usage)> {
        let payload = openai_payload(
            &self.config.model,
            messages,
            &[],
            self.config.temperature,
            self.config.max_tokens,
            false,
        )?;

        let response: Value = self.post(&payload).await?.json().await?;

        // Raise specific error if context length is exceeded
        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("OpenAI API error: {}", error));
        }

        let message = openai_response_to_message(&response)?;
        let usage = get_openai_usage(&response).unwrap_or_default();
        Ok((message, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(OpenAiProviderConfig {
            host: server.uri(),
            api_key: "test_api_key".to_string(),
            model: "gpt-4o".to_string(),
            temperature: Some(0.7),
            max_tokens: None,
        })
        .unwrap()
    }

    fn sse_body(chunks: &[Value]) -> String {
        let mut body = String::new();
        for chunk in chunks {
            body.push_str(&format!("data: {}\n\n", chunk));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[tokio::test]
    async fn test_complete_basic() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test_api_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-123",
                "object": "chat.completion",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": "Hello! How can I assist you today?",
                        "tool_calls": null
                    },
                    "finish_reason": "stop"
                }],
                "usage": {
                    "prompt_tokens": 12,
                    "completion_tokens": 15,
                    "total_tokens": 27
                }
            })))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server);
        let messages = vec![Message::user().with_text("Hello?")];
        let (message, usage) = provider.complete(&messages).await?;

        assert_eq!(message.text(), "Hello! How can I assist you today?");
        assert_eq!(usage.input_tokens, Some(12));
        assert_eq!(usage.output_tokens, Some(15));
        assert_eq!(usage.total_tokens, Some(27));
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_completion_with_fragmented_tool_call() -> Result<()> {
        let body = sse_body(&[
            json!({"choices": [{"delta": {"role": "assistant", "content": "Let me "}}]}),
            json!({"choices": [{"delta": {"content": "check."}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_123", "type": "function",
                 "function": {"name": "structured-search", "arguments": ""}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "{\"collection\": \"logs\", "}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "\"query\": {\"match_all\": {}}}"}}
            ]}}]}),
            json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
            json!({"choices": [], "usage": {"prompt_tokens": 20, "completion_tokens": 15, "total_tokens": 35}}),
        ]);

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server);
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = seen.clone();
        let observer: Box<ContentObserver> =
            Box::new(move |chunk: &str| sink.lock().unwrap().push_str(chunk));

        let tool = Tool::new("structured-search", "Search", json!({"type": "object"}));
        let messages = vec![Message::user().with_text("What failed?")];
        let (message, usage) = provider
            .stream_completion(&messages, &[tool], Some(observer.as_ref()))
            .await?;

        assert_eq!(message.text(), "Let me check.");
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].id, "call_123");
        assert_eq!(message.tool_calls[0].name, "structured-search");
        assert_eq!(
            message.tool_calls[0].parse_arguments().unwrap()["collection"],
            json!("logs")
        );
        assert_eq!(usage.total_tokens, Some(35));
        assert_eq!(
            *seen.lock().unwrap(),
            format!("{}Let me check.\n", crate::providers::stream::STREAM_START_MARKER)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_any_success_status_is_accepted() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(203).set_body_json(json!({
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Via the gateway"},
                    "finish_reason": "stop"
                }]
            })))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server);
        let messages = vec![Message::user().with_text("Hello?")];
        let (message, _) = provider.complete(&messages).await?;

        assert_eq!(message.text(), "Via the gateway");
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server);
        let messages = vec![Message::user().with_text("Hello?")];
        let err = provider
            .stream_completion(&messages, &[], None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Server error"));
    }

    #[tokio::test]
    async fn test_context_length_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": "context_length_exceeded", "message": "too many tokens"}
            })))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server);
        let messages = vec![Message::user().with_text("Hello?")];
        let err = provider.complete(&messages).await.unwrap_err();
        assert!(err.to_string().contains("Context length exceeded"));
    }
}
