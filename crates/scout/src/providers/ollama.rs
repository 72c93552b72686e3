use super::base::{ContentObserver, Provider, Usage};
use super::configs::OllamaProviderConfig;
use super::utils::{
    check_response, collect_openai_stream, get_openai_usage, openai_payload,
    openai_response_to_message,
};
use crate::models::message::Message;
use crate::models::tool::Tool;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;

pub const OLLAMA_HOST: &str = "http://localhost:11434";
pub const OLLAMA_MODEL: &str = "qwen2.5";

/// Talks to Ollama through its OpenAI compatible endpoint
pub struct OllamaProvider {
    client: Client,
    config: OllamaProviderConfig,
}

impl OllamaProvider {
    pub fn new(config: OllamaProviderConfig) -> Result<Self> {
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

        let response = self.client.post(&url).json(payload).send().await?;
        check_response(response).await
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn stream_completion(
        &self,
        messages: &[Message],
        tools: &[Tool],
        on_content: Option<&ContentObserver>,
    ) -> Result<(Message, Usage)> {
        let payload = openai_payload(
            &self.config.model,
            messages,
            tools,
            self.config.temperature,
            self.config.max_tokens,
            true,
        )?;

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
        let message = openai_response_to_message(&response)?;
        let usage = get_openai_usage(&response).unwrap_or_default();
        Ok((message, usage))
    }
}
