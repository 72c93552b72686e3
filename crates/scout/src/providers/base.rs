use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::Tool;

/// Receives streamed text chunks in the order they arrive
pub type ContentObserver = dyn Fn(&str) + Send + Sync;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// Base trait for AI providers (OpenAI, Anthropic, etc)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stream the next assistant message for the conversation.
    ///
    /// Text deltas are forwarded to `on_content` as they arrive, and the fully assembled
    /// message (text plus any complete tool calls) is returned once the stream ends.
    /// Backends without tool support ignore `tools` and never return tool calls.
    async fn stream_completion(
        &self,
        messages: &[Message],
        tools: &[Tool],
        on_content: Option<&ContentObserver>,
    ) -> Result<(Message, Usage)>;

    /// Generate the next message in a single request, without tools
    async fn complete(&self, messages: &[Message]) -> Result<(Message, Usage)>;
}
