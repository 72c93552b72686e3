use super::role::Role;
use super::tool::ToolCallRequest;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM
pub struct Message {
    pub role: Role,
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool invocations requested by the assistant, in the order the model emitted them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// For tool messages, the id of the request this is the result of
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool messages, the name of the tool that produced the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    /// Create a system instruction message
    pub fn system<S: Into<String>>(text: S) -> Self {
        Self::new(Role::System).with_text(text)
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::new(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Create a tool result message linked back to the request that produced it
    pub fn tool<I, N, T>(tool_call_id: I, name: N, text: T) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        T: Into<String>,
    {
        let mut message = Self::new(Role::Tool).with_text(text);
        message.tool_call_id = Some(tool_call_id.into());
        message.name = Some(name.into());
        message
    }

    /// Set the text content of the message, appending if some is already present
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        let text = text.into();
        match &mut self.content {
            Some(existing) => existing.push_str(&text),
            None => self.content = Some(text),
        }
        self
    }

    /// Add a tool request to the message
    pub fn with_tool_request(mut self, request: ToolCallRequest) -> Self {
        self.tool_calls.push(request);
        self
    }

    /// The text content, or an empty string
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    pub fn has_text(&self) -> bool {
        !self.text().is_empty()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
