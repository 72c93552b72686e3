use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{AgentError, AgentResult};

/// A tool that can be used by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// A JSON schema describing the parameters the tool accepts
    pub parameters: Value,
}

impl Tool {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool invocation requested by the model, exactly as it came off the wire
///
/// The arguments stay an opaque string until dispatch so that a malformed payload
/// only affects this one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new<I, N, A>(id: I, name: N, arguments: A) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the raw argument payload into a JSON object
    ///
    /// An empty payload is treated as an empty object, some backends send nothing at all
    /// for tools without parameters.
    pub fn parse_arguments(&self) -> AgentResult<Map<String, Value>> {
        if self.arguments.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&self.arguments) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(AgentError::InvalidParameters(format!(
                "Arguments for tool call {} must be an object, got: {}",
                self.id, other
            ))),
            Err(e) => Err(AgentError::InvalidParameters(format!(
                "Could not interpret tool use parameters for id {}: {}",
                self.id, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_arguments_object() {
        let request = ToolCallRequest::new("1", "reply", r#"{"message": "hi"}"#);
        let args = request.parse_arguments().unwrap();
        assert_eq!(args.get("message"), Some(&json!("hi")));
    }

    #[test]
    fn test_parse_arguments_empty_is_empty_object() {
        let request = ToolCallRequest::new("1", "list-collections", "");
        assert!(request.parse_arguments().unwrap().is_empty());
    }

    #[test]
    fn test_parse_arguments_rejects_malformed_json() {
        let request = ToolCallRequest::new("7", "reply", r#"{"message": "#);
        let err = request.parse_arguments().unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));
        assert!(err.to_string().contains("id 7"));
    }

    #[test]
    fn test_parse_arguments_rejects_non_object() {
        let request = ToolCallRequest::new("1", "reply", "[1, 2]");
        assert!(request.parse_arguments().is_err());
    }
}
