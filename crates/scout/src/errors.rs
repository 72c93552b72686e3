use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Failures talking to the search backend
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Search backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected search backend response: {0}")]
    Malformed(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
}

pub type SearchResult<T> = Result<T, SearchError>;
