//! The document search service the agent queries.
//!
//! Collections are the searchable units of the backend (indices, for Elasticsearch).
//! Queries are passed through in the backend's native query language untouched.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SearchResult;

pub mod elasticsearch;

#[cfg(test)]
pub mod mock;

pub const DEFAULT_SEARCH_URL: &str = "http://localhost:9200";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: Option<f64>,
    pub source: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SEARCH_URL.to_string(),
            username: None,
            password: None,
            api_key: None,
        }
    }
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run a backend-native query against one collection
    async fn search(&self, collection: &str, query: &Value, size: usize)
        -> SearchResult<SearchResponse>;

    /// Names of the collections that can be searched
    async fn list_collections(&self) -> SearchResult<Vec<String>>;

    /// The field schema of a collection
    async fn get_schema(&self, collection: &str) -> SearchResult<Value>;
}
