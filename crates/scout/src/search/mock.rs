use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{SearchBackend, SearchResponse};
use crate::errors::{SearchError, SearchResult};

/// A search backend serving canned responses and recording the queries it receives
#[derive(Default)]
pub struct MockSearchBackend {
    pub collections: BTreeMap<String, Value>,
    pub response: Option<SearchResponse>,
    pub queries: Mutex<Vec<(String, Value, usize)>>,
    calls: AtomicUsize,
}

impl MockSearchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, name: &str, schema: Value) -> Self {
        self.collections.insert(name.to_string(), schema);
        self
    }

    pub fn with_response(mut self, response: SearchResponse) -> Self {
        self.response = Some(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for MockSearchBackend {
    async fn search(
        &self,
        collection: &str,
        query: &Value,
        size: usize,
    ) -> SearchResult<SearchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .unwrap()
            .push((collection.to_string(), query.clone(), size));
        match &self.response {
            Some(response) if self.collections.contains_key(collection) => Ok(response.clone()),
            _ => Err(SearchError::CollectionNotFound(collection.to_string())),
        }
    }

    async fn list_collections(&self) -> SearchResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.collections.keys().cloned().collect())
    }

    async fn get_schema(&self, collection: &str) -> SearchResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.collections
            .get(collection)
            .cloned()
            .ok_or_else(|| SearchError::CollectionNotFound(collection.to_string()))
    }
}
