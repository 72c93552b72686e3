use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::query::{
    extract_query_text, format_results, missing_parameters, query_object, required_strings,
    result_size, simple_query, DEFAULT_QUERY_INTENT,
};
use super::{GET_SCHEMA, LIST_COLLECTIONS, REPLY, SIMPLE_SEARCH, STRUCTURED_SEARCH};
use crate::condense::Condenser;
use crate::errors::{AgentError, AgentResult, SearchError};
use crate::rephrase::Rephraser;
use crate::search::SearchBackend;

/// Hands out increasing ids used to correlate the log lines of one tool execution.
///
/// Clones share the same sequence.
#[derive(Debug, Clone, Default)]
pub struct ExecutionCounter(Arc<AtomicU64>);

impl ExecutionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Executes tools by name against the search backend.
///
/// Errors never escape: validation and backend failures come back as text so the model
/// can read them and adjust its next call.
#[derive(Clone)]
pub struct ToolExecutor {
    backend: Arc<dyn SearchBackend>,
    condenser: Condenser,
    rephraser: Rephraser,
    counter: ExecutionCounter,
}

impl ToolExecutor {
    pub fn new(backend: Arc<dyn SearchBackend>, rephraser: Rephraser) -> Self {
        Self {
            backend,
            condenser: Condenser::default(),
            rephraser,
            counter: ExecutionCounter::new(),
        }
    }

    pub fn with_condenser(mut self, condenser: Condenser) -> Self {
        self.condenser = condenser;
        self
    }

    pub fn with_counter(mut self, counter: ExecutionCounter) -> Self {
        self.counter = counter;
        self
    }

    pub async fn execute(&self, name: &str, args: &Map<String, Value>) -> String {
        let execution_id = self.counter.next_id();
        let started_at = Utc::now();
        let timer = Instant::now();
        tracing::info!(execution_id, tool = name, %started_at, "tool execution started");

        let output = match self.dispatch(name, args).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(execution_id, tool = name, error = %e, "tool execution failed");
                format!("Error: {}", e)
            }
        };

        tracing::info!(
            execution_id,
            tool = name,
            finished_at = %Utc::now(),
            duration_ms = timer.elapsed().as_millis() as u64,
            output_chars = output.len(),
            "tool execution finished"
        );
        output
    }

    async fn dispatch(&self, name: &str, args: &Map<String, Value>) -> AgentResult<String> {
        match name {
            STRUCTURED_SEARCH => self.structured_search(args).await,
            SIMPLE_SEARCH => self.simple_search(args).await,
            LIST_COLLECTIONS => self.list_collections().await,
            GET_SCHEMA => self.get_schema(args).await,
            REPLY => reply(args),
            _ => Err(AgentError::ToolNotFound(name.to_string())),
        }
    }

    async fn structured_search(&self, args: &Map<String, Value>) -> AgentResult<String> {
        let collection = args
            .get("collection")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let query = query_object(args);

        let (collection, query) = match (collection, query) {
            (Some(collection), Some(query)) => (collection, query),
            (None, Some(_)) => return Err(missing_parameters(&["collection"])),
            (Some(_), None) => return Err(missing_parameters(&["query"])),
            (None, None) => return Err(missing_parameters(&["collection", "query"])),
        };

        let intent = extract_query_text(&query).unwrap_or_else(|| DEFAULT_QUERY_INTENT.to_string());
        self.search_and_shape(collection, &query, result_size(args), &intent)
            .await
    }

    async fn simple_search(&self, args: &Map<String, Value>) -> AgentResult<String> {
        let [collection, search_text] = required_strings(args, ["collection", "search_text"])?;

        let filter_field = args
            .get("filter_field")
            .and_then(|v| v.as_str())
            .filter(|f| !f.trim().is_empty());
        let filter_value = args.get("filter_value").filter(|v| !v.is_null());
        let filter = filter_field.zip(filter_value);

        let query = simple_query(search_text, filter);
        self.search_and_shape(collection, &query, result_size(args), search_text)
            .await
    }

    /// Run the query, then format, condense and rephrase the hits for the model
    async fn search_and_shape(
        &self,
        collection: &str,
        query: &Value,
        size: usize,
        intent: &str,
    ) -> AgentResult<String> {
        let response = self
            .backend
            .search(collection, query, size)
            .await
            .map_err(backend_error)?;
        tracing::debug!(collection, total = response.total, hits = response.hits.len(), "search completed");

        let formatted = format_results(&response)?;
        let condensed = self.condenser.condense(&formatted);
        Ok(self.rephraser.rephrase(intent, &condensed).await)
    }

    async fn list_collections(&self) -> AgentResult<String> {
        let collections = self.backend.list_collections().await.map_err(backend_error)?;
        if collections.is_empty() {
            return Ok("No collections found.".to_string());
        }
        Ok(format!("Available collections: {}", collections.join(", ")))
    }

    async fn get_schema(&self, args: &Map<String, Value>) -> AgentResult<String> {
        let [collection] = required_strings(args, ["collection"])?;
        let schema = self
            .backend
            .get_schema(collection)
            .await
            .map_err(backend_error)?;
        serde_json::to_string_pretty(&schema).map_err(|e| AgentError::Internal(e.to_string()))
    }
}

/// The agent intercepts this tool, executing it only echoes the message back.
/// An empty message is still a reply.
fn reply(args: &Map<String, Value>) -> AgentResult<String> {
    let message = args
        .get("message")
        .and_then(|v| v.as_str())
        .ok_or_else(|| missing_parameters(&["message"]))?;
    Ok(format!("[reply] {}", message))
}

fn backend_error(e: SearchError) -> AgentError {
    AgentError::ExecutionError(e.to_string())
}
