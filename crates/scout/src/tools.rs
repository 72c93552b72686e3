//! The fixed set of tools offered to the model on every turn.
use indoc::indoc;
use serde_json::json;
use std::sync::OnceLock;

use crate::models::tool::Tool;

pub mod executor;
pub mod query;

pub use executor::{ExecutionCounter, ToolExecutor};

pub const STRUCTURED_SEARCH: &str = "structured-search";
pub const SIMPLE_SEARCH: &str = "simple-search";
pub const LIST_COLLECTIONS: &str = "list-collections";
pub const GET_SCHEMA: &str = "get-schema";
/// Ends the agent loop; its `message` argument is the final answer
pub const REPLY: &str = "reply";

pub const DEFAULT_RESULT_SIZE: usize = 10;
pub const MAX_RESULT_SIZE: usize = 100;

/// Tool definitions, built once and shared for the life of the process
pub fn definitions() -> &'static [Tool] {
    static DEFINITIONS: OnceLock<Vec<Tool>> = OnceLock::new();
    DEFINITIONS.get_or_init(build_definitions)
}

fn build_definitions() -> Vec<Tool> {
    vec![
        Tool::new(
            STRUCTURED_SEARCH,
            indoc! {r#"
                Run a query written in the search backend's query DSL against one collection.
                Use this for filters, ranges, boolean combinations and exact field matches.
                Returns a summary of the matching documents.
            "#},
            json!({
                "type": "object",
                "properties": {
                    "collection": {
                        "type": "string",
                        "description": "Name of the collection to search"
                    },
                    "query": {
                        "type": "object",
                        "description": "Query DSL object, e.g. {\"bool\": {\"must\": [{\"match\": {\"content\": \"timeout\"}}]}}"
                    },
                    "size": {
                        "type": "integer",
                        "description": "Maximum number of hits to return (1-100, default 10)",
                        "minimum": 1,
                        "maximum": MAX_RESULT_SIZE
                    }
                },
                "required": ["collection", "query"]
            }),
        ),
        Tool::new(
            SIMPLE_SEARCH,
            indoc! {r#"
                Fuzzy full-text search across the name, content and file path of documents in a
                collection, optionally restricted to documents where one field has an exact value.
            "#},
            json!({
                "type": "object",
                "properties": {
                    "collection": {
                        "type": "string",
                        "description": "Name of the collection to search"
                    },
                    "search_text": {
                        "type": "string",
                        "description": "Free text to look for"
                    },
                    "filter_field": {
                        "type": "string",
                        "description": "Optional field that must match filter_value exactly"
                    },
                    "filter_value": {
                        "type": "string",
                        "description": "Value required in filter_field"
                    },
                    "size": {
                        "type": "integer",
                        "description": "Maximum number of hits to return (1-100, default 10)",
                        "minimum": 1,
                        "maximum": MAX_RESULT_SIZE
                    }
                },
                "required": ["collection", "search_text"]
            }),
        ),
        Tool::new(
            LIST_COLLECTIONS,
            "List the collections available for searching.",
            json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        ),
        Tool::new(
            GET_SCHEMA,
            "Get the field mapping of a collection, to learn which fields can be queried.",
            json!({
                "type": "object",
                "properties": {
                    "collection": {
                        "type": "string",
                        "description": "Name of the collection"
                    }
                },
                "required": ["collection"]
            }),
        ),
        Tool::new(
            REPLY,
            indoc! {r#"
                Send the final answer to the user and finish. Call this once you have enough
                information, with a complete and well formatted answer.
            "#},
            json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "The answer shown to the user"
                    }
                },
                "required": ["message"]
            }),
        ),
    ]
}
