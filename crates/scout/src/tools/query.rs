//! Building backend queries and shaping their results for the model.
use serde_json::{json, Map, Value};

use crate::errors::{AgentError, AgentResult};
use crate::search::SearchResponse;

use super::{DEFAULT_RESULT_SIZE, MAX_RESULT_SIZE};

/// Rephrasing context used when no intent can be read out of a structured query
pub const DEFAULT_QUERY_INTENT: &str = "search results";

const SIMPLE_SEARCH_FIELDS: [&str; 3] = ["name^3", "content", "file_path^2"];

/// Clauses whose field values are usually the text the user was looking for
const TEXT_CLAUSES: [&str; 4] = ["match", "match_phrase", "match_phrase_prefix", "term"];

/// Fetch string parameters, reporting every missing one at once
pub fn required_strings<'a, const N: usize>(
    args: &'a Map<String, Value>,
    names: [&str; N],
) -> AgentResult<[&'a str; N]> {
    let mut missing = Vec::new();
    let mut found = [""; N];
    for (slot, name) in found.iter_mut().zip(names) {
        match args.get(name).and_then(|v| v.as_str()).map(str::trim) {
            Some(value) if !value.is_empty() => *slot = value,
            _ => missing.push(name),
        }
    }
    if missing.is_empty() {
        Ok(found)
    } else {
        Err(missing_parameters(&missing))
    }
}

pub fn missing_parameters(names: &[&str]) -> AgentError {
    AgentError::InvalidParameters(format!(
        "Missing required parameter{}: {}",
        if names.len() == 1 { "" } else { "s" },
        names.join(", ")
    ))
}

/// The query object of a structured search. Models sometimes send the object JSON
/// encoded as a string, which is accepted too.
pub fn query_object(args: &Map<String, Value>) -> Option<Value> {
    match args.get("query")? {
        Value::Object(map) if !map.is_empty() => Some(Value::Object(map.clone())),
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Object(map)) if !map.is_empty() => Some(Value::Object(map)),
            _ => None,
        },
        _ => None,
    }
}

pub fn result_size(args: &Map<String, Value>) -> usize {
    args.get("size")
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .map(|size| (size as usize).clamp(1, MAX_RESULT_SIZE))
        .unwrap_or(DEFAULT_RESULT_SIZE)
}

/// Fuzzy match over name, content and path, ANDed with an exact term filter when given
pub fn simple_query(search_text: &str, filter: Option<(&str, &Value)>) -> Value {
    let text_match = json!({
        "multi_match": {
            "query": search_text,
            "fields": SIMPLE_SEARCH_FIELDS,
            "fuzziness": "AUTO"
        }
    });

    match filter {
        Some((field, value)) => {
            let mut term = Map::new();
            term.insert(field.to_string(), value.clone());
            json!({
                "bool": {
                    "must": [text_match, { "term": term }]
                }
            })
        }
        None => text_match,
    }
}

/// `{total, results: [{id, score, source}]}` as pretty printed JSON
pub fn format_results(response: &SearchResponse) -> AgentResult<String> {
    let results: Vec<Value> = response
        .hits
        .iter()
        .map(|hit| {
            json!({
                "id": hit.id,
                "score": hit.score,
                "source": hit.source,
            })
        })
        .collect();

    serde_json::to_string_pretty(&json!({
        "total": response.total,
        "results": results,
    }))
    .map_err(|e| AgentError::Internal(e.to_string()))
}

/// Best-effort guess at the text a structured query is looking for
pub fn extract_query_text(query: &Value) -> Option<String> {
    match query {
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("query") {
                if !text.trim().is_empty() {
                    return Some(text.clone());
                }
            }
            for clause in TEXT_CLAUSES {
                if let Some(Value::Object(fields)) = map.get(clause) {
                    if let Some(text) = fields.values().find_map(field_text) {
                        return Some(text);
                    }
                }
            }
            map.values().find_map(extract_query_text)
        }
        Value::Array(items) => items.iter().find_map(extract_query_text),
        _ => None,
    }
}

/// `{"field": "text"}` or `{"field": {"query": "text"}}` / `{"field": {"value": "text"}}`
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Object(options) => ["query", "value"]
            .iter()
            .find_map(|key| options.get(*key).and_then(|v| v.as_str()))
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string),
        _ => None,
    }
}
