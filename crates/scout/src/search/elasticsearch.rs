use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::{SearchBackend, SearchConfig, SearchHit, SearchResponse};
use crate::errors::{SearchError, SearchResult};

pub struct ElasticsearchBackend {
    client: Client,
    config: SearchConfig,
}

impl ElasticsearchBackend {
    pub fn new(config: SearchConfig) -> SearchResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(api_key) = &self.config.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(username) = &self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    async fn send(&self, request: RequestBuilder, collection: Option<&str>) -> SearchResult<Value> {
        let response: Response = self.authorize(request).send().await?;
        match (response.status(), collection) {
            (status, _) if status.is_success() => Ok(response.json().await?),
            (StatusCode::NOT_FOUND, Some(name)) => {
                Err(SearchError::CollectionNotFound(name.to_string()))
            }
            (status, _) => Err(SearchError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    fn parse_search_response(body: &Value) -> SearchResult<SearchResponse> {
        let hits = body
            .get("hits")
            .ok_or_else(|| SearchError::Malformed("missing `hits` in search response".into()))?;

        // `hits.total` is an object on 7.x+ and a bare number on older clusters
        let total = hits
            .get("total")
            .and_then(|t| t.get("value").or(Some(t)))
            .and_then(|t| t.as_u64())
            .unwrap_or_default();

        let hits = hits
            .get("hits")
            .and_then(|h| h.as_array())
            .map(|hits| {
                hits.iter()
                    .map(|hit| SearchHit {
                        id: hit["_id"].as_str().unwrap_or_default().to_string(),
                        score: hit["_score"].as_f64(),
                        source: hit.get("_source").cloned().unwrap_or(Value::Null),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(SearchResponse { total, hits })
    }
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    async fn search(
        &self,
        collection: &str,
        query: &Value,
        size: usize,
    ) -> SearchResult<SearchResponse> {
        let request = self
            .client
            .post(self.url(&format!("{}/_search", collection)))
            .json(&json!({ "query": query, "size": size }));
        let body = self.send(request, Some(collection)).await?;
        Self::parse_search_response(&body)
    }

    async fn list_collections(&self) -> SearchResult<Vec<String>> {
        let request = self.client.get(self.url("_cat/indices?format=json"));
        let body = self.send(request, None).await?;

        let indices = body
            .as_array()
            .ok_or_else(|| SearchError::Malformed("expected an array of indices".into()))?;
        let mut names: Vec<String> = indices
            .iter()
            .filter_map(|index| index.get("index").and_then(|name| name.as_str()))
            .filter(|name| !name.starts_with('.'))
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn get_schema(&self, collection: &str) -> SearchResult<Value> {
        let request = self.client.get(self.url(&format!("{}/_mapping", collection)));
        let body = self.send(request, Some(collection)).await?;

        Ok(body
            .get(collection)
            .and_then(|index| index.get("mappings"))
            .cloned()
            .unwrap_or(body))
    }
}
