use crate::traits::{IndexSearchRequest, IndexSearchResponse, SearchIndex};
use crate::{HitCount, SearchError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

const BACKEND: &str = "meilisearch";

pub struct MeilisearchStore {
    client: Arc<Client>,
    endpoint: String,
    api_key: String,
}

impl MeilisearchStore {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Arc::new(Client::new()),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn search_url(&self, index: &str) -> String {
        format!("{}/indexes/{}/search", self.endpoint, index)
    }
}

#[async_trait]
impl SearchIndex for MeilisearchStore {
    async fn search(
        &self,
        index: &str,
        request: &IndexSearchRequest,
    ) -> Result<IndexSearchResponse, SearchError> {
        debug!(
            index,
            term = %request.term,
            offset = request.offset,
            limit = request.limit,
            filter = ?request.filter,
            "meilisearch query"
        );

        let response = self
            .client
            .post(self.search_url(index))
            .bearer_auth(&self.api_key)
            .json(&build_body(request))
            .send()
            .await
            .map_err(|error| SearchError::unavailable(BACKEND, error.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::unavailable(BACKEND, response.status().to_string()));
        }

        let body: Value = response.json().await?;
        Ok(parse_response(&body))
    }
}

fn build_body(request: &IndexSearchRequest) -> Value {
    let mut body = Map::new();
    body.insert("q".to_string(), json!(request.term));
    body.insert("limit".to_string(), json!(request.limit));
    body.insert("offset".to_string(), json!(request.offset));

    if let Some(filter) = &request.filter {
        body.insert("filter".to_string(), json!(filter));
    }
    if !request.highlight_fields.is_empty() {
        body.insert(
            "attributesToHighlight".to_string(),
            json!(request.highlight_fields),
        );
    }
    if !request.retrieve_fields.is_empty() {
        body.insert(
            "attributesToRetrieve".to_string(),
            json!(request.retrieve_fields),
        );
    }

    Value::Object(body)
}

/// `totalHits` is only reported for page-based queries and is exact;
/// offset/limit queries report `estimatedTotalHits`.
fn parse_response(body: &Value) -> IndexSearchResponse {
    let hits = body
        .pointer("/hits")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let total_hits = if let Some(total) = body.pointer("/totalHits").and_then(Value::as_u64) {
        HitCount::Exact(total)
    } else if let Some(total) = body.pointer("/estimatedTotalHits").and_then(Value::as_u64) {
        HitCount::Estimated(total)
    } else {
        HitCount::Estimated(hits.len() as u64)
    };

    IndexSearchResponse { hits, total_hits }
}
