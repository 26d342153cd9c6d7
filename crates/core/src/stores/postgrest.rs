use crate::traits::{RecordSource, TableQuery, TableRows, TextMatch};
use crate::{HitCount, SearchError};
use async_trait::async_trait;
use reqwest::header::CONTENT_RANGE;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const BACKEND: &str = "postgrest";

/// Hosted relational store reached through its PostgREST interface.
pub struct PostgrestStore {
    client: Arc<Client>,
    endpoint: String,
    api_key: String,
}

impl PostgrestStore {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Arc::new(Client::new()),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.endpoint, table)
    }
}

#[async_trait]
impl RecordSource for PostgrestStore {
    async fn query(&self, query: &TableQuery) -> Result<TableRows, SearchError> {
        let params = query_params(query);
        debug!(table = %query.table, ?params, range = ?query.range, "postgrest query");

        let mut request = self
            .client
            .get(self.table_url(&query.table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(&params);

        if query.count {
            request = request.header("Prefer", "count=exact");
        }
        if let Some((start, end)) = query.range {
            request = request
                .header("Range-Unit", "items")
                .header("Range", format!("{start}-{end}"));
        }

        let response = request
            .send()
            .await
            .map_err(|error| SearchError::unavailable(BACKEND, error.to_string()))?;

        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range);

        // Asking for a range past the last row is not a fault: the page is empty.
        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(TableRows {
                rows: Vec::new(),
                total,
            });
        }

        if !response.status().is_success() {
            return Err(SearchError::unavailable(BACKEND, response.status().to_string()));
        }

        let rows = match response.json::<Value>().await? {
            Value::Array(rows) => rows,
            other => {
                return Err(SearchError::unavailable(
                    BACKEND,
                    format!("expected a row array, got {other}"),
                ))
            }
        };

        Ok(TableRows { rows, total })
    }
}

fn query_params(query: &TableQuery) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), query.select.clone())];

    for (column, value) in &query.filters {
        params.push((column.clone(), format!("eq.{}", quote(value))));
    }
    if let Some(text) = &query.text {
        params.push(("or".to_string(), text_filter(text)));
    }
    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{direction}", order.column)));
    }

    params
}

fn text_filter(text: &TextMatch) -> String {
    let pattern = quote(&format!("*{}*", text.term));
    let clauses = text
        .columns
        .iter()
        .map(|column| format!("{column}.ilike.{pattern}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("({clauses})")
}

/// Double-quotes a filter value so commas, dots and parentheses in user
/// input are not read as filter syntax.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// `0-9/25` and `*/25` carry an exact total; `0-9/*` does not.
fn parse_content_range(header: &str) -> Option<HitCount> {
    let (_, total) = header.split_once('/')?;
    total.trim().parse::<u64>().ok().map(HitCount::Exact)
}
