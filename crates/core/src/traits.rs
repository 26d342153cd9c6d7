use crate::{CacheError, HitCount, SearchError};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Request sent to a hosted search index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSearchRequest {
    pub term: String,
    pub limit: u32,
    pub offset: u64,
    pub filter: Option<String>,
    pub highlight_fields: Vec<String>,
    pub retrieve_fields: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IndexSearchResponse {
    pub hits: Vec<Value>,
    pub total_hits: HitCount,
}

#[async_trait]
pub trait SearchIndex {
    async fn search(
        &self,
        index: &str,
        request: &IndexSearchRequest,
    ) -> Result<IndexSearchResponse, SearchError>;
}

/// Case-insensitive substring match of `term` over any of `columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    pub columns: Vec<String>,
    pub term: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub column: String,
    pub ascending: bool,
}

/// Parametrized read against one table of the hosted relational store.
/// `range` is inclusive on both ends, as the store expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    pub table: String,
    pub select: String,
    pub filters: Vec<(String, String)>,
    pub text: Option<TextMatch>,
    pub order: Option<SortOrder>,
    pub range: Option<(u64, u64)>,
    pub count: bool,
}

impl TableQuery {
    pub fn new(table: impl Into<String>, select: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select: select.into(),
            filters: Vec::new(),
            text: None,
            order: None,
            range: None,
            count: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableRows {
    pub rows: Vec<Value>,
    pub total: Option<HitCount>,
}

#[async_trait]
pub trait RecordSource {
    async fn query(&self, query: &TableQuery) -> Result<TableRows, SearchError>;
}

/// String key/value store with per-entry expiry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
}
