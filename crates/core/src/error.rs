use thiserror::Error;

pub const UNAVAILABLE_MESSAGE: &str = "search service unavailable";
pub const TOO_SHORT_MESSAGE: &str = "query too short";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{backend} unavailable: {details}")]
    Unavailable { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("invalid query: {0}")]
    Validation(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SearchError {
    pub fn unavailable(backend: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            details: details.into(),
        }
    }

    /// Collaborator and transport faults. These are the only errors the UI
    /// layer is expected to render.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Http(_) | Self::Serialization(_) | Self::Request(_)
        )
    }

    /// Message category shown to users; never carries backend detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => TOO_SHORT_MESSAGE,
            _ => UNAVAILABLE_MESSAGE,
        }
    }
}

/// Faults raised by a cache backend. `ResultCache` logs and absorbs these.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache payload error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = SearchError> = std::result::Result<T, E>;
