pub mod meilisearch;
pub mod postgrest;

pub use meilisearch::MeilisearchStore;
pub use postgrest::PostgrestStore;
