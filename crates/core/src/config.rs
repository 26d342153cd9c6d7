use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use std::time::Duration;

pub const MIN_TERM_LEN: usize = 2;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_IMAGE_DELIVERY: &str = "https://imagedelivery.net/30674f493465e4c909165b0acf456988";

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Terms shorter than this (in characters) never reach the collaborator.
    pub min_term_len: usize,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub cache_ttl: Duration,
    pub cache_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            min_term_len: MIN_TERM_LEN,
            cache_ttl: crate::cache::DEFAULT_TTL,
            cache_enabled: true,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub debounce: Duration,
    pub page_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageDeliveryConfig {
    pub delivery_base: String,
}

impl Default for ImageDeliveryConfig {
    fn default() -> Self {
        Self {
            delivery_base: DEFAULT_IMAGE_DELIVERY.to_string(),
        }
    }
}
