pub mod cache;
pub mod config;
pub mod debounce;
pub mod error;
pub mod facets;
pub mod gateway;
pub mod images;
pub mod models;
pub mod normalize;
pub mod pagination;
pub mod query;
pub mod session;
pub mod state;
pub mod stores;
pub mod traits;
pub mod upstream;

pub use cache::{MemoryCache, RedisCache, ResultCache};
pub use config::{GatewayConfig, ImageDeliveryConfig, SessionConfig};
pub use debounce::{Debounced, Debouncer};
pub use error::{CacheError, SearchError};
pub use facets::{load_facet_options, FacetShape, FacetSource};
pub use gateway::SearchGateway;
pub use images::{optimized_image_url, srcset, ImageFit, ImageFormat, ImageOptions};
pub use models::{
    ContentKind, FacetOption, FacetTag, HitCount, QueryDescriptor, ResultPage, ResultRecord,
};
pub use normalize::{Normalizer, NormalizerRegistry};
pub use pagination::{total_pages, Pagination};
pub use query::{build_descriptor, cache_key};
pub use session::{Filters, SearchSession, SessionUpdate};
pub use state::{Commit, PresentationMachine, PresentationState};
pub use stores::{MeilisearchStore, PostgrestStore};
pub use traits::{CacheBackend, RecordSource, SearchIndex};
pub use upstream::{IndexUpstream, TableUpstream, Upstream, UpstreamPage};
