use crate::cache::ResultCache;
use crate::config::GatewayConfig;
use crate::models::{QueryDescriptor, ResultPage, ResultRecord};
use crate::normalize::{Normalizer, NormalizerRegistry};
use crate::upstream::{Upstream, UpstreamPage};
use crate::SearchError;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Single entry point from the orchestration layer to a search or data
/// collaborator: validates the term, consults the cache, normalizes hits.
pub struct SearchGateway<U> {
    upstream: U,
    normalizer: Normalizer,
    cache: Arc<ResultCache>,
    config: GatewayConfig,
}

impl<U> SearchGateway<U>
where
    U: Upstream,
{
    pub fn new(upstream: U, cache: Arc<ResultCache>, config: GatewayConfig) -> Result<Self, SearchError> {
        Self::with_registry(upstream, cache, config, &NormalizerRegistry::default())
    }

    pub fn with_registry(
        upstream: U,
        cache: Arc<ResultCache>,
        config: GatewayConfig,
        registry: &NormalizerRegistry,
    ) -> Result<Self, SearchError> {
        let normalizer = registry.resolve(upstream.source())?;
        Ok(Self {
            upstream,
            normalizer,
            cache,
            config,
        })
    }

    pub fn source(&self) -> &str {
        self.upstream.source()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Whether `descriptor` would be sent upstream at all.
    pub fn accepts(&self, descriptor: &QueryDescriptor) -> bool {
        self.validate(descriptor).is_ok()
    }

    pub fn validate(&self, descriptor: &QueryDescriptor) -> Result<(), SearchError> {
        let length = descriptor.term().chars().count();
        if length == 0 || length < self.config.min_term_len {
            return Err(SearchError::Validation(format!(
                "term must be at least {} characters",
                self.config.min_term_len.max(1)
            )));
        }
        Ok(())
    }

    /// Too-short terms resolve to an empty page without touching the cache or
    /// the collaborator. Collaborator failures surface as
    /// [`SearchError::Unavailable`].
    pub async fn search(&self, descriptor: &QueryDescriptor) -> Result<ResultPage, SearchError> {
        if self.validate(descriptor).is_err() {
            debug!(source = self.source(), term = descriptor.term(), "term too short, skipping search");
            return Ok(ResultPage::empty(descriptor.clone()));
        }

        if self.config.cache_enabled {
            if let Some(page) = self.cache.get(self.source(), descriptor).await {
                return Ok(page);
            }
        }

        let raw = self.upstream.fetch(descriptor).await.map_err(|error| {
            warn!(source = self.source(), %error, "upstream search failed");
            match error {
                unavailable @ SearchError::Unavailable { .. } => unavailable,
                other => SearchError::unavailable(self.source(), other.to_string()),
            }
        })?;

        let page = self.normalize(descriptor, raw);
        if self.config.cache_enabled {
            self.cache
                .put(self.source(), &page, Some(self.config.cache_ttl))
                .await;
        }
        Ok(page)
    }

    fn normalize(&self, descriptor: &QueryDescriptor, raw: UpstreamPage) -> ResultPage {
        let limit = descriptor.page_size() as usize;
        let received = raw.hits.len();
        let mut seen = HashSet::new();

        let records: Vec<ResultRecord> = raw
            .hits
            .iter()
            .filter_map(self.normalizer)
            .filter(|record| seen.insert(record.id.clone()))
            .take(limit)
            .collect();

        if records.len() < received.min(limit) {
            debug!(
                source = self.source(),
                received,
                kept = records.len(),
                "dropped hits that could not be normalized"
            );
        }

        ResultPage {
            total_hits: raw.total.at_least(records.len() as u64),
            records,
            descriptor: descriptor.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentKind, HitCount};
    use crate::query::build_descriptor;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeUpstream {
        source: &'static str,
        hits: Vec<Value>,
        total: HitCount,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeUpstream {
        fn deliveries(count: usize, total: HitCount) -> Self {
            Self {
                source: "iyc",
                hits: (0..count)
                    .map(|index| json!({"id": format!("d{index}"), "title": format!("Delivery {index}"), "slug": format!("d-{index}")}))
                    .collect(),
                total,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::deliveries(0, HitCount::Exact(0))
            }
        }
    }

    #[async_trait]
    impl Upstream for FakeUpstream {
        fn source(&self) -> &str {
            self.source
        }

        async fn fetch(&self, _descriptor: &QueryDescriptor) -> Result<UpstreamPage, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SearchError::Request("connection reset".to_string()));
            }
            Ok(UpstreamPage {
                hits: self.hits.clone(),
                total: self.total,
            })
        }
    }

    fn gateway(upstream: FakeUpstream) -> SearchGateway<FakeUpstream> {
        SearchGateway::new(upstream, Arc::new(ResultCache::in_memory()), GatewayConfig::default())
            .expect("iyc has a normalizer")
    }

    fn no_facets() -> Vec<(&'static str, &'static str)> {
        Vec::new()
    }

    #[tokio::test]
    async fn short_terms_never_reach_upstream() -> Result<(), SearchError> {
        let gateway = gateway(FakeUpstream::deliveries(3, HitCount::Exact(3)));

        for term in ["", " ", "c", " c "] {
            let descriptor = build_descriptor(term, no_facets(), 1, 10);
            let page = gateway.search(&descriptor).await?;
            assert!(page.is_empty());
            assert_eq!(page.total_hits, HitCount::Exact(0));
            assert!(!gateway.accepts(&descriptor));
        }

        assert_eq!(gateway.upstream.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn hits_are_normalized_and_capped_at_page_size() -> Result<(), SearchError> {
        let gateway = gateway(FakeUpstream::deliveries(12, HitCount::Estimated(25)));
        let page = gateway
            .search(&build_descriptor("civic", no_facets(), 1, 10))
            .await?;

        assert_eq!(page.records.len(), 10);
        assert_eq!(page.total_hits, HitCount::Estimated(25));
        assert!(page.records.iter().all(|record| record.kind == ContentKind::Delivery));
        assert_eq!(page.records[0].target_url, "/its-your-car/d-0");
        Ok(())
    }

    #[tokio::test]
    async fn repeated_query_is_served_from_cache() -> Result<(), SearchError> {
        let gateway = gateway(FakeUpstream::deliveries(2, HitCount::Exact(2)));

        let first = gateway
            .search(&build_descriptor("civic", [("location", "Bangor")], 1, 10))
            .await?;
        let second = gateway
            .search(&build_descriptor("civic ", [("location", "Bangor")], 1, 10))
            .await?;

        assert_eq!(first, second);
        assert_eq!(gateway.upstream.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn disabled_cache_always_calls_upstream() -> Result<(), SearchError> {
        let config = GatewayConfig {
            cache_enabled: false,
            ..GatewayConfig::default()
        };
        let gateway = SearchGateway::new(
            FakeUpstream::deliveries(1, HitCount::Exact(1)),
            Arc::new(ResultCache::in_memory()),
            config,
        )?;

        let descriptor = build_descriptor("civic", no_facets(), 1, 10);
        gateway.search(&descriptor).await?;
        gateway.search(&descriptor).await?;
        assert_eq!(gateway.upstream.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn upstream_faults_become_unavailable() {
        let gateway = gateway(FakeUpstream::failing());
        let error = gateway
            .search(&build_descriptor("civic", no_facets(), 1, 10))
            .await
            .expect_err("upstream is down");

        assert!(matches!(error, SearchError::Unavailable { .. }));
        assert_eq!(error.user_message(), "search service unavailable");
    }

    #[tokio::test]
    async fn duplicate_and_malformed_hits_are_dropped() -> Result<(), SearchError> {
        let mut upstream = FakeUpstream::deliveries(0, HitCount::Exact(0));
        upstream.hits = vec![
            json!({"id": "a", "title": "First"}),
            json!({"id": "a", "title": "First again"}),
            json!({"title": "No id"}),
        ];
        let gateway = gateway(upstream);

        let page = gateway
            .search(&build_descriptor("first", no_facets(), 1, 10))
            .await?;
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.total_hits, HitCount::Exact(1));
        Ok(())
    }

    #[test]
    fn unknown_source_is_rejected_at_construction() {
        let mut upstream = FakeUpstream::deliveries(0, HitCount::Exact(0));
        upstream.source = "inventory";
        let result = SearchGateway::new(upstream, Arc::new(ResultCache::in_memory()), GatewayConfig::default());
        assert!(matches!(result, Err(SearchError::InvalidArgument(_))));
    }
}
