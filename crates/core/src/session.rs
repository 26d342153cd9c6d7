use crate::config::SessionConfig;
use crate::debounce::{Debounced, Debouncer};
use crate::gateway::SearchGateway;
use crate::models::{QueryDescriptor, ResultPage};
use crate::pagination::Pagination;
use crate::query::{build_descriptor, is_unset};
use crate::state::{Commit, PresentationMachine, PresentationState};
use crate::upstream::Upstream;
use crate::SearchError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Raw user selections backing the current descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    term: String,
    facets: BTreeMap<String, String>,
}

impl Filters {
    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn facets(&self) -> &BTreeMap<String, String> {
        &self.facets
    }

    pub fn is_active(&self) -> bool {
        !self.term.is_empty() || !self.facets.is_empty()
    }
}

/// What a session input or [`SearchSession::next_update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionUpdate {
    /// A new query was sent; the state is `Loading`.
    Issued,
    /// The term is empty or too short; the state is `Idle`.
    Cleared,
    /// Nothing changed.
    Unchanged,
    /// A response was committed to the state.
    Applied,
    /// A response for a superseded query was dropped.
    Stale,
}

impl From<Commit> for SessionUpdate {
    fn from(commit: Commit) -> Self {
        match commit {
            Commit::Applied => Self::Applied,
            Commit::Stale => Self::Stale,
        }
    }
}

struct Completion {
    descriptor: QueryDescriptor,
    outcome: Result<ResultPage, SearchError>,
}

/// One interactive search surface: debounced term input, facet selectors
/// and page controls feeding a single last-request-wins state machine.
///
/// Queries run on spawned tasks and report back over a channel; call
/// [`next_update`](Self::next_update) to fold debounced input and responses
/// into the state. Dropping the session cancels the debounce timer, and any
/// response still in flight is discarded when it lands.
pub struct SearchSession<U> {
    gateway: Arc<SearchGateway<U>>,
    filters: Filters,
    pagination: Pagination,
    machine: PresentationMachine,
    debouncer: Debouncer<String>,
    debounced: Debounced<String>,
    awaiting_term: bool,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    in_flight: usize,
}

impl<U> SearchSession<U>
where
    U: Upstream + 'static,
{
    pub fn new(gateway: Arc<SearchGateway<U>>, config: SessionConfig) -> Self {
        let (debouncer, debounced) = Debouncer::new(config.debounce);
        let (completion_tx, completions) = mpsc::unbounded_channel();

        Self {
            gateway,
            filters: Filters::default(),
            pagination: Pagination::new(config.page_size),
            machine: PresentationMachine::new(),
            debouncer,
            debounced,
            awaiting_term: false,
            completion_tx,
            completions,
            in_flight: 0,
        }
    }

    pub fn state(&self) -> &PresentationState {
        self.machine.state()
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn has_active_filters(&self) -> bool {
        self.filters.is_active()
    }

    pub fn gateway(&self) -> &SearchGateway<U> {
        &self.gateway
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Whether `next_update` has anything to wait for.
    pub fn has_pending(&self) -> bool {
        self.awaiting_term || self.in_flight > 0
    }

    /// Keystroke-level term input; takes effect after the quiet period.
    pub fn input_term(&mut self, raw: &str) {
        self.awaiting_term = true;
        self.debouncer.push(raw.to_string());
    }

    /// Applies a term immediately, dropping any pending debounced input.
    pub fn submit_term(&mut self, raw: &str) -> SessionUpdate {
        self.debouncer.cancel();
        self.awaiting_term = false;
        self.apply_term(raw)
    }

    pub fn select_facet(&mut self, name: &str, value: &str) -> SessionUpdate {
        let name = name.trim();
        if name.is_empty() {
            return SessionUpdate::Unchanged;
        }
        let changed = if is_unset(value) {
            self.filters.facets.remove(name).is_some()
        } else {
            let value = value.trim().to_string();
            self.filters.facets.insert(name.to_string(), value.clone()) != Some(value)
        };

        if !changed {
            return SessionUpdate::Unchanged;
        }
        self.pagination.reset();
        self.refresh()
    }

    pub fn clear_facet(&mut self, name: &str) -> SessionUpdate {
        self.select_facet(name, "")
    }

    pub fn go_to_page(&mut self, page: u32) -> SessionUpdate {
        if self.machine.current().is_none() || !self.pagination.go_to(page) {
            return SessionUpdate::Unchanged;
        }
        self.refresh()
    }

    pub fn next_page(&mut self) -> SessionUpdate {
        self.go_to_page(self.pagination.page().saturating_add(1))
    }

    pub fn prev_page(&mut self) -> SessionUpdate {
        self.go_to_page(self.pagination.page().saturating_sub(1))
    }

    /// Resets term, every facet and the page together.
    pub fn clear_filters(&mut self) -> SessionUpdate {
        self.debouncer.cancel();
        self.awaiting_term = false;
        self.filters = Filters::default();
        self.pagination.clear();
        self.machine.clear();
        SessionUpdate::Cleared
    }

    /// Waits for the next debounced term or query response and applies it.
    /// Returns `None` straight away when nothing is pending.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        if !self.has_pending() {
            return None;
        }

        tokio::select! {
            Some(term) = self.debounced.recv(), if self.awaiting_term => {
                self.awaiting_term = false;
                Some(self.apply_term(&term))
            }
            Some(completion) = self.completions.recv(), if self.in_flight > 0 => {
                self.in_flight -= 1;
                Some(self.apply_completion(completion))
            }
            else => None,
        }
    }

    /// Drives the session until nothing is pending and returns the state.
    pub async fn settle(&mut self) -> &PresentationState {
        while self.next_update().await.is_some() {}
        self.machine.state()
    }

    fn apply_term(&mut self, raw: &str) -> SessionUpdate {
        let term = raw.trim();
        if term == self.filters.term {
            return SessionUpdate::Unchanged;
        }

        self.filters.term = term.to_string();
        self.pagination.reset();
        self.refresh()
    }

    fn apply_completion(&mut self, completion: Completion) -> SessionUpdate {
        let Completion {
            descriptor,
            outcome,
        } = completion;
        let total = outcome.as_ref().ok().map(|page| page.total_hits);

        let commit = self.machine.resolve(&descriptor, outcome);
        if commit == Commit::Applied {
            if let Some(total) = total {
                self.pagination.set_total(total);
            }
        }
        commit.into()
    }

    fn current_descriptor(&self) -> QueryDescriptor {
        build_descriptor(
            &self.filters.term,
            &self.filters.facets,
            self.pagination.page(),
            self.pagination.page_size(),
        )
    }

    fn refresh(&mut self) -> SessionUpdate {
        let descriptor = self.current_descriptor();
        if !self.gateway.accepts(&descriptor) {
            self.machine.clear();
            self.pagination.clear();
            return SessionUpdate::Cleared;
        }

        debug!(
            source = self.gateway.source(),
            term = descriptor.term(),
            page = descriptor.page(),
            facets = ?descriptor.facets(),
            "issuing query"
        );
        self.machine.begin(descriptor.clone());
        self.in_flight += 1;

        let gateway = Arc::clone(&self.gateway);
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = gateway.search(&descriptor).await;
            // The session may be gone; a closed channel means nobody is listening.
            let _ = completion_tx.send(Completion {
                descriptor,
                outcome,
            });
        });

        SessionUpdate::Issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResultCache;
    use crate::config::GatewayConfig;
    use crate::models::HitCount;
    use crate::upstream::UpstreamPage;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Script {
        calls: Mutex<Vec<QueryDescriptor>>,
        fail: AtomicBool,
    }

    impl Script {
        fn calls(&self) -> Vec<QueryDescriptor> {
            self.calls.lock().expect("lock").clone()
        }
    }

    /// Returns `total` posts for any term, paged by the descriptor, after a
    /// per-term delay.
    struct ScriptedUpstream {
        total: u64,
        delays: HashMap<&'static str, Duration>,
        script: Arc<Script>,
    }

    #[async_trait]
    impl Upstream for ScriptedUpstream {
        fn source(&self) -> &str {
            "posts"
        }

        async fn fetch(&self, descriptor: &QueryDescriptor) -> Result<UpstreamPage, SearchError> {
            self.script.calls.lock().expect("lock").push(descriptor.clone());
            let delay = self
                .delays
                .get(descriptor.term())
                .copied()
                .unwrap_or(Duration::from_millis(20));
            tokio::time::sleep(delay).await;

            if self.script.fail.load(Ordering::SeqCst) {
                return Err(SearchError::Request("connection refused".to_string()));
            }

            let start = descriptor.offset();
            let end = (start + u64::from(descriptor.page_size())).min(self.total);
            let hits = (start..end)
                .map(|index| json!({"id": format!("{}-{index}", descriptor.term()), "title": format!("Post {index}")}))
                .collect();
            Ok(UpstreamPage {
                hits,
                total: HitCount::Exact(self.total),
            })
        }
    }

    fn session_with(
        total: u64,
        delays: &[(&'static str, u64)],
    ) -> (SearchSession<ScriptedUpstream>, Arc<Script>) {
        let script = Arc::new(Script::default());
        let upstream = ScriptedUpstream {
            total,
            delays: delays
                .iter()
                .map(|(term, millis)| (*term, Duration::from_millis(*millis)))
                .collect(),
            script: Arc::clone(&script),
        };
        let gateway = SearchGateway::new(
            upstream,
            Arc::new(ResultCache::in_memory()),
            GatewayConfig::default(),
        )
        .expect("posts has a normalizer");

        (
            SearchSession::new(Arc::new(gateway), SessionConfig::default()),
            script,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn term_search_reaches_success_with_page_count() {
        let (mut session, script) = session_with(25, &[]);

        session.input_term("civic");
        assert_eq!(session.next_update().await, Some(SessionUpdate::Issued));
        assert!(session.state().is_loading());
        assert_eq!(session.next_update().await, Some(SessionUpdate::Applied));

        let page = session.state().page().expect("civic has results");
        assert_eq!(page.records.len(), 10);
        assert_eq!(page.total_hits, HitCount::Exact(25));
        assert_eq!(session.pagination().total_pages(), 3);
        assert_eq!(script.calls().len(), 1);
        assert_eq!(session.next_update().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_and_short_terms_stay_idle_without_calls() {
        let (mut session, script) = session_with(25, &[]);

        session.input_term("");
        assert_eq!(session.next_update().await, Some(SessionUpdate::Unchanged));
        session.input_term("c");
        assert_eq!(session.next_update().await, Some(SessionUpdate::Cleared));

        assert_eq!(session.state(), &PresentationState::Idle);
        assert!(script.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn keystrokes_inside_quiet_period_issue_one_query() {
        let (mut session, script) = session_with(25, &[]);

        for partial in ["c", "ci", "civ", "civi", "civic"] {
            session.input_term(partial);
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        session.settle().await;

        let calls = script.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].term(), "civic");
    }

    #[tokio::test(start_paused = true)]
    async fn facet_change_resets_page_before_query() {
        let (mut session, script) = session_with(25, &[]);
        session.submit_term("civic");
        session.settle().await;

        assert_eq!(session.go_to_page(3), SessionUpdate::Issued);
        session.settle().await;
        assert_eq!(session.pagination().page(), 3);

        assert_eq!(session.select_facet("location", "Bangor"), SessionUpdate::Issued);
        assert_eq!(session.pagination().page(), 1);
        let loading = session.state().descriptor().expect("query in flight");
        assert_eq!(loading.page(), 1);
        assert_eq!(loading.facet("location"), Some("Bangor"));

        session.settle().await;
        let last = script.calls().pop().expect("facet query issued");
        assert_eq!(last.page(), 1);
        assert_eq!(last.facet("location"), Some("Bangor"));
    }

    #[tokio::test(start_paused = true)]
    async fn term_change_resets_page() {
        let (mut session, _script) = session_with(25, &[]);
        session.submit_term("civic");
        session.settle().await;
        session.next_page();
        session.settle().await;
        assert_eq!(session.pagination().page(), 2);

        session.input_term("accord");
        session.settle().await;
        assert_eq!(session.pagination().page(), 1);
        assert_eq!(session.state().descriptor().map(QueryDescriptor::page), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn selecting_all_or_same_value_changes_nothing() {
        let (mut session, script) = session_with(25, &[]);
        session.submit_term("civic");
        session.settle().await;

        assert_eq!(session.select_facet("location", "all"), SessionUpdate::Unchanged);
        assert_eq!(session.select_facet("location", "Bangor"), SessionUpdate::Issued);
        assert_eq!(session.select_facet("location", " Bangor "), SessionUpdate::Unchanged);
        session.settle().await;
        assert_eq!(session.clear_facet("location"), SessionUpdate::Issued);
        assert_eq!(session.settle().await.name(), "success");

        // Clearing the facet returns to the first descriptor, which is cached.
        assert_eq!(script.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn latest_query_wins_over_slower_earlier_one() {
        let (mut session, _script) = session_with(25, &[("accord", 1_000), ("civic", 50)]);

        session.input_term("accord");
        assert_eq!(session.next_update().await, Some(SessionUpdate::Issued));
        session.input_term("civic");
        assert_eq!(session.next_update().await, Some(SessionUpdate::Issued));

        assert_eq!(session.next_update().await, Some(SessionUpdate::Applied));
        assert_eq!(session.next_update().await, Some(SessionUpdate::Stale));
        assert_eq!(session.next_update().await, None);

        let page = session.state().page().expect("civic succeeded");
        assert_eq!(page.descriptor.term(), "civic");
        assert!(page.records.iter().all(|record| record.id.starts_with("civic-")));
    }

    #[tokio::test(start_paused = true)]
    async fn settled_but_unread_term_loses_to_newer_input() {
        let (mut session, script) = session_with(25, &[]);

        session.input_term("accord");
        tokio::time::sleep(Duration::from_millis(400)).await;
        session.input_term("civic");
        let state = session.settle().await;

        assert_eq!(state.descriptor().map(QueryDescriptor::term), Some("civic"));
        assert_eq!(session.filters().term(), "civic");
        let terms: Vec<_> = script.calls().iter().map(|call| call.term().to_string()).collect();
        assert_eq!(terms, vec!["civic".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_term_is_never_searched() {
        let (mut session, script) = session_with(25, &[]);

        session.input_term("accord");
        tokio::time::sleep(Duration::from_millis(400)).await;
        session.clear_filters();
        session.input_term("civic");
        let state = session.settle().await;

        assert_eq!(state.descriptor().map(QueryDescriptor::term), Some("civic"));
        assert!(script.calls().iter().all(|call| call.term() == "civic"));
    }

    #[tokio::test(start_paused = true)]
    async fn submitted_term_discards_unread_input() {
        let (mut session, _script) = session_with(25, &[]);

        session.input_term("accord");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(session.submit_term("civic"), SessionUpdate::Issued);
        session.settle().await;

        session.input_term("civic");
        assert_eq!(session.next_update().await, Some(SessionUpdate::Unchanged));
        assert_eq!(session.next_update().await, None);
        assert_eq!(
            session.state().descriptor().map(QueryDescriptor::term),
            Some("civic")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn blank_facet_name_is_ignored() {
        let (mut session, script) = session_with(25, &[]);
        session.submit_term("civic");
        session.settle().await;

        assert_eq!(session.select_facet("  ", "Bangor"), SessionUpdate::Unchanged);
        assert!(session.filters().facets().is_empty());
        assert!(!session.has_pending());
        assert_eq!(script.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_failure_shows_error_and_filters_stay_usable() {
        let (mut session, script) = session_with(25, &[]);
        script.fail.store(true, Ordering::SeqCst);

        session.submit_term("civic");
        let state = session.settle().await;
        assert_eq!(state.name(), "error");
        assert!(matches!(
            state,
            PresentationState::Error { reason, .. } if reason == "search service unavailable"
        ));

        script.fail.store(false, Ordering::SeqCst);
        assert_eq!(session.select_facet("location", "Bangor"), SessionUpdate::Issued);
        assert_eq!(session.settle().await.name(), "success");
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_query_is_served_from_cache() {
        let (mut session, script) = session_with(25, &[]);

        session.input_term("civic");
        session.settle().await;
        assert_eq!(session.clear_filters(), SessionUpdate::Cleared);
        session.input_term("civic");
        assert_eq!(session.settle().await.name(), "success");

        assert_eq!(script.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_result_set_renders_empty_state() {
        let (mut session, _script) = session_with(0, &[]);
        session.submit_term("zzz");

        let state = session.settle().await;
        assert!(matches!(state, PresentationState::Empty(descriptor) if descriptor.term() == "zzz"));
        assert_eq!(session.pagination().total_pages(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_filters_resets_everything() {
        let (mut session, _script) = session_with(25, &[]);
        session.submit_term("civic");
        session.select_facet("location", "Bangor");
        session.settle().await;
        assert!(session.has_active_filters());

        session.input_term("civic accord");
        session.clear_filters();

        assert!(!session.has_active_filters());
        assert!(!session.has_pending());
        assert_eq!(session.pagination().page(), 1);
        assert_eq!(session.state(), &PresentationState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_session_ignores_late_response() {
        let (mut session, script) = session_with(25, &[("civic", 500)]);
        assert_eq!(session.submit_term("civic"), SessionUpdate::Issued);
        drop(session);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(script.calls().len(), 1);
    }
}
