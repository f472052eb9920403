//! Query state for interactive consumers.
//!
//! A [`SearchSession`] owns the "current results" of a search box: it runs
//! queries off the async executor and applies a query's results only if no
//! newer query was issued in the meantime, so a slow early query can never
//! overwrite the answer to a later one.

use std::{
    future::Future,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    error::{Error, Result},
    record_store::{RecordStore, SubscriptionId},
    search::{IndexStats, SearchResult, SearchService},
};

/// What happened to a query once it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The results (possibly empty) are now the session's results.
    Applied,
    /// A newer query was issued first; these results were dropped.
    Superseded,
    /// The search failed; results were cleared and the error recorded.
    Failed,
}

#[derive(Debug, Default)]
struct State {
    results: Vec<SearchResult>,
    /// Searches that passed their ticket check and have not finished.
    in_flight: usize,
    is_indexing: bool,
    error: Option<String>,
}

#[derive(Debug)]
pub struct SearchSession {
    service: Arc<SearchService>,
    store: Arc<RecordStore>,
    subscription: SubscriptionId,
    /// Ticket of the most recently issued query.
    latest: AtomicU64,
    state: Mutex<State>,
}

impl SearchSession {
    /// Create a session and subscribe `service` to changes in `store`.
    ///
    /// The subscription is dropped with the session.
    pub fn new(service: Arc<SearchService>, store: Arc<RecordStore>) -> Arc<Self> {
        let subscription = store.subscribe(service.clone());
        Arc::new(Self {
            service,
            store,
            subscription,
            latest: AtomicU64::new(0),
            state: Mutex::new(State::default()),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the index from the store.
    ///
    /// On failure the error is recorded and searches return whatever the
    /// (possibly empty) index holds.
    pub async fn initialize(&self) -> Result<IndexStats> {
        self.state().is_indexing = true;

        let service = Arc::clone(&self.service);
        let store = Arc::clone(&self.store);
        let outcome = tokio::task::spawn_blocking(move || service.rebuild_all(&store))
            .await
            .map_err(|e| Error::Task(e.to_string()))
            .and_then(|r| r);

        let mut state = self.state();
        state.is_indexing = false;
        if let Err(ref e) = outcome {
            tracing::error!(error = %e, "failed to initialize search");
            state.error = Some(format!("failed to initialize search: {e}"));
        }
        outcome
    }

    /// Issue a query.
    ///
    /// The query's ticket is taken now, not when the returned future is
    /// first polled, so call order decides which query is newest.
    pub fn search(
        self: &Arc<Self>,
        query: &str,
    ) -> impl Future<Output = QueryOutcome> + Send + 'static {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Arc::clone(self);
        let query = query.to_string();
        async move { session.run(ticket, query).await }
    }

    fn is_latest(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }

    async fn run(&self, ticket: u64, query: String) -> QueryOutcome {
        if query.trim().is_empty() {
            let mut state = self.state();
            if !self.is_latest(ticket) {
                return QueryOutcome::Superseded;
            }
            state.results.clear();
            return QueryOutcome::Applied;
        }

        {
            let mut state = self.state();
            if !self.is_latest(ticket) {
                return QueryOutcome::Superseded;
            }
            state.in_flight += 1;
            state.error = None;
        }
        let running = InFlight(self);

        let service = Arc::clone(&self.service);
        let outcome = tokio::task::spawn_blocking(move || service.search(&query))
            .await
            .map_err(|e| Error::Task(e.to_string()))
            .and_then(|r| r);

        drop(running);
        let mut state = self.state();
        if !self.is_latest(ticket) {
            tracing::debug!(ticket, "dropping superseded search results");
            return QueryOutcome::Superseded;
        }
        match outcome {
            Ok(results) => {
                state.results = results;
                QueryOutcome::Applied
            }
            Err(e) => {
                tracing::warn!(error = %e, "search failed");
                state.results.clear();
                state.error = Some(format!("search failed: {e}"));
                QueryOutcome::Failed
            }
        }
    }

    pub fn results(&self) -> Vec<SearchResult> {
        self.state().results.clone()
    }

    /// Whether any search started by this session is still running.
    pub fn is_searching(&self) -> bool {
        self.state().in_flight > 0
    }

    pub fn is_indexing(&self) -> bool {
        self.state().is_indexing
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn service(&self) -> &SearchService {
        &self.service
    }
}

/// Counts a running search; released even if the search future is
/// dropped before it completes.
struct InFlight<'a>(&'a SearchSession);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.state().in_flight -= 1;
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        self.store.unsubscribe(self.subscription);
    }
}
