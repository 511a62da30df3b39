//! Async host loop for one screen.
//!
//! [`ScreenSession`] owns a reconciler and a data source. It spawns a task
//! per fetch ticket, feeds completions back into the reconciler, and wakes
//! on settled search input and external store changes.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use gridsync_core::{EngineConfig, Page, QueryPatch, ScreenSpec, SourceError};

use crate::reconciler::{FetchTicket, GridReconciler, ResponseOutcome};
use crate::source::DataSource;
use crate::store::QueryStore;
use crate::widget::GridWidget;

struct Completion<T> {
    ticket: FetchTicket,
    result: Result<Page<T>, SourceError>,
}

/// What one [`ScreenSession::step`] processed.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A fetch completed.
    Response { ticket: u64, outcome: ResponseOutcome },
    /// Settled search input or a store change was processed.
    Input,
    /// A quiet period ran out without producing a value.
    Tick,
}

/// A mounted screen with its fetch loop.
pub struct ScreenSession<T, W, S> {
    reconciler: GridReconciler<T, W>,
    source: Arc<S>,
    done_tx: mpsc::UnboundedSender<Completion<T>>,
    done_rx: mpsc::UnboundedReceiver<Completion<T>>,
    tasks: Vec<JoinHandle<()>>,
    in_flight: usize,
}

impl<T, W, S> ScreenSession<T, W, S>
where
    T: Send + 'static,
    W: GridWidget,
    S: DataSource<T> + 'static,
{
    /// Mount a screen on a fresh store and start its initial fetch.
    pub fn open(
        spec: ScreenSpec,
        config: EngineConfig,
        widget: W,
        source: Arc<S>,
        seed: Option<QueryPatch>,
    ) -> Self {
        let spec = spec.with_fallback_limit(config.default_limit);
        let store = Arc::new(QueryStore::new(spec.initial_state()));
        let reconciler = GridReconciler::mount(spec, config, store, widget, seed);
        Self::new(reconciler, source)
    }

    /// Wrap an already mounted reconciler.
    pub fn new(reconciler: GridReconciler<T, W>, source: Arc<S>) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let mut session = Self {
            reconciler,
            source,
            done_tx,
            done_rx,
            tasks: Vec::new(),
            in_flight: 0,
        };
        session.dispatch();
        session
    }

    pub fn reconciler(&self) -> &GridReconciler<T, W> {
        &self.reconciler
    }

    pub fn reconciler_mut(&mut self) -> &mut GridReconciler<T, W> {
        &mut self.reconciler
    }

    /// Fetches started but not yet applied.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Start a task for every fetch the reconciler issued.
    pub fn dispatch(&mut self) -> usize {
        self.tasks.retain(|t| !t.is_finished());

        let tickets = self.reconciler.drain_fetches();
        let count = tickets.len();
        for ticket in tickets {
            let fetch = self.source.fetch_page(ticket.query.clone());
            let tx = self.done_tx.clone();
            self.in_flight += 1;
            self.tasks.push(tokio::spawn(async move {
                let result = fetch.await;
                let _ = tx.send(Completion { ticket, result });
            }));
        }
        count
    }

    /// Wait for and process the next completion or input.
    pub async fn step(&mut self) -> SessionEvent {
        let quiet = self.reconciler.config().debounce();
        let settling = self.reconciler.search_pending();

        let event = tokio::select! {
            Some(done) = self.done_rx.recv() => {
                self.in_flight = self.in_flight.saturating_sub(1);
                let outcome = self.reconciler.apply_response(&done.ticket, done.result);
                tracing::debug!(ticket = done.ticket.id, ?outcome, "fetch completed");
                SessionEvent::Response { ticket: done.ticket.id, outcome }
            }
            _ = self.reconciler.changed() => {
                self.reconciler.pump();
                SessionEvent::Input
            }
            _ = tokio::time::sleep(quiet), if settling => SessionEvent::Tick,
        };

        self.dispatch();
        event
    }

    /// Process everything already queued without waiting.
    pub fn poll(&mut self) {
        self.reconciler.pump();
        self.dispatch();
    }

    /// Drive the session until no fetch is in flight and no search input is
    /// settling.
    pub async fn run_until_idle(&mut self) {
        loop {
            self.poll();
            if self.in_flight == 0 && !self.reconciler.search_pending() {
                break;
            }
            self.step().await;
        }
    }

    /// Await a create/update/delete and refetch the current page if it
    /// succeeded.
    pub async fn mutate<F, R, E>(&mut self, mutation: F) -> Result<R, E>
    where
        F: Future<Output = Result<R, E>>,
    {
        let result = mutation.await;
        if result.is_ok() {
            self.reconciler.invalidate();
            self.dispatch();
        }
        result
    }

    /// Detach the screen and abandon in-flight fetches.
    pub fn unmount(&mut self) {
        self.reconciler.unmount();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        while self.done_rx.try_recv().is_ok() {}
        self.in_flight = 0;
    }
}

impl<T, W, S> Drop for ScreenSession<T, W, S> {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::mock::MockSource;
    use crate::widget::LocalGrid;
    use gridsync_core::{GridEvent, QueryState};
    use std::time::Duration;

    type Session = ScreenSession<String, LocalGrid, MockSource>;

    fn spec() -> ScreenSpec {
        ScreenSpec::new("items", "items").search("search", Some("name"))
    }

    fn open(source: &Arc<MockSource>) -> Session {
        ScreenSession::open(
            spec(),
            EngineConfig::default(),
            LocalGrid::new(),
            Arc::clone(source),
            None,
        )
    }

    fn searched(text: &str) -> QueryState {
        QueryState::with_limit(10).merged(&QueryPatch::new().filter("search", text))
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_and_reset_end_to_end() {
        let source = Arc::new(MockSource::new([
            "Red shirt",
            "Blue shirt",
            "Boots",
            "Scarf",
        ]));
        let mut session = open(&source);
        session.run_until_idle().await;
        assert_eq!(session.reconciler().rows().len(), 4);

        session.reconciler_mut().search_input("shirt");
        session.run_until_idle().await;

        assert_eq!(session.reconciler().rows(), ["Red shirt", "Blue shirt"]);
        assert_eq!(session.reconciler().meta().map(|m| m.total), Some(2));

        session.reconciler_mut().reset_all();
        session.run_until_idle().await;

        assert_eq!(session.reconciler().rows().len(), 4);
        assert_eq!(session.reconciler().search_text(), "");
        assert_eq!(
            source.calls(),
            vec![QueryState::with_limit(10), searched("shirt"), QueryState::with_limit(10)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stale_response_never_wins() {
        let source = Arc::new(
            MockSource::new(["foo 1", "bar 1", "bar 2"]).with_delay_fn(|q| {
                match q.filter("search").and_then(|v| v.as_text()) {
                    Some("foo") => Duration::from_millis(500),
                    _ => Duration::from_millis(50),
                }
            }),
        );
        let mut session = open(&source);
        session.run_until_idle().await;

        session.reconciler_mut().search_input("foo");
        tokio::time::sleep(Duration::from_millis(301)).await;
        session.poll();
        assert_eq!(session.in_flight(), 1);

        session.reconciler_mut().search_input("bar");
        tokio::time::sleep(Duration::from_millis(301)).await;
        session.poll();
        assert_eq!(session.in_flight(), 2);

        let mut outcomes = Vec::new();
        while session.in_flight() > 0 {
            if let SessionEvent::Response { outcome, .. } = session.step().await {
                outcomes.push(outcome);
            }
        }

        assert_eq!(outcomes, vec![ResponseOutcome::Applied, ResponseOutcome::Stale]);
        assert_eq!(session.reconciler().rows(), ["bar 1", "bar 2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clamp_end_to_end() {
        let source = Arc::new(MockSource::numbered(25));
        let mut session = open(&source);
        session.run_until_idle().await;

        let event = session
            .reconciler_mut()
            .widget_mut()
            .apply(GridEvent::PageIndexChanged(4));
        session.reconciler_mut().handle_grid_event(event);
        session.run_until_idle().await;

        let pages: Vec<u32> = source.calls().iter().map(|q| q.pagination.page).collect();
        assert_eq!(pages, vec![1, 5, 3]);
        assert_eq!(session.reconciler().meta().map(|m| m.page), Some(3));
        assert_eq!(session.reconciler().rows(), ["item 21", "item 22", "item 23", "item 24", "item 25"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutate_invalidates_on_success_only() {
        let source = Arc::new(MockSource::numbered(3));
        let mut session = open(&source);
        session.run_until_idle().await;

        source.rows.lock().push("item 4".to_string());
        let created = session.mutate(async { Ok::<_, SourceError>(4_u64) }).await;
        assert_eq!(created, Ok(4));
        session.run_until_idle().await;
        assert_eq!(source.calls().len(), 2);
        assert_eq!(session.reconciler().rows().len(), 4);

        let failed = session
            .mutate(async {
                Err::<(), _>(SourceError::Status {
                    code: 422,
                    message: "name is required".to_string(),
                })
            })
            .await;
        assert!(failed.is_err());
        session.run_until_idle().await;
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_then_retry() {
        let source = Arc::new(MockSource::numbered(3));
        source.fail_next();
        let mut session = open(&source);
        session.run_until_idle().await;

        assert!(session.reconciler().error().is_some());
        assert!(session.reconciler().rows().is_empty());

        session.reconciler_mut().retry();
        session.run_until_idle().await;
        assert!(session.reconciler().error().is_none());
        assert_eq!(session.reconciler().rows().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_returning_to_settled_value_goes_idle() {
        let source = Arc::new(MockSource::numbered(3));
        let mut session = open(&source);
        session.run_until_idle().await;

        session.reconciler_mut().search_input("item");
        session.reconciler_mut().search_input("");
        session.run_until_idle().await;

        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_page_size() {
        let source = Arc::new(MockSource::numbered(60));
        let config = EngineConfig {
            default_limit: 25,
            ..EngineConfig::default()
        };
        let mut session =
            ScreenSession::open(spec(), config.clone(), LocalGrid::new(), Arc::clone(&source), None);
        session.run_until_idle().await;
        assert_eq!(session.reconciler().rows().len(), 25);
        assert_eq!(session.reconciler().widget().pagination().page_size, 25);

        session.reconciler_mut().reset_all();
        session.run_until_idle().await;

        let limits: Vec<u32> = source.calls().iter().map(|q| q.pagination.limit).collect();
        assert_eq!(limits, vec![25, 25]);

        // A screen with its own page size keeps it.
        let source = Arc::new(MockSource::numbered(60));
        let mut session = ScreenSession::open(
            spec().default_limit(5),
            config,
            LocalGrid::new(),
            Arc::clone(&source),
            None,
        );
        session.run_until_idle().await;
        assert_eq!(source.calls()[0].pagination.limit, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_drops_in_flight() {
        let source = Arc::new(MockSource::numbered(3).with_delay(Duration::from_millis(200)));
        let mut session = open(&source);
        assert_eq!(session.in_flight(), 1);

        session.unmount();
        tokio::time::sleep(Duration::from_millis(500)).await;
        session.poll();

        assert_eq!(session.in_flight(), 0);
        assert!(session.reconciler().rows().is_empty());
        assert!(!session.reconciler().is_mounted());
    }
}
