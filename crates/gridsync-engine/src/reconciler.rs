//! Grid reconciler: two-way sync between a grid widget and the query store.
//!
//! Widget events become store patches; store changes the reconciler did not
//! cause are written back into the widget. Every effective store change
//! produces one fetch ticket. The host dispatches tickets to a
//! [`DataSource`](crate::DataSource) and hands each result back through
//! [`GridReconciler::apply_response`].
//!
//! ## Feedback guard
//!
//! After each of its own pushes the reconciler records the committed
//! revision and state. An observed change that matches that record is its own
//! echo and is not written back. Anything else is external (reset, seed,
//! another component) and is written back into the widget.
//!
//! ## Stale responses
//!
//! A response is applied only if the parameters it was fetched with still
//! equal the store's current state. Arrival order does not matter.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use gridsync_core::{
    ColumnFilter, EngineConfig, FilterValue, GridEvent, GridPagination, Page, PaginationMeta,
    QueryPatch, QueryState, ScreenSpec, SourceError, SyncError,
};

use crate::debounce::DebouncedText;
use crate::store::{ChangeOrigin, QueryChange, QueryStore};
use crate::widget::GridWidget;

// =============================================================================
// Types
// =============================================================================

/// Where the reconciler is in its edit/fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Rows match the store.
    Idle,
    /// A widget or search edit is being translated or is still settling.
    UserEditing,
    /// A fetch for the current state is outstanding.
    Pending,
    /// A reset or external change arrived while a fetch was outstanding.
    ExternalReset,
}

/// One requested fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub id: u64,
    /// Store revision the query was taken from.
    pub revision: u64,
    pub query: QueryState,
}

/// Result of handing a widget event or search input to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The store changed and a fetch was issued.
    Pushed,
    /// The value already matched the store.
    Unchanged,
    /// Search input recorded; it reaches the store once it settles.
    Debounced,
    /// Presentation-only change, or a column with no server filter.
    LocalOnly,
    /// The value was outside the filter's domain and was dropped.
    Rejected(SyncError),
    /// The screen is unmounted.
    Ignored,
}

/// Result of applying a fetch response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// Rows and pagination applied.
    Applied,
    /// The requested page was past the end. Rows were not applied and one
    /// corrective fetch was issued for `page`.
    Clamped { requested: u32, page: u32 },
    /// The fetch failed; the error flag is set and state is untouched.
    Failed,
    /// The response no longer matches the store and was dropped.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchSource {
    Toolbar,
    Column,
}

#[derive(Debug, Clone)]
struct PushToken {
    revision: u64,
    state: QueryState,
}

// =============================================================================
// GridReconciler
// =============================================================================

/// Keeps one grid widget, one search box and one [`QueryStore`] consistent.
pub struct GridReconciler<T, W> {
    spec: ScreenSpec,
    config: EngineConfig,
    store: Arc<QueryStore>,
    changes: watch::Receiver<QueryChange>,
    widget: W,

    search: DebouncedText,
    settled_rx: mpsc::UnboundedReceiver<String>,
    pending_settled: VecDeque<String>,
    search_source: SearchSource,

    phase: SyncPhase,
    last_pushed: Option<PushToken>,
    seen_revision: u64,

    next_ticket: u64,
    current_ticket: Option<u64>,
    applied_ticket: u64,
    outbox: Vec<FetchTicket>,

    rows: Vec<T>,
    meta: Option<PaginationMeta>,
    error: Option<SyncError>,

    originated: u64,
    mounted: bool,
}

impl<T, W: GridWidget> GridReconciler<T, W> {
    /// Attach to a screen.
    ///
    /// `seed` is an optional filter preset from another screen. It is merged
    /// once, written into the widget and the search box, and recorded as the
    /// guard snapshot. Issues the initial fetch.
    pub fn mount(
        spec: ScreenSpec,
        config: EngineConfig,
        store: Arc<QueryStore>,
        widget: W,
        seed: Option<QueryPatch>,
    ) -> Self {
        let spec = spec.with_fallback_limit(config.default_limit);
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        let search = DebouncedText::new(config.debounce());
        search.on_settled(move |value| {
            let _ = settled_tx.send(value.to_string());
        });

        if let Some(seed) = seed.filter(|s| !s.is_empty()) {
            tracing::debug!(screen = %spec.name, "applying cross-screen seed");
            store.merge(&seed, ChangeOrigin::Seed);
        }

        let changes = store.subscribe();
        let (revision, state) = store.snapshot();

        let mut reconciler = Self {
            spec,
            config,
            store,
            changes,
            widget,
            search,
            settled_rx,
            pending_settled: VecDeque::new(),
            search_source: SearchSource::Toolbar,
            phase: SyncPhase::Idle,
            last_pushed: None,
            seen_revision: revision,
            next_ticket: 0,
            current_ticket: None,
            applied_ticket: 0,
            outbox: Vec::new(),
            rows: Vec::new(),
            meta: None,
            error: None,
            originated: 0,
            mounted: true,
        };

        reconciler.write_back(&state);
        reconciler.last_pushed = Some(PushToken {
            revision,
            state: state.clone(),
        });
        reconciler.issue_fetch(revision, state);

        tracing::info!(screen = %reconciler.spec.name, "screen mounted");
        reconciler
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn spec(&self) -> &ScreenSpec {
        &self.spec
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<QueryStore> {
        &self.store
    }

    /// Current query.
    pub fn query(&self) -> QueryState {
        self.store.get()
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    /// Mutable widget access for applying user interactions. Imperative
    /// writes made through this handle are not seen by the reconciler.
    pub fn widget_mut(&mut self) -> &mut W {
        &mut self.widget
    }

    /// Rows of the last applied page.
    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    /// Server pagination of the last applied page.
    pub fn meta(&self) -> Option<&PaginationMeta> {
        self.meta.as_ref()
    }

    /// Error of the last failed fetch, cleared by the next successful one.
    pub fn error(&self) -> Option<&SyncError> {
        self.error.as_ref()
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Whether a fetch for the current state is outstanding.
    pub fn is_loading(&self) -> bool {
        self.current_ticket.is_some()
    }

    /// Whether any filter is applied.
    pub fn is_filtered(&self) -> bool {
        self.store.with_state(QueryState::is_filtered)
    }

    /// Text shown in the search box.
    pub fn search_text(&self) -> String {
        self.search.raw()
    }

    /// Whether search input is still inside its quiet period.
    pub fn search_pending(&self) -> bool {
        self.search.is_pending()
    }

    /// Store mutations caused by widget events or search input.
    pub fn originated_mutations(&self) -> u64 {
        self.originated
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Take the fetches issued since the last call.
    pub fn drain_fetches(&mut self) -> Vec<FetchTicket> {
        std::mem::take(&mut self.outbox)
    }

    // =========================================================================
    // Widget -> Store
    // =========================================================================

    /// Record toolbar search input.
    pub fn search_input(&mut self, raw: impl Into<String>) -> EventOutcome {
        if !self.mounted {
            return EventOutcome::Ignored;
        }
        let raw = raw.into();
        if raw == self.search.raw() {
            return EventOutcome::Unchanged;
        }
        self.search_source = SearchSource::Toolbar;
        self.phase = SyncPhase::UserEditing;
        self.search.update(raw);
        EventOutcome::Debounced
    }

    /// Translate a change the widget reported after updating itself.
    pub fn handle_grid_event(&mut self, event: GridEvent) -> EventOutcome {
        if !self.mounted {
            return EventOutcome::Ignored;
        }

        let current = self.store.get();
        let patch = match event {
            GridEvent::ColumnFilterChanged { column, value } => {
                if self.spec.is_search_column(&column) {
                    return self.column_search_input(value);
                }

                let Some(binding) = self.spec.binding_for_column(&column) else {
                    tracing::debug!(%column, "column has no server filter");
                    return EventOutcome::LocalOnly;
                };

                let parsed = match &value {
                    Some(filter) => binding.domain.parse(&binding.key, filter),
                    None => Ok(None),
                };
                let next = match parsed {
                    Ok(next) => next,
                    Err(err) => {
                        tracing::warn!(
                            screen = %self.spec.name,
                            %column,
                            error = %err,
                            "dropping invalid filter value"
                        );
                        // Put the column back to what the store holds.
                        let restored = current
                            .filter(binding.key.as_ref())
                            .map(|v| binding.domain.render(v));
                        self.widget.set_column_filter(&column, restored);
                        return EventOutcome::Rejected(err);
                    }
                };

                if current.filter(binding.key.as_ref()) == next.as_ref() {
                    return EventOutcome::Unchanged;
                }

                let patch = QueryPatch::new().set_filter(binding.key.clone(), next);
                if self.config.reset_page_on_filter_change {
                    patch.page(1)
                } else {
                    patch
                }
            }

            GridEvent::SortingChanged(sorting) => {
                let next = match &sorting {
                    None => None,
                    Some(column_sort) => match self.spec.sort_for(column_sort) {
                        Some(sort) => Some(sort),
                        None => {
                            let err = SyncError::InvalidFilterValue {
                                key: "sort".to_string(),
                                value: column_sort.column.clone(),
                                expected: format!(
                                    "one of [{}]",
                                    self.spec
                                        .sort_fields
                                        .keys()
                                        .cloned()
                                        .collect::<Vec<_>>()
                                        .join(", ")
                                ),
                            };
                            tracing::warn!(
                                screen = %self.spec.name,
                                error = %err,
                                "dropping sort on unsortable column"
                            );
                            let restored = current
                                .sort
                                .as_ref()
                                .and_then(|s| self.spec.column_sort_for(s));
                            self.widget.set_sorting(restored);
                            return EventOutcome::Rejected(err);
                        }
                    },
                };

                if current.sort == next {
                    return EventOutcome::Unchanged;
                }
                match next {
                    Some(sort) => QueryPatch::new().sort(sort),
                    None => QueryPatch::new().clear_sort(),
                }
            }

            GridEvent::PageIndexChanged(index) => {
                let page = index.saturating_add(1);
                if current.pagination.page == page {
                    return EventOutcome::Unchanged;
                }
                QueryPatch::new().page(page)
            }

            GridEvent::PageSizeChanged(size) => {
                if current.pagination.limit == size.max(1) {
                    return EventOutcome::Unchanged;
                }
                QueryPatch::new().limit(size).page(1)
            }

            GridEvent::VisibilityChanged { .. } | GridEvent::SelectionChanged(_) => {
                return EventOutcome::LocalOnly;
            }
        };

        self.phase = SyncPhase::UserEditing;
        self.push(patch)
    }

    fn column_search_input(&mut self, value: Option<ColumnFilter>) -> EventOutcome {
        let text = value
            .map(|filter| filter.raw_values().join(" "))
            .unwrap_or_default();
        // Also catches the widget echoing a value we mirrored into it.
        if text == self.search.raw() {
            return EventOutcome::Unchanged;
        }
        self.search_source = SearchSource::Column;
        self.phase = SyncPhase::UserEditing;
        self.search.update(text);
        EventOutcome::Debounced
    }

    fn apply_settled_search(&mut self, value: String) -> EventOutcome {
        // Mirror into whichever input was not live.
        if self.search_source == SearchSource::Toolbar {
            if let Some(column) = &self.spec.search_column {
                let mirrored = (!value.is_empty()).then(|| ColumnFilter::Text(value.clone()));
                if self.widget.column_filter(column) != mirrored {
                    self.widget.set_column_filter(column, mirrored);
                }
            }
        }

        let next = (!value.is_empty()).then(|| FilterValue::from(value));
        let unchanged = self
            .store
            .with_state(|s| s.filter(self.spec.search_key.as_ref()) == next.as_ref());
        if unchanged {
            self.settle_phase();
            return EventOutcome::Unchanged;
        }

        let patch = QueryPatch::new().set_filter(self.spec.search_key.clone(), next);
        let patch = if self.config.reset_page_on_filter_change {
            patch.page(1)
        } else {
            patch
        };
        self.push(patch)
    }

    fn push(&mut self, patch: QueryPatch) -> EventOutcome {
        // A foreign change committed since the last pump would be hidden
        // behind our own revision, so take it first.
        let foreign = self.observe_store();

        match self.store.merge(&patch, ChangeOrigin::Reconciler) {
            Some(change) => {
                self.originated += 1;
                if foreign {
                    // The writeback above reverted the edit being pushed.
                    self.write_back(&change.state);
                }
                self.last_pushed = Some(PushToken {
                    revision: change.revision,
                    state: change.state,
                });
                self.observe_store();
                EventOutcome::Pushed
            }
            None => {
                self.settle_phase();
                EventOutcome::Unchanged
            }
        }
    }

    // =========================================================================
    // Store -> Widget
    // =========================================================================

    /// Process settled search input and store changes.
    ///
    /// Returns whether anything was processed. Hosts call this after
    /// [`changed`](Self::changed) wakes, or on their own tick.
    pub fn pump(&mut self) -> bool {
        if !self.mounted {
            return false;
        }

        while let Ok(value) = self.settled_rx.try_recv() {
            self.pending_settled.push_back(value);
        }

        let mut progressed = false;
        while let Some(value) = self.pending_settled.pop_front() {
            self.apply_settled_search(value);
            progressed = true;
        }

        self.observe_store() || progressed
    }

    /// Wait until settled search input or a store change is ready for
    /// [`pump`](Self::pump).
    pub async fn changed(&mut self) {
        tokio::select! {
            Some(value) = self.settled_rx.recv() => self.pending_settled.push_back(value),
            Ok(()) = self.changes.changed() => {}
            else => {}
        }
    }

    fn observe_store(&mut self) -> bool {
        let change = {
            let latest = self.changes.borrow_and_update();
            if latest.revision <= self.seen_revision {
                return false;
            }
            latest.clone()
        };
        self.seen_revision = change.revision;

        let own = self
            .last_pushed
            .as_ref()
            .is_some_and(|t| t.revision == change.revision && t.state == change.state);

        let was_pending = self.current_ticket.is_some();
        if own {
            tracing::trace!(revision = change.revision, "own change observed");
        } else {
            tracing::debug!(
                screen = %self.spec.name,
                revision = change.revision,
                origin = ?change.origin,
                "external query change, writing back"
            );
            self.write_back(&change.state);
        }

        self.issue_fetch(change.revision, change.state);
        if !own && was_pending {
            self.phase = SyncPhase::ExternalReset;
        }
        true
    }

    fn write_back(&mut self, state: &QueryState) {
        for binding in &self.spec.bindings {
            let desired = state
                .filter(binding.key.as_ref())
                .map(|v| binding.domain.render(v));
            if self.widget.column_filter(&binding.column) != desired {
                self.widget.set_column_filter(&binding.column, desired);
            }
        }

        // Only touch the search inputs when the store disagrees with the
        // last settled value, so typing ahead is not clobbered.
        let search = state
            .filter(self.spec.search_key.as_ref())
            .map(FilterValue::to_param)
            .unwrap_or_default();
        if search != self.search.settled() {
            self.search.set_silently(search.clone());
            if let Some(column) = &self.spec.search_column {
                let desired = (!search.is_empty()).then(|| ColumnFilter::Text(search));
                if self.widget.column_filter(column) != desired {
                    self.widget.set_column_filter(column, desired);
                }
            }
        }

        let sorting = state
            .sort
            .as_ref()
            .and_then(|s| self.spec.column_sort_for(s));
        if self.widget.sorting() != sorting {
            self.widget.set_sorting(sorting);
        }

        let pagination = GridPagination::from(state.pagination);
        if self.widget.pagination() != pagination {
            self.widget.set_pagination(pagination);
        }
    }

    // =========================================================================
    // Reset / Refetch
    // =========================================================================

    /// Return the screen to its defaults with exactly one fetch.
    pub fn reset_all(&mut self) {
        if !self.mounted {
            return;
        }
        let was_pending = self.current_ticket.is_some();
        self.observe_store();
        let defaults = self.spec.initial_state();

        // Widgets and search first, so nothing queued can re-apply an old value.
        self.widget.reset_column_filters();
        let sorting = defaults
            .sort
            .as_ref()
            .and_then(|s| self.spec.column_sort_for(s));
        self.widget.set_sorting(sorting);
        self.widget
            .set_pagination(GridPagination::from(defaults.pagination));

        self.search.clear();
        self.search_source = SearchSource::Toolbar;
        self.pending_settled.clear();
        while self.settled_rx.try_recv().is_ok() {}

        match self.store.replace(defaults, ChangeOrigin::Reset) {
            Some(change) => {
                self.last_pushed = Some(PushToken {
                    revision: change.revision,
                    state: change.state,
                });
                self.observe_store();
            }
            None => {
                tracing::debug!(screen = %self.spec.name, "already at defaults, refetching");
                self.refetch();
            }
        }

        if was_pending {
            self.phase = SyncPhase::ExternalReset;
        }
        tracing::info!(screen = %self.spec.name, "filters reset");
    }

    /// Re-issue the current query after a failed fetch.
    pub fn retry(&mut self) {
        if !self.mounted {
            return;
        }
        tracing::info!(screen = %self.spec.name, "retrying fetch");
        self.refetch();
    }

    /// Refetch the current query after the underlying data changed.
    pub fn invalidate(&mut self) {
        if !self.mounted {
            return;
        }
        tracing::debug!(screen = %self.spec.name, "data invalidated");
        self.refetch();
    }

    fn refetch(&mut self) {
        // Pick up anything not yet observed so the revision stays in step.
        if self.observe_store() {
            return;
        }
        let (revision, state) = self.store.snapshot();
        self.issue_fetch(revision, state);
    }

    fn issue_fetch(&mut self, revision: u64, query: QueryState) {
        self.next_ticket += 1;
        let ticket = FetchTicket {
            id: self.next_ticket,
            revision,
            query,
        };
        tracing::debug!(
            screen = %self.spec.name,
            ticket = ticket.id,
            revision,
            "fetch issued"
        );

        // An undispatched older ticket is stale already.
        self.outbox.clear();
        self.outbox.push(ticket);
        self.current_ticket = Some(self.next_ticket);
        self.phase = SyncPhase::Pending;
    }

    fn settle_phase(&mut self) {
        self.phase = if self.current_ticket.is_some() {
            SyncPhase::Pending
        } else {
            SyncPhase::Idle
        };
    }

    // =========================================================================
    // Responses
    // =========================================================================

    /// Apply the result of a dispatched fetch.
    pub fn apply_response(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Page<T>, SourceError>,
    ) -> ResponseOutcome {
        let current = self.store.get();
        if !self.mounted || ticket.query != current || ticket.id < self.applied_ticket {
            let err = SyncError::StaleResponse { ticket: ticket.id };
            tracing::debug!(screen = %self.spec.name, "{}", err);
            return ResponseOutcome::Stale;
        }

        if self.current_ticket.is_some_and(|id| id <= ticket.id) {
            self.current_ticket = None;
        }

        let page = match result {
            Ok(page) => page,
            Err(source) => {
                let err = SyncError::FetchFailed(source);
                tracing::warn!(screen = %self.spec.name, error = %err, "fetch failed");
                self.error = Some(err);
                self.settle_phase();
                return ResponseOutcome::Failed;
            }
        };

        let requested = current.pagination.page;
        if let Some(last) = page.meta.clamp_target(requested) {
            tracing::debug!(
                screen = %self.spec.name,
                requested,
                last,
                "requested page past the end, clamping"
            );
            self.widget.set_pagination(GridPagination {
                page_index: last - 1,
                page_size: current.pagination.limit,
            });
            self.push(QueryPatch::new().page(last));
            return ResponseOutcome::Clamped {
                requested,
                page: last,
            };
        }

        self.rows = page.rows;
        self.meta = Some(page.meta);
        self.error = None;
        self.applied_ticket = ticket.id;
        self.settle_phase();
        ResponseOutcome::Applied
    }

    /// Detach from the screen. Pending search input never settles and
    /// in-flight responses are ignored.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        self.search.cancel();
        self.pending_settled.clear();
        while self.settled_rx.try_recv().is_ok() {}
        self.outbox.clear();
        self.current_ticket = None;
        self.phase = SyncPhase::Idle;
        tracing::info!(screen = %self.spec.name, "screen unmounted");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::LocalGrid;
    use gridsync_core::{ColumnSort, FilterDomain, Pagination, Sort};
    use std::time::Duration;

    type Reconciler = GridReconciler<String, LocalGrid>;

    fn items_spec() -> ScreenSpec {
        ScreenSpec::new("items", "items")
            .search("search", Some("name"))
            .bind("available", "available", FilterDomain::Boolean)
            .bind(
                "sub_category",
                "sub_category_id",
                FilterDomain::Integer { multi: true },
            )
            .bind(
                "status",
                "status",
                FilterDomain::Choice {
                    options: vec!["active".to_string(), "archived".to_string()],
                    multi: false,
                },
            )
            .sortable("name", "name")
            .sortable("price", "price")
    }

    fn mount_with(grid: LocalGrid, config: EngineConfig, seed: Option<QueryPatch>) -> Reconciler {
        let spec = items_spec();
        let store = Arc::new(QueryStore::new(spec.initial_state()));
        GridReconciler::mount(spec, config, store, grid, seed)
    }

    fn mount() -> Reconciler {
        mount_with(LocalGrid::new(), EngineConfig::default(), None)
    }

    /// Apply a user interaction to the grid and hand the event over.
    fn user(rec: &mut Reconciler, event: GridEvent) -> EventOutcome {
        let event = rec.widget_mut().apply(event);
        rec.handle_grid_event(event)
    }

    fn respond(rec: &mut Reconciler, ticket: &FetchTicket, rows: &[&str], total: u64) -> ResponseOutcome {
        let page = Page::new(
            rows.iter().map(|r| r.to_string()).collect(),
            PaginationMeta::from_total(ticket.query.pagination, total),
        );
        rec.apply_response(ticket, Ok(page))
    }

    fn settle(rec: &mut Reconciler, total: u64) {
        for ticket in rec.drain_fetches() {
            respond(rec, &ticket, &["row"], total);
        }
    }

    fn single_fetch(rec: &mut Reconciler) -> FetchTicket {
        let mut fetches = rec.drain_fetches();
        assert_eq!(fetches.len(), 1, "expected exactly one fetch");
        fetches.remove(0)
    }

    async fn wait_quiet() {
        tokio::time::sleep(Duration::from_millis(301)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_issues_initial_fetch() {
        let mut rec = mount();
        assert_eq!(rec.phase(), SyncPhase::Pending);

        let ticket = single_fetch(&mut rec);
        assert_eq!(ticket.query, items_spec().initial_state());

        assert_eq!(respond(&mut rec, &ticket, &["a", "b"], 2), ResponseOutcome::Applied);
        assert_eq!(rec.phase(), SyncPhase::Idle);
        assert_eq!(rec.rows(), ["a", "b"]);
        assert_eq!(rec.meta().map(|m| m.total), Some(2));
        assert!(!rec.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_then_reset_scenario() {
        let mut rec = mount();
        settle(&mut rec, 42);

        for prefix in ["s", "sh", "shi", "shir", "shirt"] {
            assert_eq!(rec.search_input(prefix), EventOutcome::Debounced);
            tokio::time::sleep(Duration::from_millis(50)).await;
            rec.pump();
        }
        assert_eq!(rec.search_text(), "shirt");
        assert!(rec.drain_fetches().is_empty());

        wait_quiet().await;
        assert!(rec.pump());

        let ticket = single_fetch(&mut rec);
        let expected = QueryState::with_limit(10).merged(&QueryPatch::new().filter("search", "shirt"));
        assert_eq!(ticket.query, expected);
        assert_eq!(rec.query(), expected);
        assert_eq!(respond(&mut rec, &ticket, &["Red shirt"], 1), ResponseOutcome::Applied);

        // Toolbar was live, so the name column mirrors the settled text.
        assert_eq!(
            rec.widget().column_filter("name"),
            Some(ColumnFilter::Text("shirt".to_string()))
        );
        assert!(rec.is_filtered());

        rec.reset_all();
        assert_eq!(rec.query(), items_spec().initial_state());
        assert_eq!(rec.search_text(), "");
        assert_eq!(rec.widget().column_filter("name"), None);
        assert!(!rec.is_filtered());
        single_fetch(&mut rec);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_after_mixed_edits_fetches_once() {
        let mut rec = mount();
        settle(&mut rec, 100);

        user(&mut rec, GridEvent::filter("available", ColumnFilter::values(["true"])));
        user(&mut rec, GridEvent::SortingChanged(Some(ColumnSort::desc("price"))));
        user(&mut rec, GridEvent::PageIndexChanged(3));
        rec.search_input("boo");
        rec.drain_fetches();

        rec.reset_all();
        assert_eq!(rec.query(), items_spec().initial_state());
        single_fetch(&mut rec);

        // The search input cut off by the reset never lands.
        wait_quiet().await;
        rec.pump();
        assert!(rec.drain_fetches().is_empty());
        assert_eq!(rec.query(), items_spec().initial_state());

        let grid = rec.widget().state();
        assert!(grid.column_filters.is_empty());
        assert_eq!(grid.sorting, None);
        assert_eq!(grid.pagination.page_index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_at_defaults_still_fetches_once() {
        let mut rec = mount();
        settle(&mut rec, 5);

        rec.reset_all();
        let ticket = single_fetch(&mut rec);
        assert_eq!(ticket.query, items_spec().initial_state());

        rec.reset_all();
        single_fetch(&mut rec);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_changes_do_not_feed_back() {
        let mut rec = mount_with(LocalGrid::new().echoing(), EngineConfig::default(), None);
        settle(&mut rec, 100);
        rec.widget_mut().take_echoes();
        let store = Arc::clone(rec.store());

        let patches = vec![
            QueryPatch::new().filter("available", true),
            QueryPatch::new().filter("sub_category_id", FilterValue::set([3_i64, 7])),
            QueryPatch::new().sort(Sort::desc("price")),
            QueryPatch::new().page(4),
            QueryPatch::new().filter("search", "boots"),
            QueryPatch::new().clear_filter("available").filter("status", "archived"),
        ];

        for patch in patches {
            assert!(store.merge(&patch, ChangeOrigin::External).is_some());
            rec.pump();

            let echoes = rec.widget_mut().take_echoes();
            assert!(!echoes.is_empty());
            for echo in echoes {
                assert_eq!(rec.handle_grid_event(echo), EventOutcome::Unchanged);
            }
            rec.pump();
            single_fetch(&mut rec);
        }

        assert_eq!(rec.originated_mutations(), 0);
        assert_eq!(rec.search_text(), "boots");
        assert_eq!(
            rec.widget().column_filter("sub_category"),
            Some(ColumnFilter::values(["3", "7"]))
        );
        assert_eq!(rec.widget().sorting(), Some(ColumnSort::desc("price")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_changes_are_isolated() {
        let mut rec = mount();
        settle(&mut rec, 100);

        user(&mut rec, GridEvent::filter("status", ColumnFilter::values(["active"])));
        user(&mut rec, GridEvent::filter("sub_category", ColumnFilter::values(["5"])));
        let query = rec.query();
        assert_eq!(query.filter("status"), Some(&FilterValue::from("active")));
        assert_eq!(query.filter("sub_category_id"), Some(&FilterValue::set([5_i64])));

        user(&mut rec, GridEvent::clear_filter("status"));
        let query = rec.query();
        assert!(query.filter("status").is_none());
        assert_eq!(query.filter("sub_category_id"), Some(&FilterValue::set([5_i64])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_past_end_is_clamped() {
        let mut rec = mount();
        settle(&mut rec, 30);

        assert_eq!(user(&mut rec, GridEvent::PageIndexChanged(4)), EventOutcome::Pushed);
        let ticket = single_fetch(&mut rec);
        assert_eq!(ticket.query.pagination.page, 5);

        let outcome = respond(&mut rec, &ticket, &[], 30);
        assert_eq!(outcome, ResponseOutcome::Clamped { requested: 5, page: 3 });
        assert_eq!(rec.widget().pagination().page_index, 2);
        assert_eq!(rec.meta().map(|m| m.page), Some(1));

        let corrective = single_fetch(&mut rec);
        assert_eq!(corrective.query.pagination, Pagination::new(3, 10));
        assert_eq!(respond(&mut rec, &corrective, &["x"], 30), ResponseOutcome::Applied);
        assert_eq!(rec.meta().map(|m| m.page), Some(3));
        assert!(rec.drain_fetches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_clamps_to_first_page() {
        let mut rec = mount();
        settle(&mut rec, 30);

        user(&mut rec, GridEvent::PageIndexChanged(1));
        let ticket = single_fetch(&mut rec);
        let outcome = respond(&mut rec, &ticket, &[], 0);
        assert_eq!(outcome, ResponseOutcome::Clamped { requested: 2, page: 1 });
        assert_eq!(single_fetch(&mut rec).query.pagination.page, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_is_dropped() {
        let mut rec = mount();
        settle(&mut rec, 100);

        rec.search_input("foo");
        wait_quiet().await;
        rec.pump();
        let a = single_fetch(&mut rec);

        rec.search_input("bar");
        wait_quiet().await;
        rec.pump();
        let b = single_fetch(&mut rec);

        assert_eq!(respond(&mut rec, &b, &["bar 1"], 1), ResponseOutcome::Applied);
        assert_eq!(respond(&mut rec, &a, &["foo 1"], 1), ResponseOutcome::Stale);
        assert_eq!(rec.rows(), ["bar 1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_arriving_first_is_dropped() {
        let mut rec = mount();
        settle(&mut rec, 100);

        rec.search_input("foo");
        wait_quiet().await;
        rec.pump();
        let a = single_fetch(&mut rec);

        rec.search_input("bar");
        wait_quiet().await;
        rec.pump();
        let b = single_fetch(&mut rec);

        assert_eq!(respond(&mut rec, &a, &["foo 1"], 1), ResponseOutcome::Stale);
        assert!(rec.is_loading());
        assert_eq!(respond(&mut rec, &b, &["bar 1"], 1), ResponseOutcome::Applied);
        assert_eq!(rec.rows(), ["bar 1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_value_is_dropped() {
        let mut rec = mount();
        settle(&mut rec, 100);

        let outcome = user(&mut rec, GridEvent::filter("available", ColumnFilter::values(["maybe"])));
        assert!(matches!(
            outcome,
            EventOutcome::Rejected(SyncError::InvalidFilterValue { .. })
        ));
        assert!(rec.drain_fetches().is_empty());
        assert_eq!(rec.query(), items_spec().initial_state());

        let outcome = user(&mut rec, GridEvent::SortingChanged(Some(ColumnSort::asc("stock"))));
        assert!(matches!(outcome, EventOutcome::Rejected(_)));
        assert!(rec.drain_fetches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_value_restores_column() {
        let mut rec = mount();
        settle(&mut rec, 100);

        user(&mut rec, GridEvent::filter("available", ColumnFilter::values(["true"])));
        settle(&mut rec, 100);

        let outcome = user(&mut rec, GridEvent::filter("available", ColumnFilter::values(["maybe"])));
        assert!(matches!(outcome, EventOutcome::Rejected(_)));
        assert_eq!(
            rec.widget().column_filter("available"),
            Some(ColumnFilter::values(["true"]))
        );

        user(&mut rec, GridEvent::filter("status", ColumnFilter::values(["deleted"])));
        assert_eq!(rec.widget().column_filter("status"), None);

        user(&mut rec, GridEvent::SortingChanged(Some(ColumnSort::asc("stock"))));
        assert_eq!(rec.widget().sorting(), None);
        assert!(rec.drain_fetches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpumped_external_change_survives_user_edit() {
        let mut rec = mount();
        settle(&mut rec, 100);
        let store = Arc::clone(rec.store());

        store.merge(&QueryPatch::new().filter("status", "active"), ChangeOrigin::External);
        assert_eq!(
            user(&mut rec, GridEvent::filter("available", ColumnFilter::values(["true"]))),
            EventOutcome::Pushed
        );
        rec.pump();

        let query = rec.query();
        assert_eq!(query.filter("status"), Some(&FilterValue::from("active")));
        assert_eq!(query.filter("available"), Some(&FilterValue::from(true)));
        assert_eq!(
            rec.widget().column_filter("status"),
            Some(ColumnFilter::values(["active"]))
        );
        assert_eq!(
            rec.widget().column_filter("available"),
            Some(ColumnFilter::values(["true"]))
        );

        let ticket = single_fetch(&mut rec);
        assert_eq!(ticket.query, query);
        assert_eq!(rec.originated_mutations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpumped_external_change_before_reset() {
        let mut rec = mount();
        settle(&mut rec, 100);
        let store = Arc::clone(rec.store());

        store.merge(&QueryPatch::new().filter("status", "active"), ChangeOrigin::External);
        rec.reset_all();
        rec.pump();

        assert_eq!(rec.query(), items_spec().initial_state());
        assert_eq!(rec.widget().column_filter("status"), None);
        let ticket = single_fetch(&mut rec);
        assert_eq!(ticket.query, items_spec().initial_state());
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_limit_applies_on_reset() {
        let config = EngineConfig {
            default_limit: 25,
            ..EngineConfig::default()
        };
        let mut rec = mount_with(LocalGrid::new(), config, None);
        settle(&mut rec, 100);

        user(&mut rec, GridEvent::PageSizeChanged(50));
        settle(&mut rec, 100);

        rec.reset_all();
        let ticket = single_fetch(&mut rec);
        assert_eq!(ticket.query.pagination, Pagination::new(1, 25));
        assert_eq!(rec.widget().pagination().page_size, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_boolean_both_means_all() {
        let mut rec = mount();
        settle(&mut rec, 100);

        user(&mut rec, GridEvent::filter("available", ColumnFilter::values(["true"])));
        rec.drain_fetches();
        user(
            &mut rec,
            GridEvent::filter("available", ColumnFilter::values(["true", "false"])),
        );
        assert!(rec.query().filter("available").is_none());
        single_fetch(&mut rec);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_keeps_state() {
        let mut rec = mount();
        settle(&mut rec, 100);

        user(&mut rec, GridEvent::filter("available", ColumnFilter::values(["true"])));
        let ticket = single_fetch(&mut rec);
        let query = rec.query();
        let grid = rec.widget().state().clone();

        let outcome = rec.apply_response(
            &ticket,
            Err(SourceError::Timeout {
                duration: Duration::from_secs(30),
            }),
        );
        assert_eq!(outcome, ResponseOutcome::Failed);
        assert!(matches!(rec.error(), Some(SyncError::FetchFailed(_))));
        assert_eq!(rec.query(), query);
        assert_eq!(rec.widget().state(), &grid);
        assert_eq!(rec.rows(), ["row"]);
        assert_eq!(rec.phase(), SyncPhase::Idle);
        assert!(rec.drain_fetches().is_empty());

        rec.retry();
        let retry = single_fetch(&mut rec);
        assert_eq!(retry.query, query);
        assert_eq!(respond(&mut rec, &retry, &["in stock"], 1), ResponseOutcome::Applied);
        assert!(rec.error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_seed_is_not_treated_as_edit() {
        let seed = QueryPatch::new().filter("sub_category_id", FilterValue::set([7_i64]));
        let mut rec = mount_with(LocalGrid::new().echoing(), EngineConfig::default(), Some(seed));

        assert_eq!(
            rec.widget().column_filter("sub_category"),
            Some(ColumnFilter::values(["7"]))
        );
        let ticket = single_fetch(&mut rec);
        assert_eq!(ticket.query.filter("sub_category_id"), Some(&FilterValue::set([7_i64])));

        for echo in rec.widget_mut().take_echoes() {
            assert_eq!(rec.handle_grid_event(echo), EventOutcome::Unchanged);
        }
        assert!(!rec.pump());
        assert!(rec.drain_fetches().is_empty());
        assert_eq!(rec.originated_mutations(), 0);

        user(&mut rec, GridEvent::filter("available", ColumnFilter::values(["false"])));
        let query = rec.query();
        assert_eq!(query.filter("sub_category_id"), Some(&FilterValue::set([7_i64])));
        assert_eq!(query.filter("available"), Some(&FilterValue::from(false)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_column_search_shares_debounce_with_toolbar() {
        let mut rec = mount();
        settle(&mut rec, 100);

        let outcome = user(&mut rec, GridEvent::filter("name", ColumnFilter::Text("boot".into())));
        assert_eq!(outcome, EventOutcome::Debounced);
        assert_eq!(rec.search_text(), "boot");

        wait_quiet().await;
        rec.pump();
        assert_eq!(
            single_fetch(&mut rec).query.filter("search"),
            Some(&FilterValue::from("boot"))
        );

        rec.search_input("shoe");
        wait_quiet().await;
        rec.pump();
        single_fetch(&mut rec);
        assert_eq!(
            rec.widget().column_filter("name"),
            Some(ColumnFilter::Text("shoe".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_change_while_pending() {
        let mut rec = mount();
        let initial = single_fetch(&mut rec);

        let store = Arc::clone(rec.store());
        store.merge(&QueryPatch::new().filter("status", "active"), ChangeOrigin::External);
        rec.pump();

        assert_eq!(rec.phase(), SyncPhase::ExternalReset);
        assert_eq!(
            rec.widget().column_filter("status"),
            Some(ColumnFilter::values(["active"]))
        );

        assert_eq!(respond(&mut rec, &initial, &["old"], 1), ResponseOutcome::Stale);
        let current = single_fetch(&mut rec);
        assert_eq!(respond(&mut rec, &current, &["new"], 1), ResponseOutcome::Applied);
        assert_eq!(rec.phase(), SyncPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_change_resets_page() {
        let mut rec = mount();
        settle(&mut rec, 100);

        user(&mut rec, GridEvent::PageIndexChanged(2));
        user(&mut rec, GridEvent::filter("available", ColumnFilter::values(["true"])));
        assert_eq!(rec.query().pagination.page, 1);

        let config = EngineConfig {
            reset_page_on_filter_change: false,
            ..EngineConfig::default()
        };
        let mut rec = mount_with(LocalGrid::new(), config, None);
        settle(&mut rec, 100);

        user(&mut rec, GridEvent::PageIndexChanged(2));
        user(&mut rec, GridEvent::filter("available", ColumnFilter::values(["true"])));
        assert_eq!(rec.query().pagination.page, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_size_change_returns_to_first_page() {
        let mut rec = mount();
        settle(&mut rec, 100);

        user(&mut rec, GridEvent::PageIndexChanged(2));
        user(&mut rec, GridEvent::PageSizeChanged(50));
        assert_eq!(rec.query().pagination, Pagination::new(1, 50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_only_events() {
        let mut rec = mount();
        settle(&mut rec, 100);

        let outcome = user(
            &mut rec,
            GridEvent::VisibilityChanged {
                column: "price".to_string(),
                visible: false,
            },
        );
        assert_eq!(outcome, EventOutcome::LocalOnly);
        assert!(!rec.widget().is_column_visible("price"));
        assert!(rec.drain_fetches().is_empty());
        assert_eq!(rec.store().revision(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_refetches_current_query() {
        let mut rec = mount();
        settle(&mut rec, 100);
        user(&mut rec, GridEvent::filter("status", ColumnFilter::values(["archived"])));
        settle(&mut rec, 4);

        rec.invalidate();
        let ticket = single_fetch(&mut rec);
        assert_eq!(ticket.query, rec.query());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_cancels_pending_work() {
        let mut rec = mount();
        let initial = single_fetch(&mut rec);

        rec.search_input("abc");
        rec.unmount();

        wait_quiet().await;
        assert!(!rec.pump());
        assert!(rec.drain_fetches().is_empty());
        assert_eq!(respond(&mut rec, &initial, &["late"], 1), ResponseOutcome::Stale);
        assert!(rec.rows().is_empty());
        assert_eq!(rec.search_input("x"), EventOutcome::Ignored);
    }
}
