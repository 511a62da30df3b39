//! Observable query state store with automatic change notifications.
//!
//! Mutation = notification. Every write that changes the effective request
//! bumps the revision and broadcasts exactly once. Writes that leave the
//! normalized state as it was are silent, so "sync from props" style callers
//! cannot cause request storms.

use parking_lot::RwLock;
use tokio::sync::watch;

use gridsync_core::{QueryPatch, QueryState};

// =============================================================================
// Change Notifications
// =============================================================================

/// Who caused a store change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Initial state at screen mount.
    Mount,
    /// The grid reconciler translating a widget event.
    Reconciler,
    /// A filter preset handed over from another screen.
    Seed,
    /// An explicit reset action.
    Reset,
    /// Anything else holding the store.
    External,
}

/// A committed store change.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryChange {
    /// Monotonically increasing, one per effective change.
    pub revision: u64,
    /// State after the change.
    pub state: QueryState,
    pub origin: ChangeOrigin,
}

// =============================================================================
// QueryStore
// =============================================================================

/// Owner of the canonical [`QueryState`] for one screen.
///
/// Construct at screen entry, pass explicitly to the reconciler and any
/// other component that needs to read or drive the query, and drop it with
/// the screen.
///
/// ## Thread Safety
///
/// Uses `parking_lot::RwLock` for the state (never poisons) and
/// `tokio::sync::watch` for broadcasts. The broadcast happens while the write
/// lock is held, so subscribers observe revisions in commit order.
pub struct QueryStore {
    inner: RwLock<StoreInner>,
    tx: watch::Sender<QueryChange>,
}

struct StoreInner {
    state: QueryState,
    revision: u64,
}

impl QueryStore {
    /// Create a store holding `initial` at revision 0.
    pub fn new(initial: QueryState) -> Self {
        let state = initial.normalized();
        let (tx, _rx) = watch::channel(QueryChange {
            revision: 0,
            state: state.clone(),
            origin: ChangeOrigin::Mount,
        });
        Self {
            inner: RwLock::new(StoreInner { state, revision: 0 }),
            tx,
        }
    }

    // =========================================================================
    // Read Methods
    // =========================================================================

    /// Current state.
    pub fn get(&self) -> QueryState {
        self.inner.read().state.clone()
    }

    /// Current revision.
    pub fn revision(&self) -> u64 {
        self.inner.read().revision
    }

    /// Revision and state read under one lock.
    pub fn snapshot(&self) -> (u64, QueryState) {
        let inner = self.inner.read();
        (inner.revision, inner.state.clone())
    }

    /// Read the state with a closure, without cloning it.
    pub fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&QueryState) -> R,
    {
        f(&self.inner.read().state)
    }

    // =========================================================================
    // Mutation Methods (broadcast on change)
    // =========================================================================

    /// Merge a patch into the current state.
    ///
    /// Pagination and sort merge shallowly, filters key-wise. Returns the
    /// committed change, or `None` if the effective request is unchanged.
    pub fn merge(&self, patch: &QueryPatch, origin: ChangeOrigin) -> Option<QueryChange> {
        let mut inner = self.inner.write();
        let next = inner.state.merged(patch);
        self.commit(&mut inner, next, origin)
    }

    /// Overwrite the whole state.
    ///
    /// Returns the committed change, or `None` if the state is unchanged.
    pub fn replace(&self, state: QueryState, origin: ChangeOrigin) -> Option<QueryChange> {
        let mut inner = self.inner.write();
        self.commit(&mut inner, state.normalized(), origin)
    }

    fn commit(
        &self,
        inner: &mut StoreInner,
        next: QueryState,
        origin: ChangeOrigin,
    ) -> Option<QueryChange> {
        if next == inner.state {
            tracing::trace!(?origin, "query unchanged, no broadcast");
            return None;
        }

        inner.state = next;
        inner.revision += 1;

        let change = QueryChange {
            revision: inner.revision,
            state: inner.state.clone(),
            origin,
        };
        tracing::debug!(revision = change.revision, ?origin, "query changed");
        self.tx.send_replace(change.clone());
        Some(change)
    }

    // =========================================================================
    // Subscription
    // =========================================================================

    /// Subscribe to store changes.
    ///
    /// The current state counts as already seen; the receiver wakes on the
    /// next committed change. Changes committed between two reads coalesce
    /// into the latest one.
    pub fn subscribe(&self) -> watch::Receiver<QueryChange> {
        self.tx.subscribe()
    }
}

impl Default for QueryStore {
    fn default() -> Self {
        Self::new(QueryState::default())
    }
}

// =============================================================================
// Tests
// =============================================================================
