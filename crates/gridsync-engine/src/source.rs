//! Data source seam.
//!
//! The reconciler never talks to a server itself. It issues fetch tickets,
//! and whoever hosts it turns each ticket into a [`DataSource::fetch_page`]
//! call and hands the result back.

use futures::future::BoxFuture;

use gridsync_core::{Page, QueryState, SourceError};

/// Paged, filtered, sorted reads for one resource.
///
/// Returns futures so the caller decides how to spawn them. Fetches must be
/// idempotent; a response that arrives after its parameters went stale is
/// simply dropped.
pub trait DataSource<T>: Send + Sync {
    fn fetch_page(&self, query: QueryState) -> BoxFuture<'static, Result<Page<T>, SourceError>>;
}

// =============================================================================
// Mock Source for Testing
// =============================================================================
