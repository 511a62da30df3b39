//! Fetch results and server pagination metadata.

use serde::{Deserialize, Serialize};

use crate::query::Pagination;

/// Pagination reported by the server for a completed fetch.
///
/// `QueryState::pagination` is the request; this is the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_next: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_prev: Option<bool>,
}

impl PaginationMeta {
    /// Full metadata computed from a request and a total row count.
    pub fn from_total(pagination: Pagination, total: u64) -> Self {
        let total_pages = pages_for(total, pagination.limit);
        Self {
            page: pagination.page,
            limit: pagination.limit,
            total,
            total_pages: Some(total_pages),
            has_next: Some(pagination.page < total_pages),
            has_prev: Some(pagination.page > 1),
        }
    }

    /// Metadata for a server that returned rows without pagination info.
    ///
    /// The response is treated as the only page.
    pub fn single_page(pagination: Pagination, total: u64) -> Self {
        Self {
            page: pagination.page,
            limit: pagination.limit,
            total,
            total_pages: Some(1),
            has_next: Some(false),
            has_prev: Some(false),
        }
    }

    /// Number of pages, derived from `total` when the server omitted it.
    pub fn page_count(&self) -> u32 {
        self.total_pages
            .unwrap_or_else(|| pages_for(self.total, self.limit))
    }

    /// The page a request for `requested` must be clamped to, if any.
    ///
    /// An empty result set has one (empty) valid page.
    pub fn clamp_target(&self, requested: u32) -> Option<u32> {
        let last = self.page_count().max(1);
        (requested > last).then_some(last)
    }
}

fn pages_for(total: u64, limit: u32) -> u32 {
    let pages = total.div_ceil(u64::from(limit.max(1)));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// One fetched page of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub meta: PaginationMeta,
}

impl<T> Page<T> {
    pub fn new(rows: Vec<T>, meta: PaginationMeta) -> Self {
        Self { rows, meta }
    }
}
