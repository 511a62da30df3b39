//! Core types for the gridsync engine.
//!
//! This crate contains the data structures shared by every gridsync crate:
//! - Query model (pagination, sort, filters, patches)
//! - Server pagination metadata and fetched pages
//! - Grid widget state and widget events
//! - Screen bindings between grid columns and server filters
//! - Configuration types
//! - Error types

mod config;
mod error;
mod page;
mod query;
mod screen;
mod widget;

pub use config::{config_dir, config_path, ApiConfig, AppConfig, EngineConfig};
pub use error::{ConfigError, SourceError, SyncError};
pub use page::{Page, PaginationMeta};
pub use query::{
    FilterKey, FilterValue, Filters, PageUnit, Pagination, QueryPatch, QueryState, Scalar, Sort,
    SortDirection, DEFAULT_LIMIT, SEARCH_KEY,
};
pub use screen::{ColumnBinding, FilterDomain, ScreenSpec};
pub use widget::{ColumnFilter, ColumnSort, GridEvent, GridPagination, GridWidgetState};
