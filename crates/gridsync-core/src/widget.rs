//! Grid widget state and change events.
//!
//! These types mirror what an interactive data grid keeps locally. The grid
//! works without a server, so its state is a separate copy from
//! [`QueryState`](crate::QueryState) and speaks in widget terms: string filter
//! values, column ids, and 0-based page indices.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::query::Pagination;

/// Filter value held by a grid column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnFilter {
    /// Free text typed into a column filter.
    Text(String),
    /// Values picked in a select or faceted filter.
    Values(Vec<String>),
}

impl ColumnFilter {
    /// Build a value list filter.
    pub fn values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ColumnFilter::Values(values.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ColumnFilter::Text(s) => s.is_empty(),
            ColumnFilter::Values(v) => v.is_empty(),
        }
    }

    /// The raw strings held by this filter.
    pub fn raw_values(&self) -> Vec<&str> {
        match self {
            ColumnFilter::Text(s) => vec![s.as_str()],
            ColumnFilter::Values(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// Sorting as the grid sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSort {
    pub column: String,
    pub descending: bool,
}

impl ColumnSort {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// Grid pagination, 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPagination {
    pub page_index: u32,
    pub page_size: u32,
}

impl From<Pagination> for GridPagination {
    fn from(p: Pagination) -> Self {
        Self {
            page_index: p.page.saturating_sub(1),
            page_size: p.limit,
        }
    }
}

impl From<GridPagination> for Pagination {
    fn from(p: GridPagination) -> Self {
        Pagination::new(p.page_index.saturating_add(1), p.page_size)
    }
}

impl Default for GridPagination {
    fn default() -> Self {
        Pagination::default().into()
    }
}

/// Local snapshot owned by a grid widget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridWidgetState {
    /// Filter value per column id.
    pub column_filters: BTreeMap<String, ColumnFilter>,

    /// Active sort, if any.
    pub sorting: Option<ColumnSort>,

    /// Selected row ids.
    pub selected_rows: BTreeSet<String>,

    /// Column visibility overrides; missing columns are visible.
    pub column_visibility: BTreeMap<String, bool>,

    pub pagination: GridPagination,
}

/// Change reported by a grid widget after it updated its own local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridEvent {
    /// A column filter was set (`Some`) or cleared (`None`).
    ColumnFilterChanged {
        column: String,
        value: Option<ColumnFilter>,
    },
    /// Sorting changed.
    SortingChanged(Option<ColumnSort>),
    /// The 0-based page index changed.
    PageIndexChanged(u32),
    /// The page size changed.
    PageSizeChanged(u32),
    /// A column was shown or hidden.
    VisibilityChanged { column: String, visible: bool },
    /// Row selection changed.
    SelectionChanged(BTreeSet<String>),
}

impl GridEvent {
    /// Shorthand for setting a column filter.
    pub fn filter(column: impl Into<String>, value: ColumnFilter) -> Self {
        GridEvent::ColumnFilterChanged {
            column: column.into(),
            value: Some(value),
        }
    }

    /// Shorthand for clearing a column filter.
    pub fn clear_filter(column: impl Into<String>) -> Self {
        GridEvent::ColumnFilterChanged {
            column: column.into(),
            value: None,
        }
    }

    /// Whether the event only affects local presentation.
    pub fn is_local_only(&self) -> bool {
        matches!(
            self,
            GridEvent::VisibilityChanged { .. } | GridEvent::SelectionChanged(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_pagination_conversion() {
        let grid: GridPagination = Pagination::new(3, 25).into();
        assert_eq!(grid.page_index, 2);
        assert_eq!(grid.page_size, 25);

        let back: Pagination = grid.into();
        assert_eq!(back, Pagination::new(3, 25));
    }

    #[test]
    fn test_column_filter_empty() {
        assert!(ColumnFilter::Text(String::new()).is_empty());
        assert!(ColumnFilter::values(Vec::<String>::new()).is_empty());
        assert!(!ColumnFilter::values(["true"]).is_empty());
    }

    #[test]
    fn test_local_only_events() {
        assert!(GridEvent::VisibilityChanged {
            column: "price".to_string(),
            visible: false,
        }
        .is_local_only());
        assert!(!GridEvent::PageIndexChanged(1).is_local_only());
    }
}
