//! Grid widget seam.
//!
//! The reconciler drives a grid through [`GridWidget`]. Imperative setters
//! are how store changes are written back into the widget; user changes flow
//! the other way as [`GridEvent`]s handed to the reconciler.

use gridsync_core::{ColumnFilter, ColumnSort, GridEvent, GridPagination, GridWidgetState};

/// Imperative handle on an interactive data grid.
pub trait GridWidget {
    fn column_filter(&self, column: &str) -> Option<ColumnFilter>;
    fn set_column_filter(&mut self, column: &str, value: Option<ColumnFilter>);
    /// Clear every column filter at once.
    fn reset_column_filters(&mut self);

    fn sorting(&self) -> Option<ColumnSort>;
    fn set_sorting(&mut self, sorting: Option<ColumnSort>);

    fn pagination(&self) -> GridPagination;
    fn set_pagination(&mut self, pagination: GridPagination);

    fn is_column_visible(&self, column: &str) -> bool;
    fn set_column_visibility(&mut self, column: &str, visible: bool);
}

// =============================================================================
// LocalGrid
// =============================================================================

/// In-memory grid holding a [`GridWidgetState`].
///
/// Used by headless hosts such as the CLI. With [`echoing`](Self::echoing)
/// it also reports imperative writes as change events, the way many real
/// grids fire their change handlers for programmatic updates.
#[derive(Debug, Clone, Default)]
pub struct LocalGrid {
    state: GridWidgetState,
    echo: bool,
    echoes: Vec<GridEvent>,
    writes: usize,
}

impl LocalGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a change event for every imperative write.
    pub fn echoing(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn state(&self) -> &GridWidgetState {
        &self.state
    }

    /// Number of imperative writes that changed the state.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Take the events queued by imperative writes.
    pub fn take_echoes(&mut self) -> Vec<GridEvent> {
        std::mem::take(&mut self.echoes)
    }

    /// Apply a user interaction to the local state and return the event to
    /// hand to the reconciler.
    pub fn apply(&mut self, event: GridEvent) -> GridEvent {
        match &event {
            GridEvent::ColumnFilterChanged { column, value } => {
                Self::store_filter(&mut self.state, column, value.clone());
            }
            GridEvent::SortingChanged(sorting) => self.state.sorting = sorting.clone(),
            GridEvent::PageIndexChanged(index) => self.state.pagination.page_index = *index,
            GridEvent::PageSizeChanged(size) => {
                self.state.pagination.page_size = (*size).max(1);
                self.state.pagination.page_index = 0;
            }
            GridEvent::VisibilityChanged { column, visible } => {
                self.state.column_visibility.insert(column.clone(), *visible);
            }
            GridEvent::SelectionChanged(rows) => self.state.selected_rows = rows.clone(),
        }
        event
    }

    fn store_filter(state: &mut GridWidgetState, column: &str, value: Option<ColumnFilter>) {
        match value.filter(|v| !v.is_empty()) {
            Some(v) => {
                state.column_filters.insert(column.to_string(), v);
            }
            None => {
                state.column_filters.remove(column);
            }
        }
    }

    fn record(&mut self, event: GridEvent) {
        self.writes += 1;
        if self.echo {
            self.echoes.push(event);
        }
    }
}

impl GridWidget for LocalGrid {
    fn column_filter(&self, column: &str) -> Option<ColumnFilter> {
        self.state.column_filters.get(column).cloned()
    }

    fn set_column_filter(&mut self, column: &str, value: Option<ColumnFilter>) {
        let value = value.filter(|v| !v.is_empty());
        if self.column_filter(column) == value {
            return;
        }
        Self::store_filter(&mut self.state, column, value.clone());
        self.record(GridEvent::ColumnFilterChanged {
            column: column.to_string(),
            value,
        });
    }

    fn reset_column_filters(&mut self) {
        let columns: Vec<String> = self.state.column_filters.keys().cloned().collect();
        for column in columns {
            self.set_column_filter(&column, None);
        }
    }

    fn sorting(&self) -> Option<ColumnSort> {
        self.state.sorting.clone()
    }

    fn set_sorting(&mut self, sorting: Option<ColumnSort>) {
        if self.state.sorting == sorting {
            return;
        }
        self.state.sorting = sorting.clone();
        self.record(GridEvent::SortingChanged(sorting));
    }

    fn pagination(&self) -> GridPagination {
        self.state.pagination
    }

    fn set_pagination(&mut self, pagination: GridPagination) {
        let current = self.state.pagination;
        if current == pagination {
            return;
        }
        self.state.pagination = pagination;
        if current.page_size != pagination.page_size {
            self.record(GridEvent::PageSizeChanged(pagination.page_size));
        }
        if current.page_index != pagination.page_index {
            self.record(GridEvent::PageIndexChanged(pagination.page_index));
        }
    }

    fn is_column_visible(&self, column: &str) -> bool {
        self.state
            .column_visibility
            .get(column)
            .copied()
            .unwrap_or(true)
    }

    fn set_column_visibility(&mut self, column: &str, visible: bool) {
        if self.is_column_visible(column) == visible {
            return;
        }
        self.state
            .column_visibility
            .insert(column.to_string(), visible);
        self.record(GridEvent::VisibilityChanged {
            column: column.to_string(),
            visible,
        });
    }
}
