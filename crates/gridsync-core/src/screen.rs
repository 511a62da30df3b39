//! Screen bindings between grid columns and server filters.
//!
//! A [`ScreenSpec`] declares, for one list screen, which grid column feeds
//! which filter key and what values that filter accepts. The reconciler uses
//! it to translate widget values into typed filter values and back.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::SyncError;
use crate::query::{
    FilterKey, FilterValue, QueryState, Scalar, Sort, SortDirection, DEFAULT_LIMIT, SEARCH_KEY,
};
use crate::widget::{ColumnFilter, ColumnSort};

// =============================================================================
// Filter Domain
// =============================================================================

/// Values a filter accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FilterDomain {
    /// Free text.
    Text,
    /// `true` / `false`. Selecting both (or neither) means "all".
    Boolean,
    /// Integer ids, e.g. a foreign-key selection.
    Integer { multi: bool },
    /// One of a fixed set of options.
    Choice { options: Vec<String>, multi: bool },
}

impl FilterDomain {
    /// Human-readable description for warnings.
    pub fn describe(&self) -> String {
        match self {
            FilterDomain::Text => "text".to_string(),
            FilterDomain::Boolean => "true or false".to_string(),
            FilterDomain::Integer { multi: false } => "an integer".to_string(),
            FilterDomain::Integer { multi: true } => "integers".to_string(),
            FilterDomain::Choice { options, .. } => format!("one of [{}]", options.join(", ")),
        }
    }

    fn is_multi(&self) -> bool {
        matches!(
            self,
            FilterDomain::Integer { multi: true } | FilterDomain::Choice { multi: true, .. }
        )
    }

    /// Translate a widget value into a filter value.
    ///
    /// `Ok(None)` means the filter is not applied.
    pub fn parse(
        &self,
        key: &FilterKey,
        filter: &ColumnFilter,
    ) -> Result<Option<FilterValue>, SyncError> {
        if filter.is_empty() {
            return Ok(None);
        }

        let invalid = |value: &str| SyncError::InvalidFilterValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: self.describe(),
        };

        let raw = filter.raw_values();

        let mut scalars = BTreeSet::new();
        for &value in &raw {
            let scalar = match self {
                FilterDomain::Text => Scalar::Text(value.to_string()),
                FilterDomain::Boolean => match value {
                    "true" => Scalar::Bool(true),
                    "false" => Scalar::Bool(false),
                    other => return Err(invalid(other)),
                },
                FilterDomain::Integer { .. } => {
                    Scalar::Int(value.trim().parse::<i64>().map_err(|_| invalid(value))?)
                }
                FilterDomain::Choice { options, .. } => {
                    if !options.iter().any(|o| o == value) {
                        return Err(invalid(value));
                    }
                    Scalar::Text(value.to_string())
                }
            };
            scalars.insert(scalar);
        }

        if let FilterDomain::Boolean = self {
            // Both states selected is the same as no filter.
            return Ok(match scalars.len() {
                1 => scalars.into_iter().next().map(FilterValue::Scalar),
                _ => None,
            });
        }

        if self.is_multi() {
            return Ok(Some(FilterValue::Set(scalars)));
        }

        match scalars.len() {
            0 => Ok(None),
            1 => Ok(scalars.into_iter().next().map(FilterValue::Scalar)),
            _ => Err(invalid(&raw.join(","))),
        }
    }

    /// Render a filter value the way the widget holds it.
    pub fn render(&self, value: &FilterValue) -> ColumnFilter {
        match self {
            FilterDomain::Text => ColumnFilter::Text(value.to_param()),
            _ => ColumnFilter::values(value.scalars().iter().map(|s| s.to_string())),
        }
    }
}

// =============================================================================
// Column Binding
// =============================================================================

/// Ties one grid column to one filter key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnBinding {
    /// Grid column id.
    pub column: String,
    /// Server filter key.
    pub key: FilterKey,
    /// Accepted values.
    pub domain: FilterDomain,
}

impl ColumnBinding {
    pub fn new(column: impl Into<String>, key: impl Into<FilterKey>, domain: FilterDomain) -> Self {
        Self {
            column: column.into(),
            key: key.into(),
            domain,
        }
    }
}

// =============================================================================
// Screen Spec
// =============================================================================

/// Declaration of one list screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSpec {
    /// Screen name, e.g. "items".
    pub name: String,

    /// REST resource path segment, e.g. "subcategories".
    pub resource: String,

    /// Filter key fed by the search box.
    pub search_key: FilterKey,

    /// Text column that filters on the search key, if the grid has one.
    pub search_column: Option<String>,

    /// Column filters bound to server filters.
    pub bindings: Vec<ColumnBinding>,

    /// Sortable column id → server sort field.
    pub sort_fields: BTreeMap<String, String>,

    /// Sort applied on mount and after reset.
    pub default_sort: Option<Sort>,

    /// Page size applied on mount and after reset. `None` defers to the
    /// engine's configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_limit: Option<u32>,
}

impl ScreenSpec {
    /// Create a spec with a `search` key and no column bindings.
    pub fn new(name: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            search_key: FilterKey::from(SEARCH_KEY),
            search_column: None,
            bindings: Vec::new(),
            sort_fields: BTreeMap::new(),
            default_sort: None,
            default_limit: None,
        }
    }

    /// Set the search key and the text column that shares it.
    pub fn search(mut self, key: impl Into<FilterKey>, column: Option<&str>) -> Self {
        self.search_key = key.into();
        self.search_column = column.map(str::to_string);
        self
    }

    /// Bind a column to a filter.
    pub fn bind(
        mut self,
        column: impl Into<String>,
        key: impl Into<FilterKey>,
        domain: FilterDomain,
    ) -> Self {
        self.bindings.push(ColumnBinding::new(column, key, domain));
        self
    }

    /// Make a column sortable by a server field.
    pub fn sortable(mut self, column: impl Into<String>, field: impl Into<String>) -> Self {
        self.sort_fields.insert(column.into(), field.into());
        self
    }

    pub fn default_sort(mut self, sort: Sort) -> Self {
        self.default_sort = Some(sort);
        self
    }

    pub fn default_limit(mut self, limit: u32) -> Self {
        self.default_limit = Some(limit.max(1));
        self
    }

    /// Use `limit` as the page size unless the screen set its own.
    pub fn with_fallback_limit(mut self, limit: u32) -> Self {
        if self.default_limit.is_none() {
            self.default_limit = Some(limit.max(1));
        }
        self
    }

    /// Query for a freshly mounted or reset screen.
    pub fn initial_state(&self) -> QueryState {
        let mut state = QueryState::with_limit(self.default_limit.unwrap_or(DEFAULT_LIMIT));
        state.sort = self.default_sort.clone();
        state
    }

    /// Binding for a grid column.
    pub fn binding_for_column(&self, column: &str) -> Option<&ColumnBinding> {
        self.bindings.iter().find(|b| b.column == column)
    }

    /// Binding for a filter key.
    pub fn binding_for_key(&self, key: &str) -> Option<&ColumnBinding> {
        self.bindings.iter().find(|b| b.key.as_ref() == key)
    }

    /// Whether a column is the text column sharing the search key.
    pub fn is_search_column(&self, column: &str) -> bool {
        self.search_column.as_deref() == Some(column)
    }

    /// Server sort for a grid sort.
    pub fn sort_for(&self, sort: &ColumnSort) -> Option<Sort> {
        self.sort_fields.get(&sort.column).map(|field| {
            if sort.descending {
                Sort::desc(field.clone())
            } else {
                Sort::asc(field.clone())
            }
        })
    }

    /// Grid sort for a server sort.
    pub fn column_sort_for(&self, sort: &Sort) -> Option<ColumnSort> {
        self.sort_fields
            .iter()
            .find(|(_, field)| **field == sort.field)
            .map(|(column, _)| ColumnSort {
                column: column.clone(),
                descending: sort.direction == SortDirection::Desc,
            })
    }
}
