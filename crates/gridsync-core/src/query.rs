//! Query model: what a screen asks the server for.
//!
//! A [`QueryState`] is always kept normalized: filters holding an empty
//! string or an empty set are removed, and pagination never drops below 1.
//! Two states that would produce the same server request compare equal.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Page size used when a screen does not configure one.
pub const DEFAULT_LIMIT: u32 = 10;

/// Filter key used for free-text search.
pub const SEARCH_KEY: &str = "search";

// =============================================================================
// Filter Keys and Values
// =============================================================================

/// Name of a server-side filter parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterKey(pub String);

impl From<String> for FilterKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FilterKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for FilterKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for FilterKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single filter value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Int(n)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

/// Value of an applied filter: one scalar or a set of scalars (multi-select).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Scalar(Scalar),
    Set(BTreeSet<Scalar>),
}

impl FilterValue {
    /// Build a set-valued filter.
    pub fn set<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        FilterValue::Set(values.into_iter().map(Into::into).collect())
    }

    /// An empty string or an empty set means "not applied".
    pub fn is_empty(&self) -> bool {
        match self {
            FilterValue::Scalar(Scalar::Text(s)) => s.is_empty(),
            FilterValue::Scalar(_) => false,
            FilterValue::Set(values) => values.is_empty(),
        }
    }

    /// Get the scalar if this is a single value.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            FilterValue::Scalar(s) => Some(s),
            FilterValue::Set(_) => None,
        }
    }

    /// Get the text if this is a single text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FilterValue::Scalar(Scalar::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// All scalars in this value, in order.
    pub fn scalars(&self) -> Vec<&Scalar> {
        match self {
            FilterValue::Scalar(s) => vec![s],
            FilterValue::Set(values) => values.iter().collect(),
        }
    }

    /// Render as a request parameter. Sets are comma-joined.
    pub fn to_param(&self) -> String {
        self.scalars()
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl From<Scalar> for FilterValue {
    fn from(value: Scalar) -> Self {
        FilterValue::Scalar(value)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Scalar(Scalar::Bool(b))
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        FilterValue::Scalar(Scalar::Int(n))
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Scalar(Scalar::Text(s.to_string()))
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Scalar(Scalar::Text(s))
    }
}

/// Applied filters by key.
pub type Filters = BTreeMap<FilterKey, FilterValue>;

// =============================================================================
// Pagination and Sort
// =============================================================================

/// Requested page, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    /// Create a pagination request. Page and limit are clamped to at least 1.
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    /// First page with the given limit.
    pub fn first(limit: u32) -> Self {
        Self::new(1, limit)
    }

    /// Number of rows before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// Convert an offset-based window to a page request.
    ///
    /// An offset that is not a multiple of `limit` lands on the page that
    /// contains it.
    pub fn from_offset(offset: u64, limit: u32) -> Self {
        let limit = limit.max(1);
        let page = offset / u64::from(limit) + 1;
        Self::new(u32::try_from(page).unwrap_or(u32::MAX), limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::first(DEFAULT_LIMIT)
    }
}

/// How pagination is expressed on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageUnit {
    /// `page` + `limit`.
    #[default]
    Page,
    /// `offset` + `limit`.
    Offset,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Requested server-side ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

// =============================================================================
// Query State
// =============================================================================

/// The canonical "what should be requested from the server" object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryState {
    pub pagination: Pagination,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,

    #[serde(default)]
    pub filters: Filters,
}

impl QueryState {
    /// Create a state with the given pagination, no sort and no filters.
    pub fn new(pagination: Pagination) -> Self {
        Self {
            pagination,
            sort: None,
            filters: Filters::new(),
        }
    }

    /// First page with the given limit.
    pub fn with_limit(limit: u32) -> Self {
        Self::new(Pagination::first(limit))
    }

    /// Get an applied filter.
    pub fn filter(&self, key: &str) -> Option<&FilterValue> {
        self.filters.get(key)
    }

    /// Whether any filter is applied.
    pub fn is_filtered(&self) -> bool {
        self.filters.values().any(|v| !v.is_empty())
    }

    /// Drop empty filters and clamp pagination.
    pub fn normalized(mut self) -> Self {
        self.filters.retain(|_, v| !v.is_empty());
        self.pagination = Pagination::new(self.pagination.page, self.pagination.limit);
        self
    }

    /// Apply a patch and return the normalized result.
    ///
    /// Pagination fields and sort merge shallowly; filters merge key-wise.
    pub fn merged(&self, patch: &QueryPatch) -> QueryState {
        let mut next = self.clone();

        if let Some(page) = patch.page {
            next.pagination.page = page;
        }
        if let Some(limit) = patch.limit {
            next.pagination.limit = limit;
        }
        if let Some(sort) = &patch.sort {
            next.sort = sort.clone();
        }
        for (key, value) in &patch.filters {
            match value {
                Some(value) => {
                    next.filters.insert(key.clone(), value.clone());
                }
                None => {
                    next.filters.remove(key);
                }
            }
        }

        next.normalized()
    }
}

// =============================================================================
// Query Patch
// =============================================================================

/// Partial update for a [`QueryState`].
///
/// `filters` maps a key to `Some(value)` to set it or `None` to remove it.
/// Keys not mentioned are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPatch {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<Option<Sort>>,
    pub filters: BTreeMap<FilterKey, Option<FilterValue>>,
}

impl QueryPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(Some(sort));
        self
    }

    pub fn clear_sort(mut self) -> Self {
        self.sort = Some(None);
        self
    }

    pub fn filter(mut self, key: impl Into<FilterKey>, value: impl Into<FilterValue>) -> Self {
        self.filters.insert(key.into(), Some(value.into()));
        self
    }

    /// Set or remove a filter depending on `value`.
    pub fn set_filter(mut self, key: impl Into<FilterKey>, value: Option<FilterValue>) -> Self {
        self.filters.insert(key.into(), value);
        self
    }

    pub fn clear_filter(mut self, key: impl Into<FilterKey>) -> Self {
        self.filters.insert(key.into(), None);
        self
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.page.is_none() && self.limit.is_none() && self.sort.is_none() && self.filters.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
