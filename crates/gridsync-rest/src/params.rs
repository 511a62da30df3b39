//! Query string encoding.

use gridsync_core::{PageUnit, QueryState};

/// Encode a query as request parameters.
///
/// Absent and empty filters are omitted, sets are comma-joined, and the
/// count is always requested so the server reports pagination.
pub fn query_params(query: &QueryState, unit: PageUnit) -> Vec<(String, String)> {
    let mut params = Vec::with_capacity(query.filters.len() + 5);
    let pagination = query.pagination;

    match unit {
        PageUnit::Page => {
            params.push(("page".to_string(), pagination.page.to_string()));
            params.push(("limit".to_string(), pagination.limit.to_string()));
        }
        PageUnit::Offset => {
            params.push(("limit".to_string(), pagination.limit.to_string()));
            params.push(("offset".to_string(), pagination.offset().to_string()));
        }
    }

    if let Some(sort) = &query.sort {
        params.push(("order_by".to_string(), sort.field.clone()));
        params.push((
            "order_dir".to_string(),
            sort.direction.as_str().to_uppercase(),
        ));
    }

    for (key, value) in &query.filters {
        if value.is_empty() {
            continue;
        }
        params.push((key.to_string(), value.to_param()));
    }

    params.push(("include_count".to_string(), "true".to_string()));
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsync_core::{FilterValue, Pagination, QueryPatch, Sort};

    fn get<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_page_unit() {
        let query = QueryState::new(Pagination::new(3, 25));
        let params = query_params(&query, PageUnit::Page);

        assert_eq!(get(&params, "page"), Some("3"));
        assert_eq!(get(&params, "limit"), Some("25"));
        assert_eq!(get(&params, "offset"), None);
        assert_eq!(get(&params, "include_count"), Some("true"));
    }

    #[test]
    fn test_offset_unit() {
        let query = QueryState::new(Pagination::new(3, 25));
        let params = query_params(&query, PageUnit::Offset);

        assert_eq!(get(&params, "offset"), Some("50"));
        assert_eq!(get(&params, "limit"), Some("25"));
        assert_eq!(get(&params, "page"), None);
    }

    #[test]
    fn test_filters_and_sort() {
        let query = QueryState::default().merged(
            &QueryPatch::new()
                .filter("search", "shirt")
                .filter("available", true)
                .filter("sub_category_id", FilterValue::set([7_i64, 3]))
                .sort(Sort::desc("price")),
        );
        let params = query_params(&query, PageUnit::Page);

        assert_eq!(get(&params, "search"), Some("shirt"));
        assert_eq!(get(&params, "available"), Some("true"));
        assert_eq!(get(&params, "sub_category_id"), Some("3,7"));
        assert_eq!(get(&params, "order_by"), Some("price"));
        assert_eq!(get(&params, "order_dir"), Some("DESC"));
    }

    #[test]
    fn test_no_sort_no_filters() {
        let params = query_params(&QueryState::default(), PageUnit::Page);
        let keys: Vec<&str> = params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["page", "limit", "include_count"]);
    }
}
