//! Screen catalog.
//!
//! Every list screen of the admin console, with the REST resource it reads,
//! the pagination unit that resource expects, and its column bindings.

use gridsync_core::{FilterDomain, PageUnit, ScreenSpec, Sort};

const VEHICLE_TYPES: &[&str] = &["sedan", "suv", "hatchback", "truck", "coupe"];
const VEHICLE_STATUSES: &[&str] = &["active", "discontinued", "upcoming", "limited", "production"];
const ORDER_STATUSES: &[&str] = &["pending", "processing", "shipped", "delivered", "cancelled"];
const PAYMENT_STATUSES: &[&str] = &["paid", "pending", "failed", "refunded"];
const PAYMENT_METHODS: &[&str] = &["upi", "cod", "card", "bank_transfer"];
const CUSTOMER_STATUSES: &[&str] = &["active", "inactive", "blocked", "pending", "new"];
const CUSTOMER_SOURCES: &[&str] = &["whatsapp", "facebook", "instagram", "website", "referral"];
const CUSTOMER_SEGMENTS: &[&str] = &["vip", "regular", "new", "loyal", "wholesale"];
const INTERACTION_STATUSES: &[&str] = &["new", "processing", "resolved", "pending", "ignored"];
const CHANNELS: &[&str] = &["whatsapp", "facebook", "instagram", "telegram"];
const SENTIMENTS: &[&str] = &["positive", "neutral", "negative"];

/// A screen and how its resource pages.
#[derive(Debug, Clone)]
pub struct Screen {
    pub spec: ScreenSpec,
    pub page_unit: PageUnit,
}

impl Screen {
    fn new(spec: ScreenSpec, page_unit: PageUnit) -> Self {
        Self { spec, page_unit }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

fn choice(options: &[&str]) -> FilterDomain {
    FilterDomain::Choice {
        options: options.iter().map(|o| o.to_string()).collect(),
        multi: true,
    }
}

/// Brands, makes, models and variants share one shape.
fn vehicle_screen(name: &str, resource: &str, with_status: bool) -> Screen {
    let mut spec = ScreenSpec::new(name, resource)
        .search("name", Some("name"))
        .bind("type", "type", choice(VEHICLE_TYPES))
        .bind("isActive", "isActive", FilterDomain::Boolean)
        .sortable("name", "name")
        .sortable("createdAt", "createdAt");
    if with_status {
        spec = spec.bind("status", "status", choice(VEHICLE_STATUSES));
    }
    Screen::new(spec, PageUnit::Page)
}

/// All screens, in menu order.
pub fn catalog() -> Vec<Screen> {
    vec![
        Screen::new(
            ScreenSpec::new("items", "api/v1/items")
                .search("search", Some("name"))
                .bind("available", "available", FilterDomain::Boolean)
                .bind("sub_category", "sub_category_id", FilterDomain::Integer { multi: true })
                .sortable("name", "name")
                .sortable("price", "price")
                .sortable("created_at", "created_at"),
            PageUnit::Offset,
        ),
        Screen::new(
            ScreenSpec::new("categories", "api/v1/categories")
                .search("search", Some("name"))
                .bind("active", "active", FilterDomain::Boolean)
                .sortable("name", "name")
                .sortable("display_order", "display_order")
                .default_sort(Sort::asc("display_order")),
            PageUnit::Offset,
        ),
        Screen::new(
            ScreenSpec::new("sub-categories", "api/v1/subcategories")
                .search("search", Some("name"))
                .bind("active", "active", FilterDomain::Boolean)
                .bind("category", "category_id", FilterDomain::Integer { multi: false })
                .sortable("name", "name")
                .sortable("display_order", "display_order")
                .default_sort(Sort::asc("display_order")),
            PageUnit::Offset,
        ),
        vehicle_screen("brands", "catalog-brands", true),
        vehicle_screen("makes", "vehicle-makes", true),
        vehicle_screen("models", "vehicle-models", true),
        vehicle_screen("variants", "vehicle-variants", false),
        Screen::new(
            ScreenSpec::new("orders", "api/v1/orders")
                .search("search", None)
                .bind("status", "status", choice(ORDER_STATUSES))
                .bind("paymentStatus", "payment_status", choice(PAYMENT_STATUSES))
                .bind("paymentMethod", "payment_method", choice(PAYMENT_METHODS))
                .sortable("createdAt", "created_at")
                .sortable("total", "total")
                .default_sort(Sort::desc("created_at")),
            PageUnit::Offset,
        ),
        Screen::new(
            ScreenSpec::new("customers", "api/v1/customers")
                .search("search", None)
                .bind("status", "status", choice(CUSTOMER_STATUSES))
                .bind("source", "source", choice(CUSTOMER_SOURCES))
                .bind("segment", "segment", choice(CUSTOMER_SEGMENTS))
                .sortable("name", "name")
                .sortable("lastOrderDate", "last_order_date"),
            PageUnit::Offset,
        ),
        Screen::new(
            ScreenSpec::new("interactions", "api/v1/interactions")
                .search("search", None)
                .bind("status", "status", choice(INTERACTION_STATUSES))
                .bind("channel", "channel", choice(CHANNELS))
                .bind("sentiment", "sentiment", choice(SENTIMENTS))
                .sortable("timestamp", "timestamp")
                .default_sort(Sort::desc("timestamp")),
            PageUnit::Offset,
        ),
    ]
}

/// Look up a screen by name.
pub fn find(name: &str) -> Option<Screen> {
    catalog().into_iter().find(|s| s.name() == name)
}

fn domain_label(domain: &FilterDomain) -> &'static str {
    match domain {
        FilterDomain::Text => "text",
        FilterDomain::Boolean => "bool",
        FilterDomain::Integer { multi: false } => "int",
        FilterDomain::Integer { multi: true } => "int*",
        FilterDomain::Choice { multi: false, .. } => "choice",
        FilterDomain::Choice { multi: true, .. } => "choice*",
    }
}

/// One line per screen: name, resource, page unit, search key and filters.
pub fn listing(screens: &[Screen]) -> String {
    let mut out = String::new();
    for screen in screens {
        let spec = &screen.spec;
        let unit = match screen.page_unit {
            PageUnit::Page => "page",
            PageUnit::Offset => "offset",
        };
        let filters: Vec<String> = spec
            .bindings
            .iter()
            .map(|b| format!("{}:{}", b.key, domain_label(&b.domain)))
            .collect();

        out.push_str(&format!(
            "{} {} [{}] search={}",
            spec.name, spec.resource, unit, spec.search_key
        ));
        if !filters.is_empty() {
            out.push_str(&format!(" filters={}", filters.join(",")));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        let screens = catalog();
        let mut names: Vec<&str> = screens.iter().map(Screen::name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), screens.len());
    }

    #[test]
    fn test_find() {
        let items = find("items").unwrap();
        assert_eq!(items.spec.resource, "api/v1/items");
        assert_eq!(items.page_unit, PageUnit::Offset);
        assert!(items.spec.is_search_column("name"));
        assert!(find("nope").is_none());
    }

    #[test]
    fn test_sorted_columns_map_back() {
        for screen in catalog() {
            if let Some(sort) = &screen.spec.default_sort {
                assert!(
                    screen.spec.column_sort_for(sort).is_some(),
                    "{} default sort has no column",
                    screen.name()
                );
            }
        }
    }

    #[test]
    fn test_listing() {
        insta::assert_snapshot!(listing(&catalog()), @r"
        items api/v1/items [offset] search=search filters=available:bool,sub_category_id:int*
        categories api/v1/categories [offset] search=search filters=active:bool
        sub-categories api/v1/subcategories [offset] search=search filters=active:bool,category_id:int
        brands catalog-brands [page] search=name filters=type:choice*,isActive:bool,status:choice*
        makes vehicle-makes [page] search=name filters=type:choice*,isActive:bool,status:choice*
        models vehicle-models [page] search=name filters=type:choice*,isActive:bool,status:choice*
        variants vehicle-variants [page] search=name filters=type:choice*,isActive:bool
        orders api/v1/orders [offset] search=search filters=status:choice*,payment_status:choice*,payment_method:choice*
        customers api/v1/customers [offset] search=search filters=status:choice*,source:choice*,segment:choice*
        interactions api/v1/interactions [offset] search=search filters=status:choice*,channel:choice*,sentiment:choice*
        ");
    }
}
