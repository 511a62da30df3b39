//! Line-driven screen session.
//!
//! Parses console commands, turns them into widget events on the session's
//! [`LocalGrid`], and renders the current page as text.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use std::str::FromStr;

use gridsync_core::{
    ColumnFilter, ColumnSort, FilterDomain, FilterKey, GridEvent, Page, QueryPatch, ScreenSpec,
};
use gridsync_engine::{
    DataSource, EventOutcome, GridReconciler, GridWidget, LocalGrid, ScreenSession,
};

pub type Console<S> = ScreenSession<Value, LocalGrid, S>;

pub const HELP: &str = "\
commands:
  search <text>             set the search box (empty clears it)
  filter <column> <values>  set a column filter, values comma-separated
  clear <column>            clear a column filter
  page <n>                  go to page n (1-based)
  size <n>                  set the page size
  sort <column>[:desc]      sort by a column; `sort` alone clears it
  reset                     clear every filter, search and sort
  retry                     refetch after a failure
  show                      print the current page
  quit                      leave the session";

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search(String),
    Filter { column: String, value: String },
    Clear(String),
    Page(u32),
    Size(u32),
    Sort(Option<ColumnSort>),
    Reset,
    Retry,
    Show,
    Help,
    Quit,
}

fn positive(arg: &str, what: &str) -> Result<u32> {
    let n: u32 = arg
        .trim()
        .parse()
        .with_context(|| format!("{what} must be a positive number, got {arg:?}"))?;
    if n == 0 {
        bail!("{what} must be at least 1");
    }
    Ok(n)
}

/// Parse `column[:desc]` / `column[:asc]`.
pub fn parse_sort(arg: &str) -> Result<ColumnSort> {
    let (column, direction) = arg.split_once(':').unwrap_or((arg, "asc"));
    if column.is_empty() {
        bail!("sort needs a column");
    }
    match direction {
        "asc" => Ok(ColumnSort::asc(column)),
        "desc" => Ok(ColumnSort::desc(column)),
        other => bail!("unknown sort direction {other:?}, expected asc or desc"),
    }
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match word {
            "search" | "s" => Ok(Command::Search(rest.to_string())),
            "filter" | "f" => {
                let (column, value) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("usage: filter <column> <values>"))?;
                Ok(Command::Filter {
                    column: column.to_string(),
                    value: value.trim().to_string(),
                })
            }
            "clear" => {
                if rest.is_empty() {
                    bail!("usage: clear <column>");
                }
                Ok(Command::Clear(rest.to_string()))
            }
            "page" | "p" => Ok(Command::Page(positive(rest, "page")?)),
            "size" => Ok(Command::Size(positive(rest, "size")?)),
            "sort" => match rest {
                "" | "none" => Ok(Command::Sort(None)),
                arg => Ok(Command::Sort(Some(parse_sort(arg)?))),
            },
            "reset" => Ok(Command::Reset),
            "retry" => Ok(Command::Retry),
            "show" | "" => Ok(Command::Show),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => bail!("unknown command {other:?}, type `help`"),
        }
    }
}

// =============================================================================
// Translation
// =============================================================================

/// Widget value for `raw` typed into a column of the given domain.
fn column_value(domain: Option<&FilterDomain>, raw: &str) -> ColumnFilter {
    match domain {
        None | Some(FilterDomain::Text) => ColumnFilter::Text(raw.to_string()),
        Some(_) => ColumnFilter::values(
            raw.split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty()),
        ),
    }
}

/// Build a cross-screen seed from command-line options.
///
/// `filters` are `key=value` pairs on server filter keys; multi-valued
/// filters take comma-separated values.
pub fn seed_patch(
    spec: &ScreenSpec,
    search: Option<&str>,
    filters: &[String],
    page: Option<u32>,
    limit: Option<u32>,
    sort: Option<&str>,
) -> Result<QueryPatch> {
    let mut patch = QueryPatch::new();

    if let Some(text) = search {
        patch = patch.filter(spec.search_key.clone(), text);
    }

    for pair in filters {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("filter {pair:?} is not key=value"))?;
        let key = FilterKey::from(key.trim());

        if key == spec.search_key {
            patch = patch.filter(key, raw);
            continue;
        }

        let binding = spec
            .binding_for_key(key.as_ref())
            .ok_or_else(|| anyhow!("screen {} has no filter {key}", spec.name))?;
        let value = binding
            .domain
            .parse(&key, &column_value(Some(&binding.domain), raw))?;
        patch = patch.set_filter(key, value);
    }

    if let Some(page) = page {
        patch = patch.page(page);
    }
    if let Some(limit) = limit {
        patch = patch.limit(limit);
    }
    if let Some(arg) = sort {
        let column_sort = parse_sort(arg)?;
        let sort = spec
            .sort_for(&column_sort)
            .ok_or_else(|| anyhow!("column {} is not sortable", column_sort.column))?;
        patch = patch.sort(sort);
    }

    Ok(patch)
}

/// Run one command against a session. Returns text to print, if any.
pub fn apply<S>(console: &mut Console<S>, command: Command) -> Option<String>
where
    S: DataSource<Value> + 'static,
{
    let reconciler = console.reconciler_mut();

    let outcome = match command {
        Command::Search(text) => reconciler.search_input(text),
        Command::Filter { column, value } => {
            let domain = reconciler
                .spec()
                .binding_for_column(&column)
                .map(|b| b.domain.clone());
            let event = reconciler
                .widget_mut()
                .apply(GridEvent::filter(column, column_value(domain.as_ref(), &value)));
            reconciler.handle_grid_event(event)
        }
        Command::Clear(column) => {
            let event = reconciler.widget_mut().apply(GridEvent::clear_filter(column));
            reconciler.handle_grid_event(event)
        }
        Command::Page(page) => {
            let event = reconciler
                .widget_mut()
                .apply(GridEvent::PageIndexChanged(page.saturating_sub(1)));
            reconciler.handle_grid_event(event)
        }
        Command::Size(size) => {
            let event = reconciler.widget_mut().apply(GridEvent::PageSizeChanged(size));
            reconciler.handle_grid_event(event)
        }
        Command::Sort(sort) => {
            let event = reconciler.widget_mut().apply(GridEvent::SortingChanged(sort));
            reconciler.handle_grid_event(event)
        }
        Command::Reset => {
            reconciler.reset_all();
            EventOutcome::Pushed
        }
        Command::Retry => {
            reconciler.retry();
            EventOutcome::Pushed
        }
        Command::Show => return Some(render(console.reconciler())),
        Command::Help => return Some(HELP.to_string()),
        Command::Quit => return None,
    };

    console.poll();

    match outcome {
        EventOutcome::Rejected(err) => Some(format!("rejected: {err}")),
        EventOutcome::Unchanged => Some("unchanged".to_string()),
        EventOutcome::LocalOnly => Some("no server filter for that column".to_string()),
        EventOutcome::Ignored => Some("screen is closed".to_string()),
        EventOutcome::Pushed | EventOutcome::Debounced => None,
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// One-line summary of the screen's state.
pub fn status_line<W>(reconciler: &GridReconciler<Value, W>) -> String
where
    W: GridWidget,
{
    if let Some(err) = reconciler.error() {
        return format!("error: {err} (type `retry`)");
    }
    let Some(meta) = reconciler.meta() else {
        return "loading".to_string();
    };

    let mut line = format!(
        "page {} of {}, {} rows total",
        meta.page,
        meta.page_count(),
        meta.total
    );
    if reconciler.is_filtered() {
        line.push_str(", filtered");
    }
    if reconciler.is_loading() {
        line.push_str(", loading");
    }
    line
}

/// Rows as compact JSON, one per line, followed by the status line.
pub fn render<W>(reconciler: &GridReconciler<Value, W>) -> String
where
    W: GridWidget,
{
    let mut out = String::new();
    for row in reconciler.rows() {
        out.push_str(&row.to_string());
        out.push('\n');
    }
    out.push_str(&status_line(reconciler));
    out
}

/// The current page as a JSON document.
pub fn render_json<W>(reconciler: &GridReconciler<Value, W>) -> Result<String>
where
    W: GridWidget,
{
    let meta = reconciler
        .meta()
        .cloned()
        .ok_or_else(|| anyhow!("no page loaded"))?;
    let page = Page::new(reconciler.rows().to_vec(), meta);
    Ok(serde_json::to_string_pretty(&page)?)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use gridsync_core::{EngineConfig, FilterValue, PaginationMeta, QueryState, SourceError, Sort};
    use std::sync::{Arc, Mutex};

    use crate::screens;

    /// Answers every query with the same rows and records what was asked.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<QueryState>>,
    }

    impl DataSource<Value> for Recorder {
        fn fetch_page(&self, query: QueryState) -> BoxFuture<'static, Result<Page<Value>, SourceError>> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(query.clone());
            }
            let rows = vec![serde_json::json!({"id": 1, "name": "Red shirt"})];
            let meta = PaginationMeta::from_total(query.pagination, 1);
            Box::pin(async move { Ok(Page::new(rows, meta)) })
        }
    }

    fn open(screen: &str) -> (Console<Recorder>, Arc<Recorder>) {
        let spec = screens::find(screen).unwrap().spec;
        let source = Arc::new(Recorder::default());
        let console = ScreenSession::open(
            spec,
            EngineConfig::default(),
            LocalGrid::new(),
            Arc::clone(&source),
            None,
        );
        (console, source)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("search red shirt".parse::<Command>().unwrap(), Command::Search("red shirt".to_string()));
        assert_eq!("search".parse::<Command>().unwrap(), Command::Search(String::new()));
        assert_eq!(
            "filter status shipped,pending".parse::<Command>().unwrap(),
            Command::Filter {
                column: "status".to_string(),
                value: "shipped,pending".to_string()
            }
        );
        assert_eq!("page 3".parse::<Command>().unwrap(), Command::Page(3));
        assert_eq!(
            "sort price:desc".parse::<Command>().unwrap(),
            Command::Sort(Some(ColumnSort::desc("price")))
        );
        assert_eq!("sort".parse::<Command>().unwrap(), Command::Sort(None));
        assert_eq!("  ".parse::<Command>().unwrap(), Command::Show);
        assert_eq!("q".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert!("page 0".parse::<Command>().is_err());
        assert!("page two".parse::<Command>().is_err());
        assert!("filter status".parse::<Command>().is_err());
        assert!("sort price:sideways".parse::<Command>().is_err());
        assert!("launch".parse::<Command>().is_err());
    }

    #[test]
    fn test_seed_patch() {
        let spec = screens::find("items").unwrap().spec;
        let patch = seed_patch(
            &spec,
            Some("shirt"),
            &["available=true".to_string(), "sub_category_id=7,3".to_string()],
            Some(2),
            None,
            Some("price:desc"),
        )
        .unwrap();

        let state = spec.initial_state().merged(&patch);
        assert_eq!(state.filter("search"), Some(&FilterValue::from("shirt")));
        assert_eq!(state.filter("available"), Some(&FilterValue::from(true)));
        assert_eq!(state.filter("sub_category_id"), Some(&FilterValue::set([3_i64, 7])));
        assert_eq!(state.pagination.page, 2);
        assert_eq!(state.sort, Some(Sort::desc("price")));
    }

    #[test]
    fn test_seed_patch_rejects_unknown_and_invalid() {
        let spec = screens::find("orders").unwrap().spec;
        assert!(seed_patch(&spec, None, &["colour=red".to_string()], None, None, None).is_err());
        assert!(seed_patch(&spec, None, &["status=lost".to_string()], None, None, None).is_err());
        assert!(seed_patch(&spec, None, &["status".to_string()], None, None, None).is_err());
        assert!(seed_patch(&spec, None, &[], None, None, Some("colour")).is_err());
    }

    #[tokio::test]
    async fn test_filter_command_fetches() {
        let (mut console, source) = open("orders");
        console.run_until_idle().await;

        assert_eq!(apply(&mut console, Command::Filter {
            column: "status".to_string(),
            value: "shipped, pending".to_string(),
        }), None);
        console.run_until_idle().await;

        let calls = source.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1].filter("status"),
            Some(&FilterValue::set(["pending", "shipped"]))
        );
        assert!(status_line(console.reconciler()).ends_with(", filtered"));
    }

    #[tokio::test]
    async fn test_invalid_filter_is_reported() {
        let (mut console, source) = open("orders");
        console.run_until_idle().await;

        let message = apply(&mut console, Command::Filter {
            column: "status".to_string(),
            value: "lost".to_string(),
        });
        assert!(message.unwrap().starts_with("rejected:"));
        console.run_until_idle().await;
        assert_eq!(source.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_show_renders_rows_and_status() {
        let (mut console, _source) = open("items");
        console.run_until_idle().await;

        let text = apply(&mut console, Command::Show).unwrap();
        assert_eq!(
            text,
            "{\"id\":1,\"name\":\"Red shirt\"}\npage 1 of 1, 1 rows total"
        );
        assert!(render_json(console.reconciler()).unwrap().contains("\"total\": 1"));
    }
}
