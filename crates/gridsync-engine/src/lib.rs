//! Filter/pagination reconciliation engine.
//!
//! Keeps a data grid's local filter, sort and pagination state in step with
//! a canonical [`QueryStore`], and turns every effective change into exactly
//! one server fetch:
//!
//! - [`QueryStore`]: observable query state, one broadcast per change
//! - [`DebouncedText`]: search input with a quiet period
//! - [`GridWidget`] / [`LocalGrid`]: the widget seam and its in-memory grid
//! - [`DataSource`]: paged reads returning boxed futures
//! - [`GridReconciler`]: the two-way sync state machine
//! - [`ScreenSession`]: async loop dispatching fetches for a reconciler

mod debounce;
mod reconciler;
mod session;
mod source;
mod store;
mod widget;

pub use debounce::{DebouncedText, SettledCallback};
pub use reconciler::{EventOutcome, FetchTicket, GridReconciler, ResponseOutcome, SyncPhase};
pub use session::{ScreenSession, SessionEvent};
pub use source::DataSource;
pub use store::{ChangeOrigin, QueryChange, QueryStore};
pub use widget::{GridWidget, LocalGrid};
