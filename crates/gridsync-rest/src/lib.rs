//! HTTP data source for gridsync screens.
//!
//! Encodes a [`gridsync_core::QueryState`] as list-endpoint parameters and
//! decodes the backend's response envelopes into pages.

mod client;
mod envelope;
mod params;

pub use client::{normalize_base_url, RestSource};
pub use envelope::{decode_page, decode_record, error_message};
pub use params::query_params;
