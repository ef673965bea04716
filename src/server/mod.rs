//! HTTP front door.
//!
//! Serves `GET /metrics` from any [`MetricsSource`](crate::state::MetricsSource):
//!
//! - `200` with the exposition text when the source is ready
//! - `503` with an empty body when it is not
//! - `500` with `{"error": "..."}` when encoding fails
//!
//! No other route is served.

mod http;

pub use http::{router, MetricsServer, MetricsServerConfig, ServerError, EXPOSITION_CONTENT_TYPE};
