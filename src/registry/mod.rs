//! In-memory gauge registry.
//!
//! Holds the latest value of every reading seen on the serial link and
//! renders them in the Prometheus text exposition format. Gauge names
//! come straight from the device, so a name that Prometheus rejects
//! surfaces as a [`MetricsError`] rather than a panic.

mod gauges;

pub use gauges::{GaugeRegistry, MetricsError};
