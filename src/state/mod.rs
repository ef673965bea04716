//! Shared bridge state.
//!
//! [`BridgeState`] is the single context object that ties the readiness
//! gate to the gauge registry. The connection driver is its only writer;
//! the HTTP layer reads it through [`MetricsSource`] while holding one
//! read guard, so readiness and gauge values always come from the same
//! moment.

mod gate;

pub use gate::ReadinessGate;

use crate::registry::{GaugeRegistry, MetricsError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Handle shared between the connection driver and the HTTP server.
pub type SharedState = Arc<RwLock<BridgeState>>;

/// Read-only view of the bridge consumed by the metrics endpoint.
pub trait MetricsSource: Send + Sync + 'static {
    /// Current readiness.
    fn is_ready(&self) -> bool;

    /// Full copy of every gauge value.
    fn snapshot(&self) -> BTreeMap<String, f64>;

    /// Exposition text for every gauge.
    fn encode(&self) -> Result<String, MetricsError>;
}

/// Readiness plus gauges for one serial device.
#[derive(Debug, Default)]
pub struct BridgeState {
    gate: ReadinessGate,
    registry: GaugeRegistry,
}

impl BridgeState {
    /// Creates a not-ready state with an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the state wrapped for sharing.
    pub fn shared() -> SharedState {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Flips the readiness gate.
    pub fn set_ready(&mut self, ready: bool) {
        let previous = self.gate.set(ready);
        if previous != ready {
            tracing::debug!(ready, "Readiness changed");
        }
    }

    /// Returns the readiness gate.
    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    /// Returns the gauge registry.
    pub fn registry(&self) -> &GaugeRegistry {
        &self.registry
    }

    /// Mutable registry access for the line parser.
    pub fn registry_mut(&mut self) -> &mut GaugeRegistry {
        &mut self.registry
    }
}

impl MetricsSource for BridgeState {
    fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    fn snapshot(&self) -> BTreeMap<String, f64> {
        self.registry.snapshot()
    }

    fn encode(&self) -> Result<String, MetricsError> {
        self.registry.encode()
    }
}
