//! Readiness gate in front of the metrics endpoint.

/// Boolean guard mirroring whether the serial connection is open.
///
/// Starts closed. Only the connection driver flips it; HTTP handlers
/// only read it.
#[derive(Debug, Clone, Default)]
pub struct ReadinessGate {
    ready: bool,
}

impl ReadinessGate {
    /// Creates a closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if metrics may be served.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Sets readiness, returning the previous value.
    pub fn set(&mut self, ready: bool) -> bool {
        std::mem::replace(&mut self.ready, ready)
    }
}
