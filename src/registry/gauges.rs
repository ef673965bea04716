//! Gauge storage backed by a Prometheus registry.

use prometheus::{Encoder, Gauge, Registry, TextEncoder};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("exposition output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Registry of named gauges, one per distinct reading name.
///
/// Gauges are created the first time a name is observed and are never
/// removed. Every gauge's help text is its own name.
pub struct GaugeRegistry {
    registry: Registry,
    gauges: HashMap<String, Gauge>,
}

impl GaugeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            gauges: HashMap::new(),
        }
    }

    /// Sets the gauge for `name`, creating and registering it on first use.
    ///
    /// Fails if the name is not a valid Prometheus metric name; the registry
    /// is left untouched in that case.
    pub fn set(&mut self, name: &str, value: f64) -> Result<(), MetricsError> {
        if let Some(gauge) = self.gauges.get(name) {
            gauge.set(value);
            return Ok(());
        }

        let gauge = Gauge::new(name, name)?;
        self.registry.register(Box::new(gauge.clone()))?;
        gauge.set(value);
        tracing::debug!(name = %name, "Registered new gauge");
        self.gauges.insert(name.to_owned(), gauge);
        Ok(())
    }

    /// Returns the current value of a gauge, if it exists.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.gauges.get(name).map(Gauge::get)
    }

    /// Number of gauges observed so far.
    pub fn len(&self) -> usize {
        self.gauges.len()
    }

    /// Returns true if no reading has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty()
    }

    /// Full copy of every gauge's current value.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.gauges
            .iter()
            .map(|(name, gauge)| (name.clone(), gauge.get()))
            .collect()
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all gauges in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for GaugeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GaugeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaugeRegistry")
            .field("gauges", &self.gauges.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_creates_gauge() {
        let mut registry = GaugeRegistry::new();
        assert!(registry.is_empty());

        registry.set("grove_sensor_temp", 235.0).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("grove_sensor_temp"), Some(235.0));
    }

    #[test]
    fn test_set_overwrites() {
        let mut registry = GaugeRegistry::new();
        registry.set("grove_sensor_temp", 235.0).unwrap();
        registry.set("grove_sensor_temp", 240.5).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("grove_sensor_temp"), Some(240.5));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let mut registry = GaugeRegistry::new();
        assert!(registry.set("grove-sensor", 1.0).is_err());
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_snapshot_is_copy() {
        let mut registry = GaugeRegistry::new();
        registry.set("grove_sensor_a", 1.0).unwrap();
        let snapshot = registry.snapshot();

        registry.set("grove_sensor_a", 2.0).unwrap();
        assert_eq!(snapshot.get("grove_sensor_a"), Some(&1.0));
        assert_eq!(registry.get("grove_sensor_a"), Some(2.0));
    }

    #[test]
    fn test_encode_contains_samples() {
        let mut registry = GaugeRegistry::new();
        registry.set("grove_sensor_light", 512.0).unwrap();
        registry.set("grove_sensor_press", 101.3).unwrap();

        let output = registry.encode().unwrap();
        assert!(output.contains("# HELP grove_sensor_light grove_sensor_light"));
        assert!(output.contains("# TYPE grove_sensor_light gauge"));
        assert!(output.contains("grove_sensor_light 512"));
        assert!(output.contains("grove_sensor_press 101.3"));
    }

    #[test]
    fn test_encode_empty() {
        let registry = GaugeRegistry::new();
        assert_eq!(registry.encode().unwrap(), "");
    }
}
