//! Serial Sensor Gauge Bridge Library
//!
//! Reads newline-delimited `<name> <value>` readings from a serial
//! sensor board, keeps the latest value of each reading as a Prometheus
//! gauge, and serves the gauges over HTTP while the device is connected.
//!
//! # Architecture
//!
//! ```text
//! serial bytes → framing → line parser → gauge registry
//!                                             ↑
//! GET /metrics → readiness gate ──────────────┘
//!                     ↑
//!        connection state machine (open / close / error / timers)
//! ```
//!
//! # Design Principles
//!
//! - **Fail-closed**: metrics are only served while the device is open
//! - **One writer**: only the connection driver mutates shared state
//! - **Pure transitions**: connection policy is a table of
//!   `(state, event) -> (state, effects)`, testable without I/O
//! - **Malformed lines never stop the stream**: they are logged and dropped
//!
//! # Example
//!
//! ```no_run
//! use sensor_gauge_bridge::{
//!     config::{BridgeConfig, PolicyMode},
//!     connection::{Ingestor, SerialConnector},
//!     server::MetricsServer,
//!     state::BridgeState,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeConfig::for_mode(PolicyMode::Reconnect);
//! let shared = BridgeState::shared();
//!
//! let server = MetricsServer::new(config.server_config(), shared.clone());
//! let ingestor = Ingestor::new(
//!     SerialConnector::new(config.serial_settings()),
//!     config.line_parser()?,
//!     config.reconnect_policy(),
//!     shared,
//! );
//!
//! tokio::select! {
//!     termination = ingestor.run() => std::process::exit(termination.exit_code()),
//!     result = server.run() => result?,
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod ingest;
pub mod registry;
pub mod server;
pub mod state;

// Re-export commonly used types at crate root
pub use config::{BridgeConfig, ConfigError, PolicyMode};
pub use connection::{
    ConnectionState, Connector, Ingestor, MockConnector, ReconnectPolicy, SerialConnector,
    Termination,
};
pub use ingest::{LineOutcome, LineParser, ReadingValue};
pub use registry::{GaugeRegistry, MetricsError};
pub use server::{MetricsServer, MetricsServerConfig};
pub use state::{BridgeState, MetricsSource, ReadinessGate, SharedState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
