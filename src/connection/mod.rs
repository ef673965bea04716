//! Serial connection lifecycle.
//!
//! The lifecycle is split in three layers:
//!
//! - [`transition`]: pure `(state, event) -> (state, effects)` table,
//!   parameterised by a [`ReconnectPolicy`]
//! - [`Connector`]: opens the device and reports link events
//! - [`Ingestor`]: async driver that runs the table, owns the watchdog
//!   and reconnect timers, and writes readings into the shared state
//!
//! # Policies
//!
//! - [`ReconnectPolicy::FailFast`]: any error or close terminates the
//!   process, and a watchdog terminates it if readings stop arriving.
//! - [`ReconnectPolicy::Reconnect`]: errors are logged, a close revokes
//!   readiness and schedules a reopen after a fixed delay, forever.
//!
//! In both policies a failure of the very first open is fatal.

mod device;
mod driver;
mod machine;

pub use device::{
    Connector, DeviceError, DeviceEvent, MockConnector, SerialConnector, SerialSettings,
};
pub use driver::{Ingestor, Termination};
pub use machine::{
    transition, ConnectionState, Effect, Event, FatalReason, ReconnectPolicy, Severity,
    Transition,
};
