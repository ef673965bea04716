//! Bridge configuration.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. the built-in defaults of a [`PolicyMode`] profile
//! 2. an optional TOML file
//! 3. command-line overrides applied by the binary
//!
//! ```toml
//! [serial]
//! device = "/dev/ttyACM0"
//! baud_rate = 9600
//!
//! [http]
//! port = 3010
//!
//! [reading]
//! prefix_pattern = "^grove_sensor"
//!
//! [policy]
//! mode = "fail-fast"      # or "reconnect"
//! watchdog_secs = 30
//! reconnect_delay_secs = 5
//! ```

mod file;

pub use file::{
    BridgeConfig, ConfigError, HttpConfig, PolicyConfig, PolicyMode, ReadingConfig, SerialConfig,
};
