//! Bridge configuration and deployment profiles.

use crate::connection::{ReconnectPolicy, SerialSettings};
use crate::ingest::{LineParser, DEFAULT_MAX_LINE_BYTES, DEFAULT_PREFIX_PATTERN};
use crate::server::MetricsServerConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Built-in deployment variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyMode {
    /// Exit on any device error or close; watchdog on readings.
    #[default]
    FailFast,
    /// Log errors and reopen the device after a fixed delay.
    Reconnect,
}

/// Serial device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyACM0`.
    pub device: String,
    pub baud_rate: u32,
    /// Blocking read poll interval in milliseconds.
    pub read_timeout_ms: u64,
    /// Partial lines longer than this are discarded.
    pub max_line_bytes: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyACM0".into(),
            baud_rate: 9600,
            read_timeout_ms: 1000,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub listen_addr: IpAddr,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3010,
        }
    }
}

/// Reading line settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingConfig {
    /// Regular expression a line must match to count as a reading.
    pub prefix_pattern: String,
}

impl Default for ReadingConfig {
    fn default() -> Self {
        Self {
            prefix_pattern: DEFAULT_PREFIX_PATTERN.into(),
        }
    }
}

/// Connection loss policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub mode: PolicyMode,
    /// Fail-fast only: maximum silence between readings.
    pub watchdog_secs: u64,
    /// Reconnect only: wait before each reopen attempt.
    pub reconnect_delay_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            mode: PolicyMode::FailFast,
            watchdog_secs: 30,
            reconnect_delay_secs: 5,
        }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub reading: ReadingConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl BridgeConfig {
    /// Defaults for a deployment variant.
    pub fn for_mode(mode: PolicyMode) -> Self {
        match mode {
            PolicyMode::FailFast => Self::default(),
            PolicyMode::Reconnect => Self {
                serial: SerialConfig {
                    device: "/dev/ttyUSB0".into(),
                    ..SerialConfig::default()
                },
                http: HttpConfig {
                    port: 3011,
                    ..HttpConfig::default()
                },
                policy: PolicyConfig {
                    mode: PolicyMode::Reconnect,
                    ..PolicyConfig::default()
                },
                ..Self::default()
            },
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// Keys missing from the file keep the values of `base`.
    pub fn from_file(base: &Self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(base, &content)
    }

    /// Parses TOML text layered over `base`.
    pub fn from_toml(base: &Self, content: &str) -> Result<Self, ConfigError> {
        let overlay: toml::Value =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let mut merged =
            toml::Value::try_from(base).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        merge(&mut merged, overlay);

        let config: BridgeConfig = merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.device.trim().is_empty() {
            return Err(ConfigError::MissingDevice);
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::InvalidBaudRate);
        }
        if self.serial.read_timeout_ms == 0 || self.serial.max_line_bytes == 0 {
            return Err(ConfigError::InvalidSerialLimits);
        }
        match self.policy.mode {
            PolicyMode::FailFast if self.policy.watchdog_secs == 0 => {
                return Err(ConfigError::InvalidDuration("watchdog_secs"));
            }
            PolicyMode::Reconnect if self.policy.reconnect_delay_secs == 0 => {
                return Err(ConfigError::InvalidDuration("reconnect_delay_secs"));
            }
            _ => {}
        }
        self.line_parser()?;
        Ok(())
    }

    /// Builds the line parser from the prefix pattern.
    pub fn line_parser(&self) -> Result<LineParser, ConfigError> {
        LineParser::from_pattern(&self.reading.prefix_pattern)
            .map_err(|e| ConfigError::InvalidPattern(e.to_string()))
    }

    /// Connection policy selected by `policy.mode`.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        match self.policy.mode {
            PolicyMode::FailFast => ReconnectPolicy::FailFast {
                watchdog: Duration::from_secs(self.policy.watchdog_secs),
            },
            PolicyMode::Reconnect => ReconnectPolicy::Reconnect {
                delay: Duration::from_secs(self.policy.reconnect_delay_secs),
            },
        }
    }

    /// Settings for the serial connector.
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            path: self.serial.device.clone(),
            baud_rate: self.serial.baud_rate,
            read_timeout: Duration::from_millis(self.serial.read_timeout_ms),
        }
    }

    /// Settings for the metrics server.
    pub fn server_config(&self) -> MetricsServerConfig {
        MetricsServerConfig {
            bind_addr: SocketAddr::new(self.http.listen_addr, self.http.port),
        }
    }
}

fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("serial device path is empty")]
    MissingDevice,
    #[error("baud rate must be non-zero")]
    InvalidBaudRate,
    #[error("serial read timeout and line limit must be non-zero")]
    InvalidSerialLimits,
    #[error("{0} must be non-zero")]
    InvalidDuration(&'static str),
    #[error("invalid reading prefix pattern: {0}")]
    InvalidPattern(String),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.device, "/dev/ttyACM0");
        assert_eq!(config.server_config().bind_addr.port(), 3010);
        assert_eq!(
            config.reconnect_policy(),
            ReconnectPolicy::FailFast {
                watchdog: Duration::from_secs(30)
            }
        );
    }

    #[test]
    fn test_reconnect_profile() {
        let config = BridgeConfig::for_mode(PolicyMode::Reconnect);
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.device, "/dev/ttyUSB0");
        assert_eq!(config.http.port, 3011);
        assert_eq!(
            config.reconnect_policy(),
            ReconnectPolicy::Reconnect {
                delay: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn test_file_overrides_profile() {
        let base = BridgeConfig::for_mode(PolicyMode::Reconnect);
        let config = BridgeConfig::from_toml(
            &base,
            r#"
                [serial]
                device = "/dev/ttyS3"

                [policy]
                reconnect_delay_secs = 12
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.device, "/dev/ttyS3");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.http.port, 3011);
        assert_eq!(config.policy.mode, PolicyMode::Reconnect);
        assert_eq!(config.policy.reconnect_delay_secs, 12);
    }

    #[test]
    fn test_file_can_switch_mode() {
        let config = BridgeConfig::from_toml(
            &BridgeConfig::default(),
            r#"
                [policy]
                mode = "reconnect"
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.reconnect_policy(),
            ReconnectPolicy::Reconnect { .. }
        ));
    }

    #[test]
    fn test_zero_watchdog_invalid() {
        let mut config = BridgeConfig::default();
        config.policy.watchdog_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDuration("watchdog_secs"))
        ));

        // Unused by the reconnect policy.
        config.policy.mode = PolicyMode::Reconnect;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_pattern_invalid() {
        let mut config = BridgeConfig::default();
        config.reading.prefix_pattern = "^(grove".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_empty_device_invalid() {
        let mut config = BridgeConfig::default();
        config.serial.device = "  ".into();
        assert!(matches!(config.validate(), Err(ConfigError::MissingDevice)));
    }

    #[test]
    fn test_malformed_toml() {
        let result = BridgeConfig::from_toml(&BridgeConfig::default(), "[serial\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = BridgeConfig::from_file(&BridgeConfig::default(), "/nonexistent/bridge.toml");
        assert!(matches!(result, Err(ConfigError::FileReadError(_))));
    }
}
