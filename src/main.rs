//! Serial Sensor Gauge Bridge
//!
//! Reads sensor readings from a serial device and serves them as
//! Prometheus gauges on `GET /metrics`.

use clap::Parser;
use sensor_gauge_bridge::{
    config::{BridgeConfig, ConfigError, PolicyMode},
    connection::{Ingestor, SerialConnector},
    ingest::LineFramer,
    server::MetricsServer,
    state::BridgeState,
};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sensor-gauge-bridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Expose serial sensor readings as Prometheus gauges")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Deployment profile providing the defaults
    #[arg(long, value_enum, default_value_t = PolicyMode::FailFast)]
    profile: PolicyMode,

    /// Serial device path
    #[arg(short, long)]
    device: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud_rate: Option<u32>,

    /// HTTP listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn load_config(&self) -> Result<BridgeConfig, ConfigError> {
        let base = BridgeConfig::for_mode(self.profile);
        let mut config = match &self.config {
            Some(path) => BridgeConfig::from_file(&base, path)?,
            None => base,
        };

        if let Some(device) = &self.device {
            config.serial.device = device.clone();
        }
        if let Some(baud_rate) = self.baud_rate {
            config.serial.baud_rate = baud_rate;
        }
        if let Some(port) = self.port {
            config.http.port = port;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.into()),
        )
        .init();

    info!("Serial Sensor Gauge Bridge v{}", sensor_gauge_bridge::VERSION);

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let parser = match config.line_parser() {
        Ok(parser) => parser,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        device = %config.serial.device,
        baud_rate = config.serial.baud_rate,
        mode = ?config.policy.mode,
        prefix = %parser.pattern(),
        "Starting bridge"
    );

    let shared = BridgeState::shared();
    let server = MetricsServer::new(config.server_config(), shared.clone());
    let ingestor = Ingestor::new(
        SerialConnector::new(config.serial_settings()),
        parser,
        config.reconnect_policy(),
        shared,
    )
    .with_framer(LineFramer::new(config.serial.max_line_bytes));

    tokio::select! {
        termination = ingestor.run() => {
            error!(reason = %termination.reason, "Terminating");
            std::process::exit(termination.exit_code());
        }
        result = server.run() => {
            if let Err(e) = result {
                error!("Metrics server failed: {}", e);
                std::process::exit(1);
            }
        }
    }
}
