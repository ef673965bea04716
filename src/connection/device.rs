//! Serial device abstraction.
//!
//! A [`Connector`] starts open attempts and reports everything that
//! happens on the link as [`DeviceEvent`]s over a channel, so the driver
//! never blocks on device I/O.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Errors that can occur during device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("cannot open {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Something that happened on the serial link.
#[derive(Debug)]
pub enum DeviceEvent {
    Opened,
    OpenFailed(DeviceError),
    /// Raw bytes, not yet split into lines.
    Data(Vec<u8>),
    Error(DeviceError),
    Closed,
}

/// Source of serial connections.
pub trait Connector: Send + 'static {
    /// Human-readable device identifier for logs.
    fn name(&self) -> &str;

    /// Starts an open attempt.
    ///
    /// Exactly one of `Opened` or `OpenFailed` is sent first; after
    /// `Opened`, data and errors follow until `Closed`.
    ///
    /// [`SerialConnector`] stops reading after any runtime read error, so
    /// on a real port an `Error` is always followed by `Closed`.
    fn connect(&mut self, events: UnboundedSender<DeviceEvent>);
}

/// Serial link settings.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub path: String,
    pub baud_rate: u32,
    /// Poll interval of the blocking reader; timeouts are not errors.
    pub read_timeout: Duration,
}

/// Connector for a real serial port.
///
/// Each connection runs a dedicated reader thread because the
/// `serialport` API is blocking.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    settings: SerialSettings,
}

impl SerialConnector {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }
}

impl Connector for SerialConnector {
    fn name(&self) -> &str {
        &self.settings.path
    }

    fn connect(&mut self, events: UnboundedSender<DeviceEvent>) {
        let settings = self.settings.clone();
        let reader_events = events.clone();
        let spawned = std::thread::Builder::new()
            .name("serial-reader".into())
            .spawn(move || read_port(settings, reader_events));

        if let Err(e) = spawned {
            let _ = events.send(DeviceEvent::OpenFailed(DeviceError::Io(e)));
        }
    }
}

fn read_port(settings: SerialSettings, events: UnboundedSender<DeviceEvent>) {
    let mut port = match serialport::new(&settings.path, settings.baud_rate)
        .timeout(settings.read_timeout)
        .open()
    {
        Ok(port) => port,
        Err(e) => {
            let _ = events.send(DeviceEvent::OpenFailed(DeviceError::Open {
                path: settings.path,
                reason: e.to_string(),
            }));
            return;
        }
    };

    if events.send(DeviceEvent::Opened).is_err() {
        return;
    }

    let mut buf = [0u8; 256];
    loop {
        match port.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if events.send(DeviceEvent::Data(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => {
                if events.is_closed() {
                    return;
                }
            }
            Err(e) => {
                let _ = events.send(DeviceEvent::Error(DeviceError::Io(e)));
                break;
            }
        }
    }

    let _ = events.send(DeviceEvent::Closed);
}

#[derive(Debug, Default)]
struct MockLink {
    open_failures: VecDeque<String>,
    session: Option<UnboundedSender<DeviceEvent>>,
    attempts: usize,
}

/// Scripted connector for tests and demos.
///
/// Clones share one link, so a test keeps a handle to push lines, errors
/// and closes while the driver owns another.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    link: Arc<Mutex<MockLink>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn link(&self) -> MutexGuard<'_, MockLink> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next open attempt fail with `reason`.
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.link().open_failures.push_back(reason.into());
    }

    /// Number of open attempts so far.
    pub fn attempts(&self) -> usize {
        self.link().attempts
    }

    /// Sends `line` plus the newline delimiter. Returns false if no
    /// connection is open.
    pub fn send_line(&self, line: &str) -> bool {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.send_bytes(bytes)
    }

    /// Sends raw bytes on the open connection.
    pub fn send_bytes(&self, bytes: Vec<u8>) -> bool {
        self.send(DeviceEvent::Data(bytes))
    }

    /// Reports a runtime error without closing.
    pub fn send_error(&self, reason: &str) -> bool {
        self.send(DeviceEvent::Error(DeviceError::Io(std::io::Error::new(
            ErrorKind::Other,
            reason.to_owned(),
        ))))
    }

    /// Closes the open connection.
    pub fn close(&self) -> bool {
        let session = self.link().session.take();
        session.is_some_and(|tx| tx.send(DeviceEvent::Closed).is_ok())
    }

    fn send(&self, event: DeviceEvent) -> bool {
        self.link()
            .session
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }
}

impl Connector for MockConnector {
    fn name(&self) -> &str {
        "mock"
    }

    fn connect(&mut self, events: UnboundedSender<DeviceEvent>) {
        let mut link = self.link();
        link.attempts += 1;

        match link.open_failures.pop_front() {
            Some(reason) => {
                let _ = events.send(DeviceEvent::OpenFailed(DeviceError::Open {
                    path: "mock".into(),
                    reason,
                }));
            }
            None => {
                if events.send(DeviceEvent::Opened).is_ok() {
                    link.session = Some(events);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_mock_lifecycle() {
        let mut connector = MockConnector::new();
        let handle = connector.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(!handle.send_line("grove_sensor_temp 1"));

        connector.connect(tx);
        assert_eq!(handle.attempts(), 1);
        assert!(matches!(rx.try_recv(), Ok(DeviceEvent::Opened)));

        assert!(handle.send_line("grove_sensor_temp 1"));
        assert!(matches!(
            rx.try_recv(),
            Ok(DeviceEvent::Data(bytes)) if bytes == b"grove_sensor_temp 1\n"
        ));

        assert!(handle.close());
        assert!(matches!(rx.try_recv(), Ok(DeviceEvent::Closed)));
        assert!(!handle.close());
    }

    #[test]
    fn test_mock_scripted_open_failure() {
        let mut connector = MockConnector::new();
        connector.fail_next_open("device busy");
        let (tx, mut rx) = mpsc::unbounded_channel();

        connector.connect(tx.clone());
        assert!(matches!(
            rx.try_recv(),
            Ok(DeviceEvent::OpenFailed(DeviceError::Open { reason, .. })) if reason == "device busy"
        ));
        assert!(!connector.send_line("x"));

        connector.connect(tx);
        assert!(matches!(rx.try_recv(), Ok(DeviceEvent::Opened)));
        assert_eq!(connector.attempts(), 2);
    }

    #[test]
    fn test_serial_open_failure_reported() {
        let mut connector = SerialConnector::new(SerialSettings {
            path: "/dev/does-not-exist-sensor-bridge".into(),
            baud_rate: 9600,
            read_timeout: Duration::from_millis(50),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        connector.connect(tx);
        assert!(matches!(
            rx.blocking_recv(),
            Some(DeviceEvent::OpenFailed(DeviceError::Open { .. }))
        ));
    }
}
