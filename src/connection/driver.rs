//! Async driver executing the connection state machine.

use super::device::{Connector, DeviceEvent};
use super::machine::{
    transition, ConnectionState, Effect, Event, FatalReason, ReconnectPolicy, Severity,
};
use crate::ingest::{LineFramer, LineParser};
use crate::state::SharedState;
use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, Sleep};

/// Outcome of a driver run: the process must exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    pub reason: FatalReason,
}

impl Termination {
    /// Process exit status for every fatal condition.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// At most one pending timer of a given kind.
#[derive(Default)]
struct TimerSlot {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TimerSlot {
    /// Arms the timer, replacing any pending deadline.
    fn arm(&mut self, after: Duration) {
        let deadline = Instant::now() + after;
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.sleep = Some(Box::pin(tokio::time::sleep_until(deadline))),
        }
    }

    fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Resolves when the armed timer fires; never resolves when disarmed.
    async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().await,
            None => pending().await,
        }
        self.sleep = None;
    }
}

enum Wake {
    Device(DeviceEvent),
    Watchdog,
    Reconnect,
}

/// Owns the serial connection and feeds readings into the shared state.
///
/// All state transitions and registry writes happen on the task that
/// runs [`Ingestor::run`].
pub struct Ingestor<C: Connector> {
    connector: C,
    parser: LineParser,
    policy: ReconnectPolicy,
    shared: SharedState,
    state: ConnectionState,
    framer: LineFramer,
    events_tx: UnboundedSender<DeviceEvent>,
    events_rx: UnboundedReceiver<DeviceEvent>,
    watchdog: TimerSlot,
    reconnect: TimerSlot,
}

impl<C: Connector> Ingestor<C> {
    /// Creates a driver; nothing happens until [`Ingestor::run`].
    pub fn new(
        connector: C,
        parser: LineParser,
        policy: ReconnectPolicy,
        shared: SharedState,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            parser,
            policy,
            shared,
            state: ConnectionState::Closed,
            framer: LineFramer::default(),
            events_tx,
            events_rx,
            watchdog: TimerSlot::default(),
            reconnect: TimerSlot::default(),
        }
    }

    /// Replaces the line framer, e.g. to change the maximum line length.
    pub fn with_framer(mut self, framer: LineFramer) -> Self {
        self.framer = framer;
        self
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    /// Opens the device and processes events until a fatal condition.
    pub async fn run(mut self) -> Termination {
        tracing::info!(device = %self.connector.name(), "Opening serial port");
        self.connector.connect(self.events_tx.clone());

        loop {
            let wake = tokio::select! {
                Some(event) = self.events_rx.recv() => Wake::Device(event),
                _ = self.watchdog.fired() => Wake::Watchdog,
                _ = self.reconnect.fired() => Wake::Reconnect,
            };

            let event = match wake {
                Wake::Device(event) => self.translate(event).await,
                Wake::Watchdog => Some(Event::WatchdogExpired),
                Wake::Reconnect => Some(Event::ReconnectDue),
            };

            if let Some(event) = event {
                if let Some(termination) = self.dispatch(event).await {
                    return termination;
                }
            }
        }
    }

    async fn translate(&mut self, event: DeviceEvent) -> Option<Event> {
        match event {
            DeviceEvent::Opened => {
                self.framer.reset();
                Some(Event::OpenSucceeded)
            }
            DeviceEvent::OpenFailed(e) => Some(Event::OpenFailed(e.to_string())),
            DeviceEvent::Error(e) => Some(Event::DeviceError(e.to_string())),
            DeviceEvent::Closed => Some(Event::DeviceClosed),
            DeviceEvent::Data(bytes) => {
                let lines = self.framer.push(&bytes);
                if lines.is_empty() {
                    return None;
                }

                let mut shared = self.shared.write().await;
                let mut accepted = false;
                for line in &lines {
                    accepted |= self.parser.apply(line, shared.registry_mut()).is_recorded();
                }
                accepted.then_some(Event::ReadingAccepted)
            }
        }
    }

    async fn dispatch(&mut self, event: Event) -> Option<Termination> {
        let next = transition(self.state, &self.policy, event);
        if next.state != self.state {
            tracing::debug!(from = ?self.state, to = ?next.state, "Connection state changed");
        }
        self.state = next.state;

        for effect in next.effects {
            match effect {
                Effect::SetReady(ready) => self.shared.write().await.set_ready(ready),
                Effect::ArmWatchdog(after) => self.watchdog.arm(after),
                Effect::ArmReconnect(after) => self.reconnect.arm(after),
                Effect::Reopen => self.connector.connect(self.events_tx.clone()),
                Effect::Log(severity, message) => self.log(severity, &message),
                Effect::Terminate(reason) => return Some(Termination { reason }),
            }
        }

        debug_assert!(!(self.watchdog.is_armed() && self.reconnect.is_armed()));
        None
    }

    fn log(&self, severity: Severity, message: &str) {
        let device = self.connector.name();
        match severity {
            Severity::Debug => tracing::debug!(device = %device, "{message}"),
            Severity::Info => tracing::info!(device = %device, "{message}"),
            Severity::Warn => tracing::warn!(device = %device, "{message}"),
            Severity::Error => tracing::error!(device = %device, "{message}"),
        }
    }
}
