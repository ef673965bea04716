//! Serial connection state machine.
//!
//! [`transition`] is a pure function from `(state, policy, event)` to the
//! next state plus the effects the driver must carry out. Nothing in
//! here touches timers, the device or the process.

use std::time::Duration;
use thiserror::Error;

/// How the bridge reacts to losing the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Any runtime error or close is fatal. A reading must arrive at least
    /// once per `watchdog` while open, or the process terminates.
    FailFast { watchdog: Duration },
    /// Errors are logged only; a close schedules a reopen after `delay`,
    /// forever, with no backoff growth.
    Reconnect { delay: Duration },
}

/// Lifecycle of the serial connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial state; the first open attempt is in flight.
    Closed,
    /// Device open, readings flowing.
    Open,
    /// Connection lost; a reopen is scheduled or in flight.
    Reconnecting,
    /// Terminal; the process is about to exit.
    Failed,
}

impl ConnectionState {
    /// True only for [`ConnectionState::Open`].
    pub fn is_ready(self) -> bool {
        self == Self::Open
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    OpenSucceeded,
    OpenFailed(String),
    DeviceError(String),
    DeviceClosed,
    /// A line was parsed into a gauge update.
    ReadingAccepted,
    WatchdogExpired,
    ReconnectDue,
}

/// Why the process has to stop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalReason {
    #[error("failed to open serial device: {0}")]
    OpenFailed(String),
    #[error("serial device error: {0}")]
    DeviceError(String),
    #[error("serial device closed unexpectedly")]
    UnexpectedClose,
    #[error("no reading received within {0:?}")]
    WatchdogExpired(Duration),
}

/// Log level attached to a [`Effect::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// Work the driver performs after a transition, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SetReady(bool),
    /// Replace any pending watchdog with one firing after the duration.
    ArmWatchdog(Duration),
    /// Replace any pending reconnect timer with one firing after the duration.
    ArmReconnect(Duration),
    /// Start a new open attempt.
    Reopen,
    Log(Severity, String),
    Terminate(FatalReason),
}

/// Result of one [`transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: ConnectionState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(state: ConnectionState, effects: Vec<Effect>) -> Self {
        Self { state, effects }
    }

    fn stay(state: ConnectionState) -> Self {
        Self::to(state, Vec::new())
    }

    fn fail(reason: FatalReason) -> Self {
        Self::to(
            ConnectionState::Failed,
            vec![
                Effect::SetReady(false),
                Effect::Log(Severity::Error, reason.to_string()),
                Effect::Terminate(reason),
            ],
        )
    }
}

/// Computes the next state and effects for `event`.
pub fn transition(state: ConnectionState, policy: &ReconnectPolicy, event: Event) -> Transition {
    use ConnectionState::*;

    match (state, event) {
        (Failed, _) => Transition::stay(Failed),

        (Closed | Reconnecting, Event::OpenSucceeded) => {
            let mut effects = vec![
                Effect::SetReady(true),
                Effect::Log(Severity::Info, "Serial port opened".to_owned()),
            ];
            if let ReconnectPolicy::FailFast { watchdog } = *policy {
                effects.push(Effect::ArmWatchdog(watchdog));
            }
            Transition::to(Open, effects)
        }

        (Closed, Event::OpenFailed(reason)) => Transition::fail(FatalReason::OpenFailed(reason)),

        (Reconnecting, Event::OpenFailed(reason)) => match *policy {
            ReconnectPolicy::Reconnect { delay } => Transition::to(
                Reconnecting,
                vec![
                    Effect::Log(Severity::Warn, format!("Reopen attempt failed: {reason}")),
                    Effect::ArmReconnect(delay),
                ],
            ),
            ReconnectPolicy::FailFast { .. } => Transition::fail(FatalReason::OpenFailed(reason)),
        },

        (current, Event::DeviceError(reason)) => match policy {
            ReconnectPolicy::FailFast { .. } => Transition::fail(FatalReason::DeviceError(reason)),
            ReconnectPolicy::Reconnect { .. } => Transition::to(
                current,
                vec![Effect::Log(
                    Severity::Warn,
                    format!("Serial port error: {reason}"),
                )],
            ),
        },

        (Open, Event::DeviceClosed) => match *policy {
            ReconnectPolicy::FailFast { .. } => Transition::fail(FatalReason::UnexpectedClose),
            ReconnectPolicy::Reconnect { delay } => Transition::to(
                Reconnecting,
                vec![
                    Effect::SetReady(false),
                    Effect::Log(
                        Severity::Warn,
                        format!("Serial port closed, reconnecting in {delay:?}"),
                    ),
                    Effect::ArmReconnect(delay),
                ],
            ),
        },

        (Open, Event::ReadingAccepted) => match *policy {
            ReconnectPolicy::FailFast { watchdog } => {
                Transition::to(Open, vec![Effect::ArmWatchdog(watchdog)])
            }
            ReconnectPolicy::Reconnect { .. } => Transition::stay(Open),
        },

        (Open, Event::WatchdogExpired) => match *policy {
            ReconnectPolicy::FailFast { watchdog } => {
                Transition::fail(FatalReason::WatchdogExpired(watchdog))
            }
            ReconnectPolicy::Reconnect { .. } => Transition::stay(Open),
        },

        (Reconnecting, Event::ReconnectDue) => Transition::to(
            Reconnecting,
            vec![
                Effect::Log(Severity::Info, "Attempting to reopen serial port".to_owned()),
                Effect::Reopen,
            ],
        ),

        (current, event) => Transition::to(
            current,
            vec![Effect::Log(
                Severity::Debug,
                format!("Ignoring {event:?} while {current:?}"),
            )],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FAIL_FAST: ReconnectPolicy = ReconnectPolicy::FailFast {
        watchdog: Duration::from_secs(30),
    };
    const RECONNECT: ReconnectPolicy = ReconnectPolicy::Reconnect {
        delay: Duration::from_secs(5),
    };

    fn terminates(t: &Transition) -> bool {
        t.effects.iter().any(|e| matches!(e, Effect::Terminate(_)))
    }

    #[test]
    fn test_open_success_arms_watchdog_in_fail_fast() {
        let t = transition(ConnectionState::Closed, &FAIL_FAST, Event::OpenSucceeded);
        assert_eq!(t.state, ConnectionState::Open);
        assert!(t.effects.contains(&Effect::SetReady(true)));
        assert!(t.effects.contains(&Effect::ArmWatchdog(Duration::from_secs(30))));
    }

    #[test]
    fn test_open_success_no_watchdog_in_reconnect() {
        let t = transition(ConnectionState::Closed, &RECONNECT, Event::OpenSucceeded);
        assert_eq!(t.state, ConnectionState::Open);
        assert!(!t.effects.iter().any(|e| matches!(e, Effect::ArmWatchdog(_))));
    }

    #[test]
    fn test_initial_open_failure_is_fatal_for_both_policies() {
        for policy in [FAIL_FAST, RECONNECT] {
            let t = transition(
                ConnectionState::Closed,
                &policy,
                Event::OpenFailed("no such device".into()),
            );
            assert_eq!(t.state, ConnectionState::Failed);
            assert!(t.effects.contains(&Effect::Terminate(FatalReason::OpenFailed(
                "no such device".into()
            ))));
        }
    }

    #[test]
    fn test_fail_fast_error_and_close_are_fatal() {
        let t = transition(ConnectionState::Open, &FAIL_FAST, Event::DeviceError("eio".into()));
        assert_eq!(t.state, ConnectionState::Failed);
        assert!(t.effects.contains(&Effect::SetReady(false)));

        let t = transition(ConnectionState::Open, &FAIL_FAST, Event::DeviceClosed);
        assert!(t.effects.contains(&Effect::Terminate(FatalReason::UnexpectedClose)));
    }

    #[test]
    fn test_reconnect_error_is_logged_only() {
        let t = transition(ConnectionState::Open, &RECONNECT, Event::DeviceError("eio".into()));
        assert_eq!(t.state, ConnectionState::Open);
        assert!(!terminates(&t));
        assert!(matches!(t.effects.as_slice(), [Effect::Log(Severity::Warn, _)]));
    }

    #[test]
    fn test_reconnect_cycle() {
        let t = transition(ConnectionState::Open, &RECONNECT, Event::DeviceClosed);
        assert_eq!(t.state, ConnectionState::Reconnecting);
        assert!(t.effects.contains(&Effect::SetReady(false)));
        assert!(t.effects.contains(&Effect::ArmReconnect(Duration::from_secs(5))));

        let t = transition(t.state, &RECONNECT, Event::ReconnectDue);
        assert_eq!(t.state, ConnectionState::Reconnecting);
        assert!(t.effects.contains(&Effect::Reopen));

        let t = transition(t.state, &RECONNECT, Event::OpenFailed("busy".into()));
        assert_eq!(t.state, ConnectionState::Reconnecting);
        assert!(!terminates(&t));
        assert!(t.effects.contains(&Effect::ArmReconnect(Duration::from_secs(5))));

        let t = transition(t.state, &RECONNECT, Event::OpenSucceeded);
        assert_eq!(t.state, ConnectionState::Open);
        assert!(t.effects.contains(&Effect::SetReady(true)));
    }

    #[test]
    fn test_reading_rearms_watchdog() {
        let t = transition(ConnectionState::Open, &FAIL_FAST, Event::ReadingAccepted);
        assert_eq!(t.effects, vec![Effect::ArmWatchdog(Duration::from_secs(30))]);

        let t = transition(ConnectionState::Open, &RECONNECT, Event::ReadingAccepted);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn test_watchdog_expiry_is_fatal() {
        let t = transition(ConnectionState::Open, &FAIL_FAST, Event::WatchdogExpired);
        assert_eq!(t.state, ConnectionState::Failed);
        assert!(t.effects.contains(&Effect::Terminate(FatalReason::WatchdogExpired(
            Duration::from_secs(30)
        ))));
    }

    #[test]
    fn test_failed_absorbs_everything() {
        let t = transition(ConnectionState::Failed, &RECONNECT, Event::OpenSucceeded);
        assert_eq!(t, Transition::stay(ConnectionState::Failed));
    }

    fn any_event() -> impl Strategy<Value = Event> {
        prop_oneof![
            Just(Event::OpenSucceeded),
            Just(Event::OpenFailed("x".into())),
            Just(Event::DeviceError("x".into())),
            Just(Event::DeviceClosed),
            Just(Event::ReadingAccepted),
            Just(Event::WatchdogExpired),
            Just(Event::ReconnectDue),
        ]
    }

    fn any_policy() -> impl Strategy<Value = ReconnectPolicy> {
        prop_oneof![Just(FAIL_FAST), Just(RECONNECT)]
    }

    proptest! {
        #[test]
        fn prop_readiness_tracks_open_state(
            policy in any_policy(),
            events in proptest::collection::vec(any_event(), 0..64),
        ) {
            let mut state = ConnectionState::Closed;
            let mut ready = false;

            for event in events {
                let t = transition(state, &policy, event);
                for effect in &t.effects {
                    if let Effect::SetReady(r) = effect {
                        ready = *r;
                    }
                }
                state = t.state;
                prop_assert_eq!(ready, state.is_ready());
            }
        }

        #[test]
        fn prop_reconnect_policy_never_terminates_after_first_open(
            events in proptest::collection::vec(any_event(), 0..64),
        ) {
            let mut state = transition(ConnectionState::Closed, &RECONNECT, Event::OpenSucceeded).state;

            for event in events {
                let t = transition(state, &RECONNECT, event);
                prop_assert!(!terminates(&t));
                state = t.state;
            }
        }
    }
}
