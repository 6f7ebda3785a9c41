//! Cancellable emergency countdown.
//!
//! A countdown starts armed with a number of seconds, ticks once per
//! second, and either gets cancelled by the user or fires. Firing happens
//! on expiry or on a manual trigger and invokes the dispatch callback
//! exactly once.
//!
//! [`CountdownState::apply`] holds the transition rules and is pure; the
//! async [`EmergencyCountdown`] drives it with timers and a command channel.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dispatch::DeliveryResult;
use crate::error::{Error, Result};

/// Tick length used outside of tests.
pub const TICK: Duration = Duration::from_secs(1);

/// Lifecycle of a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CountdownStatus {
    /// Counting down.
    Armed,
    /// Cancelled by the user. Terminal.
    Cancelled,
    /// Fired; dispatch has been or is being invoked. Terminal.
    Fired,
}

impl std::fmt::Display for CountdownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Armed => write!(f, "armed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Fired => write!(f, "fired"),
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    /// One second elapsed.
    Tick,
    /// The countdown reached zero.
    Expire,
    /// The user cancelled.
    Cancel,
    /// The user asked to send now.
    Trigger,
}

impl std::fmt::Display for CountdownEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tick => write!(f, "tick"),
            Self::Expire => write!(f, "expire"),
            Self::Cancel => write!(f, "cancel"),
            Self::Trigger => write!(f, "trigger"),
        }
    }
}

/// Snapshot of a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownState {
    /// Seconds left before firing.
    pub remaining_seconds: u32,
    /// Current status.
    pub status: CountdownStatus,
}

impl CountdownState {
    /// A fresh armed countdown.
    #[must_use]
    pub fn armed(seconds: u32) -> Self {
        Self {
            remaining_seconds: seconds,
            status: CountdownStatus::Armed,
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status != CountdownStatus::Armed
    }

    /// Apply `event`, returning the next state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] when the event is not accepted
    /// in the current state.
    pub fn apply(self, event: CountdownEvent) -> Result<Self> {
        let n = self.remaining_seconds;
        match (self.status, event) {
            (CountdownStatus::Armed, CountdownEvent::Tick) if n > 0 => Ok(Self {
                remaining_seconds: n - 1,
                ..self
            }),
            (CountdownStatus::Armed, CountdownEvent::Expire) if n == 0 => Ok(Self {
                status: CountdownStatus::Fired,
                ..self
            }),
            (CountdownStatus::Armed, CountdownEvent::Cancel) if n > 0 => Ok(Self {
                status: CountdownStatus::Cancelled,
                ..self
            }),
            (CountdownStatus::Armed, CountdownEvent::Trigger) => Ok(Self {
                status: CountdownStatus::Fired,
                ..self
            }),
            _ => Err(self.rejects(event)),
        }
    }

    fn rejects(self, event: CountdownEvent) -> Error {
        let state = match self.status {
            CountdownStatus::Armed => format!("armed at {}s", self.remaining_seconds),
            other => other.to_string(),
        };
        Error::InvalidTransition {
            state,
            event: event.to_string(),
        }
    }
}

/// Why the countdown fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireReason {
    /// Reached zero.
    Expired,
    /// User triggered it.
    Manual,
}

/// What happened after the countdown closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CountdownOutcome {
    /// Cancelled; nothing was dispatched.
    Cancelled,
    /// Dispatch ran.
    Dispatched(DeliveryResult),
    /// Dispatch could not be invoked.
    DispatchFailed(String),
}

/// Final report of a countdown run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownReport {
    /// Terminal state.
    pub final_state: CountdownState,
    /// Set when the countdown fired.
    pub reason: Option<FireReason>,
    /// Result of the run.
    pub outcome: CountdownOutcome,
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Cancel,
    Trigger,
}

/// Control side of a running countdown.
///
/// Dropping every handle does not cancel the countdown.
#[derive(Debug, Clone)]
pub struct CountdownHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<CountdownState>,
}

impl CountdownHandle {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> CountdownState {
        *self.state.borrow()
    }

    /// Cancel the countdown.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the countdown already closed.
    pub fn cancel(&self) -> Result<()> {
        self.send(Command::Cancel, CountdownEvent::Cancel)
    }

    /// Fire immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the countdown already closed.
    pub fn trigger(&self) -> Result<()> {
        self.send(Command::Trigger, CountdownEvent::Trigger)
    }

    fn send(&self, command: Command, event: CountdownEvent) -> Result<()> {
        let current = self.state();
        // Validate against the last published state; the runner re-checks
        current.apply(event)?;
        self.commands
            .try_send(command)
            .map_err(|_| current.rejects(event))
    }

    /// Wait until the countdown reaches a terminal state.
    pub async fn closed(&mut self) -> CountdownState {
        let reached = self
            .state
            .wait_for(CountdownState::is_terminal)
            .await
            .map(|state| *state);
        match reached {
            Ok(state) => state,
            Err(_) => self.state(),
        }
    }
}

/// Driver for one countdown.
#[derive(Debug)]
pub struct EmergencyCountdown {
    state: CountdownState,
    tick: Duration,
    commands: mpsc::Receiver<Command>,
    publisher: watch::Sender<CountdownState>,
}

/// Arm a countdown of `seconds`, ticking every `tick`.
#[must_use]
pub fn arm(seconds: u32, tick: Duration) -> (EmergencyCountdown, CountdownHandle) {
    let state = CountdownState::armed(seconds);
    let (command_tx, command_rx) = mpsc::channel(8);
    let (publisher, state_rx) = watch::channel(state);
    (
        EmergencyCountdown {
            state,
            tick,
            commands: command_rx,
            publisher,
        },
        CountdownHandle {
            commands: command_tx,
            state: state_rx,
        },
    )
}

impl EmergencyCountdown {
    /// Run until cancelled or fired. `fire` is called at most once.
    pub async fn run<F, Fut>(mut self, fire: F) -> CountdownReport
    where
        F: FnOnce(FireReason) -> Fut,
        Fut: Future<Output = Result<DeliveryResult>>,
    {
        info!("Countdown armed: {}s", self.state.remaining_seconds);
        let mut commands_open = true;
        let mut next_tick = Instant::now() + self.tick;

        let reason = loop {
            if self.state.remaining_seconds == 0 && self.advance(CountdownEvent::Expire) {
                break FireReason::Expired;
            }

            tokio::select! {
                biased;

                command = self.commands.recv(), if commands_open => match command {
                    Some(Command::Cancel) => {
                        if self.advance(CountdownEvent::Cancel) {
                            info!("Countdown cancelled with {}s left", self.state.remaining_seconds);
                            return CountdownReport {
                                final_state: self.state,
                                reason: None,
                                outcome: CountdownOutcome::Cancelled,
                            };
                        }
                    }
                    Some(Command::Trigger) => {
                        if self.advance(CountdownEvent::Trigger) {
                            break FireReason::Manual;
                        }
                    }
                    None => {
                        debug!("All countdown handles dropped; continuing");
                        commands_open = false;
                    }
                },

                () = tokio::time::sleep_until(next_tick) => {
                    next_tick += self.tick;
                    self.advance(CountdownEvent::Tick);
                }
            }
        };

        info!("Countdown fired ({:?})", reason);
        let outcome = match fire(reason).await {
            Ok(result) => CountdownOutcome::Dispatched(result),
            Err(e) => {
                warn!("Dispatch could not be invoked: {}", e);
                CountdownOutcome::DispatchFailed(e.to_string())
            }
        };

        CountdownReport {
            final_state: self.state,
            reason: Some(reason),
            outcome,
        }
    }

    /// Apply and publish; rejected events leave the state untouched.
    fn advance(&mut self, event: CountdownEvent) -> bool {
        match self.state.apply(event) {
            Ok(next) => {
                self.state = next;
                self.publisher.send_replace(next);
                true
            }
            Err(e) => {
                debug!("Ignoring countdown event: {}", e);
                false
            }
        }
    }
}
