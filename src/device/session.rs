//! DeviceSession - connection lifecycle for one TPMS controller
//!
//! ## Architecture
//!
//! ```text
//! connect(addr) ──► spawn worker ──┬─ tick ────► JoinSet: GET /data ─────┐
//!                                  ├─ inbox ───► JoinSet: POST /command ─┤
//!                                  └─ join_next ◄────────────────────────┘
//!                                        │
//!                                        ▼
//!                          apply readings (single writer) + bus events
//! ```
//!
//! - One worker task per connection owns the timer, the in-flight request
//!   set and the command inbox.
//! - Requests never block the tick: each one runs in the worker's `JoinSet`
//!   and its completion comes back through `join_next()`.
//! - Poll requests are numbered. A response older than the last applied one
//!   is dropped, so a slow device reply can't roll the readings back.
//! - `disconnect()` aborts and awaits the worker before returning. Dropping
//!   the worker's `JoinSet` aborts every in-flight request with it.
//!
//! Transport failures never leave this module: they are logged, published
//! as bus events, and the next tick tries again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::bus::{BusEvent, SharedBus};
use crate::device::transport::{
    DeviceTransport, HttpTransport, TransportError, DEFAULT_REQUEST_TIMEOUT,
};
use crate::device::types::{Command, ReadingSet, TelemetryPayload};

/// Default poll interval (the controller refreshes its sensors about once a second)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Floor for the poll interval; tokio intervals reject a zero period
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Pending commands per connection before new ones are dropped
const COMMAND_QUEUE_CAPACITY: usize = 32;

/// Session tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Fixed interval between polls of `/data`
    pub poll_interval: Duration,
    /// Per-request timeout for the HTTP transport
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Result of [`DeviceSession::try_dispatch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to the worker; the reply arrives on the bus
    Queued,
    NotConnected,
    /// Too many commands pending for this connection
    QueueFull,
}

/// What the presentation layer sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connected {
        address: String,
        readings: ReadingSet,
        /// When the readings were last replaced by a poll (None until the first one)
        last_update: Option<DateTime<Utc>>,
    },
}

impl SessionState {
    fn connected(address: String) -> Self {
        SessionState::Connected {
            address,
            readings: ReadingSet::default(),
            last_update: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected { .. })
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            SessionState::Connected { address, .. } => Some(address),
            SessionState::Disconnected => None,
        }
    }

    pub fn readings(&self) -> Option<&ReadingSet> {
        match self {
            SessionState::Connected { readings, .. } => Some(readings),
            SessionState::Disconnected => None,
        }
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionState::Connected { last_update, .. } => *last_update,
            SessionState::Disconnected => None,
        }
    }
}

/// Handle to a running worker. Dropping it cancels the worker.
struct Worker {
    _cancel_on_drop: DropGuard,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl Worker {
    /// Cancel the worker and wait until it is gone
    async fn stop(self) {
        let Worker {
            _cancel_on_drop,
            commands,
            task,
        } = self;
        drop(_cancel_on_drop);
        drop(commands);
        task.abort();
        // Cancelled JoinError is the expected outcome
        let _ = task.await;
    }
}

/// Internal state
struct SessionInner {
    state: SessionState,
    worker: Option<Worker>,
    /// Bumped on every connect so a worker can tell it has been replaced
    generation: u64,
}

/// Client for one TPMS controller at a time.
///
/// Cheap to clone; all clones share the same session.
#[derive(Clone)]
pub struct DeviceSession {
    inner: Arc<RwLock<SessionInner>>,
    transport: Arc<dyn DeviceTransport>,
    bus: SharedBus,
    poll_interval: Duration,
}

impl DeviceSession {
    /// Session over plain HTTP
    pub fn new(bus: SharedBus, config: SessionConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(config.request_timeout));
        Self::with_transport(bus, config, transport)
    }

    /// Session over a caller-supplied transport
    pub fn with_transport(
        bus: SharedBus,
        config: SessionConfig,
        transport: Arc<dyn DeviceTransport>,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionInner {
                state: SessionState::Disconnected,
                worker: None,
                generation: 0,
            })),
            transport,
            bus,
            poll_interval: config.poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Snapshot of the current state
    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.read().await.state.is_connected()
    }

    /// Current readings, if connected
    pub async fn readings(&self) -> Option<ReadingSet> {
        self.inner.read().await.state.readings().copied()
    }

    /// Start polling `address`.
    ///
    /// A blank address is ignored. Connecting while connected replaces the
    /// previous session; its worker is stopped before this returns.
    pub async fn connect(&self, address: &str) -> SessionState {
        let address = address.trim();
        if address.is_empty() {
            debug!("connect ignored: empty address");
            return self.state().await;
        }

        let (previous, snapshot) = {
            let mut inner = self.inner.write().await;
            let previous_address = inner.state.address().map(str::to_string);
            let previous_worker = inner.worker.take();

            inner.generation += 1;
            inner.state = SessionState::connected(address.to_string());
            inner.worker = Some(self.spawn_worker(address.to_string(), inner.generation));

            (
                previous_worker.map(|w| (w, previous_address)),
                inner.state.clone(),
            )
        };

        if let Some((worker, previous_address)) = previous {
            worker.stop().await;
            if let Some(previous_address) = previous_address {
                info!(
                    previous = %previous_address,
                    address = %address,
                    "TPMS session replaced"
                );
                self.bus.publish(BusEvent::SessionDisconnected {
                    address: previous_address,
                });
            }
        }

        info!(
            address = %address,
            interval_ms = self.poll_interval.as_millis() as u64,
            "TPMS session connected"
        );
        self.bus.publish(BusEvent::SessionConnected {
            address: address.to_string(),
        });

        snapshot
    }

    /// Stop polling and forget the readings. Safe to call when disconnected.
    ///
    /// When this returns no poll for the old connection will run or be applied.
    pub async fn disconnect(&self) {
        let (worker, address) = {
            let mut inner = self.inner.write().await;
            let address = inner.state.address().map(str::to_string);
            inner.state = SessionState::Disconnected;
            (inner.worker.take(), address)
        };

        if let Some(worker) = worker {
            worker.stop().await;
        }

        if let Some(address) = address {
            info!(address = %address, "TPMS session disconnected");
            self.bus
                .publish(BusEvent::SessionDisconnected { address });
        }
    }

    /// Queue a command for the connected device.
    ///
    /// Returns as soon as the command is queued. Silently ignored when
    /// disconnected. The outcome is only logged and published on the bus.
    pub async fn dispatch(&self, command: Command) {
        self.try_dispatch(command).await;
    }

    /// Like [`dispatch`](Self::dispatch), but reports whether the command
    /// made it into the worker's queue.
    ///
    /// The queue check and the send happen under one read lock, so a
    /// concurrent `disconnect` either runs before (`NotConnected`) or after
    /// (the queued command is cancelled with the worker).
    pub async fn try_dispatch(&self, command: Command) -> DispatchOutcome {
        let inner = self.inner.read().await;
        let Some(worker) = inner.worker.as_ref() else {
            debug!(%command, "dispatch ignored: not connected");
            return DispatchOutcome::NotConnected;
        };

        match worker.commands.try_send(command) {
            Ok(()) => {
                debug!(%command, "TPMS command queued");
                DispatchOutcome::Queued
            }
            Err(mpsc::error::TrySendError::Full(command)) => {
                warn!(%command, "TPMS command queue full, dropping");
                DispatchOutcome::QueueFull
            }
            // Worker task is gone
            Err(mpsc::error::TrySendError::Closed(command)) => {
                debug!(%command, "dispatch ignored: session closing");
                DispatchOutcome::NotConnected
            }
        }
    }

    fn spawn_worker(&self, address: String, generation: u64) -> Worker {
        let shutdown = CancellationToken::new();
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);

        let ctx = WorkerContext {
            address,
            generation,
            poll_interval: self.poll_interval,
            inner: self.inner.clone(),
            transport: self.transport.clone(),
            bus: self.bus.clone(),
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(run_worker(ctx, rx));

        Worker {
            _cancel_on_drop: shutdown.drop_guard(),
            commands: tx,
            task,
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

struct WorkerContext {
    address: String,
    generation: u64,
    poll_interval: Duration,
    inner: Arc<RwLock<SessionInner>>,
    transport: Arc<dyn DeviceTransport>,
    bus: SharedBus,
    shutdown: CancellationToken,
}

/// Finished request, handed back to the worker loop
enum Completion {
    Poll {
        seq: u64,
        result: Result<TelemetryPayload, TransportError>,
    },
    Command {
        command: Command,
        result: Result<String, TransportError>,
    },
}

async fn run_worker(ctx: WorkerContext, mut commands: mpsc::Receiver<Command>) {
    // First poll one interval after connect, then every interval
    let mut ticker = interval_at(Instant::now() + ctx.poll_interval, ctx.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: JoinSet<Completion> = JoinSet::new();
    let mut issued_seq: u64 = 0;
    let mut applied_seq: u64 = 0;

    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => {
                debug!(address = %ctx.address, "TPMS worker shutting down");
                break;
            }
            _ = ticker.tick() => {
                issued_seq += 1;
                let seq = issued_seq;
                let transport = ctx.transport.clone();
                let address = ctx.address.clone();
                in_flight.spawn(async move {
                    let result = transport.fetch_readings(&address).await;
                    Completion::Poll { seq, result }
                });
            }
            Some(command) = commands.recv() => {
                let transport = ctx.transport.clone();
                let address = ctx.address.clone();
                in_flight.spawn(async move {
                    let result = transport.send_command(&address, &command).await;
                    Completion::Command { command, result }
                });
            }
            Some(joined) = in_flight.join_next() => {
                match joined {
                    Ok(Completion::Poll { seq, result }) => {
                        handle_poll(&ctx, seq, &mut applied_seq, result).await;
                    }
                    Ok(Completion::Command { command, result }) => {
                        handle_command_result(&ctx, command, result);
                    }
                    Err(e) if e.is_panic() => warn!(error = %e, "TPMS request task panicked"),
                    Err(_) => {}
                }
            }
        }
    }

    in_flight.abort_all();
}

async fn handle_poll(
    ctx: &WorkerContext,
    seq: u64,
    applied_seq: &mut u64,
    result: Result<TelemetryPayload, TransportError>,
) {
    match result {
        Ok(TelemetryPayload::Readings(readings)) => {
            if seq < *applied_seq {
                debug!(
                    seq,
                    applied = *applied_seq,
                    "Discarding out-of-order TPMS response"
                );
                return;
            }
            if apply_readings(ctx, readings).await {
                *applied_seq = seq;
            }
        }
        Ok(TelemetryPayload::Absent) => {
            debug!(seq, "TPMS response without tireData, keeping readings");
        }
        Ok(TelemetryPayload::Malformed(reason)) => {
            warn!(address = %ctx.address, %reason, "Ignoring malformed tireData");
        }
        Err(e) => {
            warn!(address = %ctx.address, error = %e, "Error fetching TPMS data");
            ctx.bus.publish(BusEvent::PollFailed {
                address: ctx.address.clone(),
                error: e.to_string(),
            });
        }
    }
}

/// Replace the readings wholesale. Returns false if this worker's
/// connection is no longer the current one.
async fn apply_readings(ctx: &WorkerContext, readings: ReadingSet) -> bool {
    let changed = {
        let mut inner = ctx.inner.write().await;
        if inner.generation != ctx.generation {
            return false;
        }
        match &mut inner.state {
            SessionState::Connected {
                readings: current,
                last_update,
                ..
            } => {
                let changed = readings.changed_wheels(current);
                *current = readings;
                *last_update = Some(Utc::now());
                changed
            }
            SessionState::Disconnected => return false,
        }
    };

    if !changed.is_empty() {
        debug!(address = %ctx.address, ?changed, "TPMS readings changed");
    }

    ctx.bus.publish(BusEvent::ReadingsUpdated {
        address: ctx.address.clone(),
        readings,
        changed,
    });
    true
}

fn handle_command_result(
    ctx: &WorkerContext,
    command: Command,
    result: Result<String, TransportError>,
) {
    match result {
        Ok(response) => {
            info!(
                address = %ctx.address,
                %command,
                response = response.trim(),
                "TPMS command response"
            );
            ctx.bus.publish(BusEvent::CommandSent {
                address: ctx.address.clone(),
                command,
                response,
            });
        }
        Err(e) => {
            warn!(address = %ctx.address, %command, error = %e, "Error sending TPMS command");
            ctx.bus.publish(BusEvent::CommandFailed {
                address: ctx.address.clone(),
                command,
                error: e.to_string(),
            });
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
