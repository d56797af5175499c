//! Connection state machine for the monitor link
//! This module is the single source of truth for the connection phase and
//! enforces the at-most-one-active-attempt invariant.

use std::sync::{Arc, Mutex as StdMutex};

use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::radio::{PermissionGate, RadioHandle, SerialSocket, StatusSink};
use crate::core::bluetooth::types::{AttemptId, ConnectionState, DeviceRef, FailureReason};
use crate::core::bluetooth::worker::{self, AttemptHandle, WorkerOutcome};
use crate::error::BluetoothError;

/// One in-flight connection try. Owned by the state machine; the worker and
/// timeout timer only hold an [`AttemptHandle`] view of it.
pub(crate) struct ConnectionAttempt {
    pub(crate) id: AttemptId,
    pub(crate) target: DeviceRef,
    pub(crate) deadline: Instant,
    /// Cooperative cancel flag shared with the worker and the timeout timer.
    pub(crate) cancel: CancellationToken,
    /// Slot the worker publishes its partially-opened socket into, so
    /// cancellation and timeout can close it and unblock the connect call.
    pub(crate) socket_slot: Arc<StdMutex<Option<Arc<dyn SerialSocket>>>>,
}

impl ConnectionAttempt {
    fn new(id: AttemptId, target: DeviceRef, deadline: Instant) -> Self {
        Self {
            id,
            target,
            deadline,
            cancel: CancellationToken::new(),
            socket_slot: Arc::new(StdMutex::new(None)),
        }
    }

    /// Marks the attempt cancelled and closes any socket the worker has
    /// opened so far, unblocking a pending connect call.
    fn cancel_and_close(&self) {
        self.cancel.cancel();
        if let Some(socket) = self.socket_slot.lock().unwrap().take() {
            socket.close();
        }
    }
}

/// The live connection resource, owned solely by the state machine until
/// explicitly released.
struct LiveConnection {
    target: DeviceRef,
    socket: Arc<dyn SerialSocket>,
}

struct MachineInner {
    state: ConnectionState,
    /// At most one attempt is active; resolving an attempt takes it out of
    /// this slot, which doubles as the single-apply guard.
    active: Option<ConnectionAttempt>,
    live: Option<LiveConnection>,
    next_attempt_id: AttemptId,
}

/// Serializes all transition-causing operations behind one mutex and reports
/// every applied transition to the status sink, in order and de-duplicated.
#[derive(Clone)]
pub struct ConnectionStateMachine {
    inner: Arc<Mutex<MachineInner>>,
    gate: Arc<dyn PermissionGate>,
    radio: Arc<dyn RadioHandle>,
    sink: Arc<dyn StatusSink>,
    connect_timeout: Duration,
}

impl ConnectionStateMachine {
    pub fn new(
        gate: Arc<dyn PermissionGate>,
        radio: Arc<dyn RadioHandle>,
        sink: Arc<dyn StatusSink>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MachineInner {
                state: ConnectionState::Idle,
                active: None,
                live: None,
                next_attempt_id: 1,
            })),
            gate,
            radio,
            sink,
            connect_timeout,
        }
    }

    /// Starts a new connection attempt to `target`, superseding any active
    /// attempt and releasing any live connection first. Fails synchronously
    /// with `PermissionDenied` when the connect capability is missing,
    /// leaving existing state untouched.
    pub async fn begin_connect(&self, target: DeviceRef) -> Result<AttemptId, BluetoothError> {
        if !self.gate.has_connect_capability() {
            warn!(
                "Connect capability not granted; refusing connect to {}",
                target.address
            );
            return Err(BluetoothError::PermissionDenied);
        }

        let mut inner = self.inner.lock().await;

        if let Some(prior) = inner.active.take() {
            info!(
                "Superseding attempt #{} to {} with a new connect request",
                prior.id, prior.target.address
            );
            prior.cancel_and_close();
        }
        if let Some(live) = inner.live.take() {
            info!("Releasing live connection to {}", live.target.address);
            live.socket.close();
        }

        // Any in-progress scan competes with the connect for the radio.
        self.radio.cancel_discovery();

        let id = inner.next_attempt_id;
        inner.next_attempt_id += 1;
        let attempt =
            ConnectionAttempt::new(id, target.clone(), Instant::now() + self.connect_timeout);
        let handle = AttemptHandle::from(&attempt);
        inner.active = Some(attempt);

        info!(
            "Starting connection attempt #{} to {} ({})",
            id,
            target.display_label(),
            target.address
        );
        self.set_state(
            &mut inner,
            ConnectionState::Connecting {
                attempt_id: id,
                target,
            },
        );
        drop(inner);

        worker::spawn_connect(self.clone(), self.radio.clone(), handle.clone());
        worker::spawn_timeout(self.clone(), handle);
        Ok(id)
    }

    /// Applies the worker's terminal outcome for `attempt_id`. Results tagged
    /// with a superseded attempt id are discarded (a late success has its
    /// socket closed) and never reach the sink.
    pub async fn on_worker_result(&self, attempt_id: AttemptId, outcome: WorkerOutcome) {
        let mut inner = self.inner.lock().await;
        let Some(attempt) = take_active_if(&mut inner, attempt_id) else {
            debug!("Discarding result for stale attempt #{}", attempt_id);
            if let WorkerOutcome::Success(socket) = outcome {
                socket.close();
            }
            return;
        };
        // Disarm the timeout timer for the resolved attempt.
        attempt.cancel.cancel();

        match outcome {
            WorkerOutcome::Success(socket) => {
                info!(
                    "Attempt #{} connected to {} ({})",
                    attempt.id,
                    attempt.target.display_label(),
                    attempt.target.address
                );
                let target = attempt.target.clone();
                inner.live = Some(LiveConnection {
                    target: attempt.target,
                    socket,
                });
                self.set_state(&mut inner, ConnectionState::Connected { target });
            }
            WorkerOutcome::Failure(err) => {
                let reason = FailureReason::from(&err);
                if reason == FailureReason::Superseded {
                    // Cancellation is not a failure to report, but the
                    // attempt is gone; do not stay in `Connecting`.
                    debug!("Attempt #{} resolved as superseded", attempt.id);
                    self.set_state(&mut inner, ConnectionState::Idle);
                    return;
                }
                warn!(
                    "Attempt #{} to {} failed: {}",
                    attempt.id, attempt.target.address, err
                );
                self.set_state(
                    &mut inner,
                    ConnectionState::Failed {
                        target: attempt.target,
                        reason,
                    },
                );
            }
        }
    }

    /// Fails the attempt with `TimedOut` if it is still unresolved. A no-op
    /// when the worker's result was applied first.
    pub async fn on_timeout_fired(&self, attempt_id: AttemptId) {
        let mut inner = self.inner.lock().await;
        let Some(attempt) = take_active_if(&mut inner, attempt_id) else {
            debug!("Timeout for attempt #{} arrived after resolution", attempt_id);
            return;
        };
        warn!(
            "Attempt #{} to {} timed out",
            attempt.id, attempt.target.address
        );
        attempt.cancel_and_close();
        self.set_state(
            &mut inner,
            ConnectionState::Failed {
                target: attempt.target,
                reason: FailureReason::TimedOut,
            },
        );
    }

    /// Link-level connect notification from the radio stack, keyed by
    /// address. Only affects the currently tracked target.
    pub async fn on_link_connected(&self, address: &str) {
        let mut inner = self.inner.lock().await;
        match inner.live.as_ref() {
            Some(live) if live.target.address == address => {
                let target = live.target.clone();
                self.set_state(&mut inner, ConnectionState::Connected { target });
            }
            _ => debug!("Link up for untracked device {}", address),
        }
    }

    /// Link-level disconnect notification; releases the held socket when it
    /// concerns the connected target.
    pub async fn on_link_disconnected(&self, address: &str) {
        let mut inner = self.inner.lock().await;
        match inner.live.take() {
            Some(live) if live.target.address == address => {
                info!("Link to {} dropped", live.target.address);
                live.socket.close();
                self.set_state(
                    &mut inner,
                    ConnectionState::Disconnected {
                        target: live.target,
                    },
                );
            }
            other => {
                debug!("Link down for untracked device {}", address);
                inner.live = other;
            }
        }
    }

    /// Cancels any active attempt, releases any held socket, and returns to
    /// `Idle`. Repeated cancellation of an idle machine is a no-op.
    pub async fn cancel_current(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(attempt) = inner.active.take() {
            info!(
                "Cancelling attempt #{} to {}",
                attempt.id, attempt.target.address
            );
            attempt.cancel_and_close();
        }
        if let Some(live) = inner.live.take() {
            info!("Closing connection to {}", live.target.address);
            live.socket.close();
        }
        self.set_state(&mut inner, ConnectionState::Idle);
    }

    /// Transitions to `Scanning`; called by the discovery coordinator once a
    /// scan has started.
    pub(crate) async fn set_scanning(&self) {
        let mut inner = self.inner.lock().await;
        self.set_state(&mut inner, ConnectionState::Scanning);
    }

    /// Discovery ended; returns to `Idle` only when nothing else is going on.
    pub(crate) async fn on_scan_finished(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == ConnectionState::Scanning {
            self.set_state(&mut inner, ConnectionState::Idle);
        }
    }

    /// Returns the current state.
    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state.clone()
    }

    /// Returns the currently connected device, if any.
    pub async fn connected_device(&self) -> Option<DeviceRef> {
        self.inner
            .lock()
            .await
            .live
            .as_ref()
            .map(|live| live.target.clone())
    }

    /// Narrow accessor for the live socket. The socket stays owned by the
    /// machine; callers must not close it.
    pub async fn with_socket<R>(&self, f: impl FnOnce(&dyn SerialSocket) -> R) -> Option<R> {
        let inner = self.inner.lock().await;
        inner.live.as_ref().map(|live| f(live.socket.as_ref()))
    }

    /// Applies and reports a transition, dropping consecutive duplicates.
    fn set_state(&self, inner: &mut MachineInner, next: ConnectionState) {
        if inner.state == next {
            return;
        }
        debug!("State transition: {:?} -> {:?}", inner.state, next);
        inner.state = next.clone();
        self.sink.on_state_changed(&next);
    }
}

/// Takes the active attempt only when the id matches; the `Option::take` is
/// the single-apply guard that makes the first resolution win.
fn take_active_if(inner: &mut MachineInner, attempt_id: AttemptId) -> Option<ConnectionAttempt> {
    match inner.active.take() {
        Some(attempt) if attempt.id == attempt_id => Some(attempt),
        other => {
            inner.active = other;
            None
        }
    }
}
