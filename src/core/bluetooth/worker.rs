//! Connection worker for the monitor link
//! Runs the blocking serial connect on a dedicated thread so it never blocks
//! the component that issued the connect request, and arms the attempt's
//! timeout timer.

use std::sync::{Arc, Mutex};

use log::{debug, error};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::connection::{ConnectionAttempt, ConnectionStateMachine};
use crate::core::bluetooth::constants::SPP_SERVICE_UUID;
use crate::core::bluetooth::radio::{RadioHandle, SerialSocket};
use crate::core::bluetooth::types::AttemptId;
use crate::error::BluetoothError;

/// Terminal outcome the worker reports for one attempt.
pub enum WorkerOutcome {
    Success(Arc<dyn SerialSocket>),
    Failure(BluetoothError),
}

/// The worker's borrowed view of a [`ConnectionAttempt`]; the attempt itself
/// stays owned by the state machine.
#[derive(Clone)]
pub(crate) struct AttemptHandle {
    pub(crate) id: AttemptId,
    pub(crate) address: String,
    pub(crate) deadline: Instant,
    pub(crate) cancel: CancellationToken,
    pub(crate) socket_slot: Arc<Mutex<Option<Arc<dyn SerialSocket>>>>,
}

impl From<&ConnectionAttempt> for AttemptHandle {
    fn from(attempt: &ConnectionAttempt) -> Self {
        Self {
            id: attempt.id,
            address: attempt.target.address.clone(),
            deadline: attempt.deadline,
            cancel: attempt.cancel.clone(),
            socket_slot: attempt.socket_slot.clone(),
        }
    }
}

/// Spawns the blocking connect for one attempt and reports its outcome back
/// into the state machine exactly once.
pub(crate) fn spawn_connect(
    machine: ConnectionStateMachine,
    radio: Arc<dyn RadioHandle>,
    handle: AttemptHandle,
) {
    tokio::spawn(async move {
        let id = handle.id;
        let outcome = match tokio::task::spawn_blocking(move || open_and_connect(radio, handle))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Connect worker for attempt #{} aborted: {}", id, e);
                WorkerOutcome::Failure(BluetoothError::ConnectIoFailure(e.to_string()))
            }
        };
        machine.on_worker_result(id, outcome).await;
    });
}

/// Arms the timeout timer for one attempt. Resolution of the attempt cancels
/// its token, which disarms the timer.
pub(crate) fn spawn_timeout(machine: ConnectionStateMachine, handle: AttemptHandle) {
    tokio::spawn(async move {
        tokio::select! {
            _ = sleep_until(handle.deadline) => machine.on_timeout_fired(handle.id).await,
            _ = handle.cancel.cancelled() => {
                debug!("Timeout timer for attempt #{} disarmed", handle.id);
            }
        }
    });
}

/// The blocking part: create the socket, publish it to the attempt slot, and
/// connect. Checks the cancel flag before and after socket creation so a
/// superseded attempt aborts without ever dialing.
fn open_and_connect(radio: Arc<dyn RadioHandle>, handle: AttemptHandle) -> WorkerOutcome {
    if handle.cancel.is_cancelled() {
        debug!("Attempt #{} cancelled before socket creation", handle.id);
        return WorkerOutcome::Failure(BluetoothError::Superseded);
    }

    let socket = match radio.create_serial_socket(&handle.address, SPP_SERVICE_UUID) {
        Ok(socket) => socket,
        Err(e) => return WorkerOutcome::Failure(e),
    };
    *handle.socket_slot.lock().unwrap() = Some(socket.clone());

    // Cancellation may have raced the slot publish; it would have found the
    // slot empty, so close here rather than dial a dead attempt.
    if handle.cancel.is_cancelled() {
        debug!("Attempt #{} cancelled before connect", handle.id);
        socket.close();
        return WorkerOutcome::Failure(BluetoothError::Superseded);
    }

    match socket.connect() {
        Ok(()) => WorkerOutcome::Success(socket),
        Err(e) => {
            socket.close();
            WorkerOutcome::Failure(e)
        }
    }
}
