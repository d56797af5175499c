//! Error types for the connection core
//! Capability and radio failures are rejected at the calling operation;
//! worker failures surface as `Failed` state transitions instead.

use thiserror::Error;

/// Errors produced by discovery and connection operations.
#[derive(Debug, Error)]
pub enum BluetoothError {
    /// A required capability was not granted at call time.
    #[error("required bluetooth capability not granted")]
    PermissionDenied,

    /// No adapter present, or the radio is disabled.
    #[error("bluetooth radio unavailable or disabled")]
    RadioUnavailable,

    /// The radio rejected the discovery request.
    #[error("radio rejected the discovery request")]
    DiscoveryStartFailed,

    /// The serial socket could not be created for the target address.
    #[error("failed to create serial socket: {0}")]
    SocketCreateFailed(String),

    /// The blocking connect call failed with an I/O error.
    #[error("connection i/o failure: {0}")]
    ConnectIoFailure(String),

    /// The connect capability was revoked while the call was in flight.
    #[error("connect capability revoked mid-call")]
    ConnectSecurityDenied,

    /// The attempt did not resolve within its deadline.
    #[error("connection attempt timed out")]
    TimedOut,

    /// The attempt was discarded because a newer one began. Never surfaced
    /// as a user-facing failure; stale results are dropped silently.
    #[error("connection attempt superseded by a newer request")]
    Superseded,
}
