//! Defines shared data structures for the Bluetooth module.

use std::hash::{Hash, Hasher};

use regex::Regex;
use serde::Serialize;

use crate::core::bluetooth::constants::UNKNOWN_DEVICE_LABEL;
use crate::error::BluetoothError;

/// Monotonic token distinguishing one connection try from all others.
pub type AttemptId = u64;

/// Identity of a discoverable peripheral.
/// Equality and hashing are by `address` only; the name is display metadata.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRef {
    /// Canonical upper-case MAC address; the stable unique key.
    pub address: String,
    /// Human-readable name, if the radio reported one.
    pub name: Option<String>,
}

impl DeviceRef {
    /// Creates a new DeviceRef, canonicalizing the address.
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: normalize_address(&address.into()),
            name,
        }
    }

    /// Label for UI listing; unnamed devices get a fixed placeholder.
    pub fn display_label(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_DEVICE_LABEL)
    }
}

impl PartialEq for DeviceRef {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for DeviceRef {}

impl Hash for DeviceRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

/// Extracts and canonicalizes a MAC address from a platform device identifier.
/// Falls back to upper-casing the raw identifier when no MAC is embedded.
pub fn normalize_address(raw: &str) -> String {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").unwrap();
    re.find_iter(raw)
        .last()
        .map(|m| m.as_str().replace('-', ":").to_uppercase())
        .unwrap_or_else(|| raw.to_uppercase())
}

/// The current phase of the connection lifecycle.
/// Exactly one state is current at any time; the state machine never emits
/// the same state twice in a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No scan or connection activity.
    Idle,
    /// Device discovery is running.
    Scanning,
    /// A connection attempt is in flight.
    Connecting { attempt_id: AttemptId, target: DeviceRef },
    /// A serial link is established and its socket is held live.
    Connected { target: DeviceRef },
    /// The last attempt to `target` failed for `reason`.
    Failed { target: DeviceRef, reason: FailureReason },
    /// The link to `target` dropped after being connected.
    Disconnected { target: DeviceRef },
}

/// Why a connection attempt failed; carried inside [`ConnectionState::Failed`]
/// so the sink can render a specific message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The serial socket could not be created.
    SocketCreateFailed,
    /// The blocking connect call failed with an I/O error.
    Io,
    /// The connect capability was revoked mid-call.
    SecurityDenied,
    /// The attempt did not resolve within its deadline.
    TimedOut,
    /// Internal marker for superseded attempts; never emitted as a transition.
    Superseded,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::SocketCreateFailed => "socket creation failed",
            Self::Io => "I/O failure",
            Self::SecurityDenied => "permission denied",
            Self::TimedOut => "timed out",
            Self::Superseded => "superseded",
        };
        f.write_str(text)
    }
}

impl From<&BluetoothError> for FailureReason {
    fn from(err: &BluetoothError) -> Self {
        match err {
            BluetoothError::SocketCreateFailed(_) => Self::SocketCreateFailed,
            BluetoothError::PermissionDenied | BluetoothError::ConnectSecurityDenied => {
                Self::SecurityDenied
            }
            BluetoothError::TimedOut => Self::TimedOut,
            BluetoothError::Superseded => Self::Superseded,
            _ => Self::Io,
        }
    }
}
