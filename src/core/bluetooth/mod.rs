//! Bluetooth functionality for the monitor link core
//! This module handles all bluetooth operations including scanning for
//! nearby SPP peripherals and managing the single active connection.

mod connection;
mod constants;
mod manager;
mod radio;
mod scanner;
mod types;
mod worker;

// Re-export types that should be publicly accessible
pub use connection::ConnectionStateMachine;
pub use constants::*; // Re-export all constants
pub use manager::BluetoothManager;
pub use radio::{Capability, PermissionGate, RadioEvent, RadioHandle, SerialSocket, StatusSink};
pub use scanner::DiscoveryCoordinator;
pub use types::{normalize_address, AttemptId, ConnectionState, DeviceRef, FailureReason};
pub use worker::WorkerOutcome;
