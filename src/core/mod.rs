//! Core functionality for the monitor link
//! This module contains the discovery and connection machinery for the
//! blood-oxygen monitor peripheral.

pub mod bluetooth;

// Re-export commonly used types
pub use bluetooth::{BluetoothManager, ConnectionState, DeviceRef};
