//! Constants used throughout the connection core
//! This module contains all the constant values used by the crate,
//! such as the SPP service UUID, timeouts, and channel sizing.

use tokio::time::Duration;
use uuid::Uuid;

/// The Serial Port Profile service UUID agreed with the monitor firmware.
/// Fixed, not negotiated.
pub const SPP_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805f9b34fb);

/// Budget for a single connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Label rendered for devices that did not report a display name.
pub const UNKNOWN_DEVICE_LABEL: &str = "Unknown device";

/// Capacity of the bounded channel funnelling platform radio callbacks.
pub const RADIO_EVENT_CAPACITY: usize = 32;
