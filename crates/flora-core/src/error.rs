//! Error types for flora-core.
//!
//! This module defines the errors that can occur when talking to Mi Flora
//! sensors over Bluetooth Low Energy.
//!
//! # Where errors surface
//!
//! Transport implementations report every failure as an [`Error`]. The
//! [`RetryingChannel`](crate::RetryingChannel) consumes those: each failed
//! attempt is logged and retried, and an exhausted retry budget becomes a
//! plain "no data" result. Validation rejections are handled the same way.
//!
//! The only error a [`SensorPoller`](crate::SensorPoller) returns to its
//! caller is [`Error::NoData`], raised when a measurement is requested and
//! the cache cannot be filled even after one corrective attempt.
//!
//! | Error Type | Raised by | Seen by poller callers |
//! |------------|-----------|------------------------|
//! | [`Error::Timeout`] | channel (per attempt) | No |
//! | [`Error::Bluetooth`] | BLE transport | No |
//! | [`Error::ConnectionFailed`] | transports | No |
//! | [`Error::WriteFailed`] | transports | No |
//! | [`Error::DeviceNotFound`] | BLE transport | No |
//! | [`Error::CharacteristicNotFound`] | BLE transport | No |
//! | [`Error::NoData`] | poller | Yes |

use std::time::Duration;

use thiserror::Error;

use flora_types::DeviceAddress;

/// Errors that can occur when communicating with Mi Flora sensors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device not found during scan or connection.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// Operation attempted on a closed session.
    #[error("Not connected to device")]
    NotConnected,

    /// Required BLE characteristic not found on device.
    #[error("Characteristic not found: {uuid} (searched in {service_count} services)")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
        /// Number of services that were searched.
        service_count: usize,
    },

    /// Failed to parse data received from device.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Connection failed with specific reason.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The device that failed to connect.
        device_id: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Write operation failed.
    #[error("Write failed to characteristic 0x{handle:04x}: {reason}")]
    WriteFailed {
        /// The characteristic handle.
        handle: u16,
        /// The reason for the failure.
        reason: String,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No valid measurement could be obtained from the sensor.
    #[error("Could not read data from Mi Flora sensor {address}")]
    NoData {
        /// The sensor that could not be read.
        address: DeviceAddress,
    },
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Device is out of range.
    OutOfRange,
    /// Connection attempt timed out.
    Timeout,
    /// The Bluetooth stack refused the connection.
    BleError(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "device out of range"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
        }
    }
}

/// Reason why a device was not found.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// Device with the given address was not seen, even after scanning.
    NotFound { address: DeviceAddress },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { address } => write!(f, "device '{}' not found", address),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific address.
    pub fn device_not_found(address: DeviceAddress) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound { address })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>, service_count: usize) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.into(),
            service_count,
        }
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device_id: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device_id, reason }
    }
}

/// Result type alias using flora-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
