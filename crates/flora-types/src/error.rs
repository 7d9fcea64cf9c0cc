//! Error types for data parsing in flora-types.

use thiserror::Error;

/// Errors that can occur when parsing Mi Flora sensor data.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in flora-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Not enough bytes to decode the requested record.
    #[error("Insufficient bytes: requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// A value could not be interpreted.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using flora-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
