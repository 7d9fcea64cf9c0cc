//! Firmware/battery record decoding.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::reading::decode_char_codes;

/// Minimum length of a firmware record: battery byte plus separator.
pub const MIN_FIRMWARE_BYTES: usize = 2;

/// Contents of the firmware characteristic.
///
/// The battery level is piggybacked on this record, so reading either one
/// refreshes both.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FirmwareInfo {
    /// Battery charge in percent.
    pub battery: u8,
    /// Firmware version, e.g. `"3.2.1"`.
    pub version: String,
}

impl FirmwareInfo {
    /// Decode the firmware characteristic.
    ///
    /// The byte format is:
    /// - byte 0: Battery level (u8, percent)
    /// - byte 1: reserved
    /// - bytes 2..: Version string, one character per byte
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` is shorter than
    /// [`MIN_FIRMWARE_BYTES`].
    ///
    /// # Examples
    ///
    /// ```
    /// use flora_types::FirmwareInfo;
    ///
    /// let info = FirmwareInfo::from_bytes(b"\x5f\x152.7.0").unwrap();
    /// assert_eq!(info.battery, 95);
    /// assert_eq!(info.version, "2.7.0");
    /// ```
    #[must_use = "parsing returns a Result that should be handled"]
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < MIN_FIRMWARE_BYTES {
            return Err(ParseError::InsufficientBytes {
                expected: MIN_FIRMWARE_BYTES,
                actual: data.len(),
            });
        }

        Ok(FirmwareInfo {
            battery: data[0],
            version: decode_char_codes(&data[MIN_FIRMWARE_BYTES..]),
        })
    }

    /// Whether this firmware is `minimum` or newer.
    ///
    /// Versions are compared as plain strings, which is how the vendor
    /// orders them.
    #[must_use]
    pub fn at_least(&self, minimum: &str) -> bool {
        version_at_least(&self.version, minimum)
    }
}

/// Lexicographic firmware version comparison.
///
/// ```
/// use flora_types::version_at_least;
///
/// assert!(version_at_least("2.6.6", "2.6.6"));
/// assert!(version_at_least("3.1.9", "2.6.6"));
/// assert!(!version_at_least("2.6.5", "2.6.6"));
/// ```
#[must_use]
pub fn version_at_least(version: &str, minimum: &str) -> bool {
    version >= minimum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_firmware_record() {
        let info = FirmwareInfo::from_bytes(&[100, 0x15, b'3', b'.', b'1', b'.', b'8']).unwrap();
        assert_eq!(info.battery, 100);
        assert_eq!(info.version, "3.1.8");
        assert!(info.at_least("2.6.6"));
    }

    #[test]
    fn test_parse_battery_only() {
        let info = FirmwareInfo::from_bytes(&[42, 0x15]).unwrap();
        assert_eq!(info.battery, 42);
        assert_eq!(info.version, "");
    }

    #[test]
    fn test_parse_too_short() {
        assert_eq!(
            FirmwareInfo::from_bytes(&[42]),
            Err(ParseError::InsufficientBytes {
                expected: 2,
                actual: 1
            })
        );
        assert!(FirmwareInfo::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_version_ordering_is_lexicographic() {
        assert!(version_at_least("2.6.6", "2.6.6"));
        assert!(version_at_least("2.7.0", "2.6.6"));
        assert!(!version_at_least("2.6.5", "2.6.6"));
        assert!(!version_at_least("", "2.6.6"));
        // String ordering, not numeric: "2.10.0" sorts before "2.6.6"
        assert!(!version_at_least("2.10.0", "2.6.6"));
    }
}
