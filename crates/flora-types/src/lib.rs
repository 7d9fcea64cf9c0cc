//! Platform-agnostic types for Mi Flora plant sensors.
//!
//! This crate provides the protocol-level pieces shared by any transport:
//! hardware addresses, the characteristic map, and decoders for the
//! measurement and firmware records. It performs no I/O.
//!
//! # Example
//!
//! ```
//! use flora_types::{FirmwareInfo, Parameter, ParsedReading};
//!
//! let firmware = FirmwareInfo::from_bytes(b"\x64\x153.2.1").unwrap();
//! assert_eq!(firmware.battery, 100);
//!
//! let payload = [0xED, 0x00, 0, 0x2C, 0x01, 0, 0, 40, 0x96, 0x00, 0, 0, 0, 0, 0, 0];
//! let reading = ParsedReading::decode(&payload);
//! assert_eq!(reading.value(Parameter::Light), Some(300.0));
//! ```

pub mod address;
pub mod characteristic;
pub mod error;
pub mod firmware;
pub mod reading;

pub use address::DeviceAddress;
pub use characteristic::{ARM_MEASUREMENT, Characteristic};
pub use error::{ParseError, ParseResult};
pub use firmware::{FirmwareInfo, version_at_least};
pub use reading::{MEASUREMENT_LEN, Parameter, ParsedReading, decode_char_codes};

#[cfg(test)]
mod tests {
    use super::*;

    // --- ParseError tests ---

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::InvalidValue("test message".to_string());
        assert_eq!(err.to_string(), "Invalid value: test message");

        let err = ParseError::InsufficientBytes {
            expected: 16,
            actual: 3,
        };
        assert_eq!(err.to_string(), "Insufficient bytes: requires 16 bytes, got 3");
    }

    // --- Serialization tests ---

    #[cfg(feature = "serde")]
    #[test]
    fn test_parsed_reading_serialization() {
        let reading = ParsedReading {
            temperature: 20.5,
            light: 300,
            moisture: 45,
            conductivity: 150,
        };

        let json = serde_json::to_string(&reading).unwrap();
        assert!(json.contains("\"light\":300"));
        assert!(json.contains("\"moisture\":45"));

        let back: ParsedReading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reading);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_parameter_serialization() {
        assert_eq!(
            serde_json::to_string(&Parameter::Conductivity).unwrap(),
            "\"conductivity\""
        );
        let p: Parameter = serde_json::from_str("\"battery\"").unwrap();
        assert_eq!(p, Parameter::Battery);
    }
}
