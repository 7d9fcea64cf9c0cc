//! Sanity checks for raw measurement payloads.
//!
//! The sensor occasionally returns frames that decode fine but are
//! obviously wrong. Such payloads are discarded and treated exactly like a
//! failed read.
//!
//! # Example
//!
//! ```
//! use flora_core::PayloadValidator;
//!
//! let validator = PayloadValidator::default();
//!
//! let mut payload = [0u8; 16];
//! payload[0] = 0xC8;
//! payload[7] = 101; // moisture over 100 %
//! assert!(validator.validate(&payload, "2.6.5").is_none());
//!
//! payload[7] = 100;
//! assert!(validator.validate(&payload, "2.6.5").is_some());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use flora_types::{MEASUREMENT_LEN, version_at_least};

/// Byte offset of the moisture value.
const MOISTURE_OFFSET: usize = 7;

/// Byte offset where the extended block begins.
const EXTENDED_BLOCK_OFFSET: usize = 10;

/// Why a payload was discarded.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new rules
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Rejection {
    /// Payload is not a measurement frame.
    InvalidLength { expected: usize, actual: usize },
    /// Moisture byte is above the allowed maximum.
    MoistureOutOfRange { value: u8, max: u8 },
    /// Bytes from offset 10 onward are all zero on firmware that always fills them.
    NullExtendedBlock { firmware: String },
    /// The whole frame is zero.
    AllZeros,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::InvalidLength { expected, actual } => {
                write!(f, "expected {} bytes, got {}", expected, actual)
            }
            Rejection::MoistureOutOfRange { value, max } => {
                write!(f, "moisture {}% exceeds maximum {}%", value, max)
            }
            Rejection::NullExtendedBlock { firmware } => {
                write!(f, "empty extended block on firmware {}", firmware)
            }
            Rejection::AllZeros => write!(f, "all bytes are zero"),
        }
    }
}

/// Configuration for payload validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Highest acceptable moisture value.
    pub moisture_max: u8,
    /// First firmware version whose frames always carry a non-zero extended block.
    pub null_extension_since: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            moisture_max: 100,
            null_extension_since: "2.6.6".to_string(),
        }
    }
}

/// Firmware-aware payload validator.
#[derive(Debug, Clone, Default)]
pub struct PayloadValidator {
    config: ValidatorConfig,
}

impl PayloadValidator {
    /// Create a validator with the given configuration.
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Run every rule in order and report the first one that fails.
    ///
    /// An empty `firmware` string skips the firmware-gated rule.
    pub fn check(&self, payload: &[u8], firmware: &str) -> Result<(), Rejection> {
        if payload.len() != MEASUREMENT_LEN {
            return Err(Rejection::InvalidLength {
                expected: MEASUREMENT_LEN,
                actual: payload.len(),
            });
        }

        let moisture = payload[MOISTURE_OFFSET];
        if moisture > self.config.moisture_max {
            return Err(Rejection::MoistureOutOfRange {
                value: moisture,
                max: self.config.moisture_max,
            });
        }

        if !firmware.is_empty()
            && version_at_least(firmware, &self.config.null_extension_since)
            && byte_sum(&payload[EXTENDED_BLOCK_OFFSET..]) == 0
        {
            return Err(Rejection::NullExtendedBlock {
                firmware: firmware.to_string(),
            });
        }

        if byte_sum(payload) == 0 {
            return Err(Rejection::AllZeros);
        }

        Ok(())
    }

    /// Return the payload as a measurement frame if it passes every rule.
    pub fn validate(&self, payload: &[u8], firmware: &str) -> Option<[u8; MEASUREMENT_LEN]> {
        self.check(payload, firmware).ok()?;
        payload.try_into().ok()
    }
}

fn byte_sum(bytes: &[u8]) -> u32 {
    bytes.iter().map(|&b| u32::from(b)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A healthy frame as sent by newer firmware.
    fn frame() -> [u8; MEASUREMENT_LEN] {
        [
            0xC8, 0x00, 0x00, 0x2C, 0x01, 0x00, 0x00, 0x2D, 0x96, 0x00, 0x02, 0x3C, 0x00, 0xFB,
            0x34, 0x9B,
        ]
    }

    #[test]
    fn test_valid_frame() {
        let validator = PayloadValidator::default();
        assert_eq!(validator.check(&frame(), "3.2.1"), Ok(()));
        assert_eq!(validator.validate(&frame(), "3.2.1"), Some(frame()));
    }

    #[test]
    fn test_moisture_boundary() {
        let validator = PayloadValidator::default();
        let mut payload = frame();

        payload[7] = 100;
        assert!(validator.validate(&payload, "2.6.5").is_some());

        payload[7] = 101;
        assert_eq!(
            validator.check(&payload, "2.6.5"),
            Err(Rejection::MoistureOutOfRange {
                value: 101,
                max: 100
            })
        );
        assert!(validator.validate(&payload, "2.6.5").is_none());
    }

    #[test]
    fn test_null_extended_block_gated_by_firmware() {
        let validator = PayloadValidator::default();
        let mut payload = frame();
        payload[10..].fill(0);

        assert!(validator.validate(&payload, "2.6.5").is_some());
        assert!(validator.validate(&payload, "2.6.6").is_none());
        assert!(validator.validate(&payload, "3.1.8").is_none());
        assert_eq!(
            validator.check(&payload, "2.6.6"),
            Err(Rejection::NullExtendedBlock {
                firmware: "2.6.6".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_firmware_skips_gate() {
        let validator = PayloadValidator::default();
        let mut payload = frame();
        payload[10..].fill(0);
        assert!(validator.validate(&payload, "").is_some());
    }

    #[test]
    fn test_all_zero_frame() {
        let validator = PayloadValidator::default();
        let payload = [0u8; MEASUREMENT_LEN];
        assert_eq!(validator.check(&payload, "2.6.5"), Err(Rejection::AllZeros));
        // On newer firmware the extended-block rule fires first
        assert!(matches!(
            validator.check(&payload, "2.6.6"),
            Err(Rejection::NullExtendedBlock { .. })
        ));
    }

    #[test]
    fn test_rules_apply_in_order() {
        let validator = PayloadValidator::default();
        let mut payload = [0u8; MEASUREMENT_LEN];
        payload[7] = 200;
        assert!(matches!(
            validator.check(&payload, "3.0.0"),
            Err(Rejection::MoistureOutOfRange { .. })
        ));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let validator = PayloadValidator::default();
        assert_eq!(
            validator.check(&[1, 2, 3], "2.6.5"),
            Err(Rejection::InvalidLength {
                expected: 16,
                actual: 3
            })
        );
        assert!(validator.validate(&[1u8; 17], "2.6.5").is_none());
        assert!(validator.validate(&[], "2.6.5").is_none());
    }

    #[test]
    fn test_custom_config() {
        let validator = PayloadValidator::new(ValidatorConfig {
            moisture_max: 80,
            null_extension_since: "9.0.0".to_string(),
        });
        let mut payload = frame();
        payload[7] = 81;
        assert!(validator.validate(&payload, "3.2.1").is_none());

        payload[7] = 50;
        payload[10..].fill(0);
        assert!(validator.validate(&payload, "3.2.1").is_some());
    }

    #[test]
    fn test_rejection_display() {
        assert_eq!(
            Rejection::MoistureOutOfRange {
                value: 101,
                max: 100
            }
            .to_string(),
            "moisture 101% exceeds maximum 100%"
        );
        assert_eq!(Rejection::AllZeros.to_string(), "all bytes are zero");
    }

    #[test]
    fn test_rejection_serialization() {
        let rejection = Rejection::NullExtendedBlock {
            firmware: "3.2.1".to_string(),
        };
        let json = serde_json::to_string(&rejection).unwrap();
        assert!(json.contains("3.2.1"));
        let back: Rejection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rejection);
    }
}

/// Property-based tests for the validator.
#[cfg(test)]
mod proptests {
    use super::*;
    use flora_types::ParsedReading;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn validate_then_decode_is_deterministic(
            payload in proptest::array::uniform16(any::<u8>()),
            firmware in "[0-9]\\.[0-9]\\.[0-9]",
        ) {
            let validator = PayloadValidator::default();
            let first = validator.validate(&payload, &firmware).map(|p| ParsedReading::decode(&p));
            let second = validator.validate(&payload, &firmware).map(|p| ParsedReading::decode(&p));
            prop_assert_eq!(first, second);
        }

        #[test]
        fn accepted_frames_have_moisture_in_range(
            payload in proptest::array::uniform16(any::<u8>()),
        ) {
            if let Some(frame) = PayloadValidator::default().validate(&payload, "2.6.5") {
                prop_assert!(ParsedReading::decode(&frame).moisture <= 100);
            }
        }

        #[test]
        fn check_never_panics(data in proptest::collection::vec(any::<u8>(), 0..40)) {
            let _ = PayloadValidator::default().check(&data, "3.2.1");
        }
    }
}
