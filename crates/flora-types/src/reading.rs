//! Measurement payload decoding.

use core::fmt;
use core::str::FromStr;

use bytes::Buf;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Length of the live measurement payload in bytes.
pub const MEASUREMENT_LEN: usize = 16;

/// A value the sensor can report.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new parameters
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[non_exhaustive]
pub enum Parameter {
    /// Air temperature in °C.
    Temperature,
    /// Illuminance in lux.
    Light,
    /// Soil moisture in percent.
    Moisture,
    /// Soil conductivity (fertility) in µS/cm.
    Conductivity,
    /// Battery charge in percent. Not part of the measurement payload.
    Battery,
}

impl Parameter {
    /// All parameters, in display order.
    pub const ALL: [Parameter; 5] = [
        Parameter::Temperature,
        Parameter::Light,
        Parameter::Moisture,
        Parameter::Conductivity,
        Parameter::Battery,
    ];

    /// Lower-case name used in configuration and display.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Parameter::Temperature => "temperature",
            Parameter::Light => "light",
            Parameter::Moisture => "moisture",
            Parameter::Conductivity => "conductivity",
            Parameter::Battery => "battery",
        }
    }

    /// Unit symbol for this parameter.
    #[must_use]
    pub const fn unit(self) -> &'static str {
        match self {
            Parameter::Temperature => "°C",
            Parameter::Light => "lx",
            Parameter::Moisture | Parameter::Battery => "%",
            Parameter::Conductivity => "µS/cm",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = ParseError;

    /// Parse a parameter name (case-insensitive).
    ///
    /// ```
    /// use flora_types::Parameter;
    ///
    /// assert_eq!("Moisture".parse::<Parameter>(), Ok(Parameter::Moisture));
    /// assert!("humidity".parse::<Parameter>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Parameter::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| ParseError::InvalidValue(format!("unknown parameter '{}'", s)))
    }
}

/// Values decoded from one measurement payload.
///
/// Never stored on its own: the poller keeps the raw payload and decodes it
/// on each access.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParsedReading {
    /// Temperature in °C, 0.1 °C resolution.
    pub temperature: f64,
    /// Illuminance in lux.
    pub light: u16,
    /// Soil moisture in percent.
    pub moisture: u8,
    /// Soil conductivity in µS/cm.
    pub conductivity: u16,
}

impl ParsedReading {
    /// Decode a measurement payload.
    ///
    /// The byte format is:
    /// - bytes 0-1: Temperature (u16 LE, divide by 10 for Celsius)
    /// - byte 2: unused
    /// - bytes 3-4: Light (u16 LE, lux)
    /// - bytes 5-6: unused
    /// - byte 7: Moisture (u8, percent)
    /// - bytes 8-9: Conductivity (u16 LE, µS/cm)
    /// - bytes 10-15: unused
    ///
    /// ```
    /// use flora_types::ParsedReading;
    ///
    /// let payload = [
    ///     0xC8, 0x00, 0x00, 0x00, 0x2C, 0x01, 0x00, 0x2D,
    ///     0x00, 0x96, 0, 0, 0, 0, 0, 0,
    /// ];
    /// let reading = ParsedReading::decode(&payload);
    /// assert_eq!(reading.temperature, 20.0);
    /// assert_eq!(reading.moisture, 45);
    /// // Light and conductivity are little-endian: bytes 3-4 = 00 2C and
    /// // bytes 8-9 = 00 96 read as 0x2C00 and 0x9600, not 300 and 150.
    /// assert_eq!(reading.light, 0x2C00);
    /// assert_eq!(reading.conductivity, 0x9600);
    /// ```
    #[must_use]
    pub fn decode(payload: &[u8; MEASUREMENT_LEN]) -> Self {
        let mut buf = &payload[..];
        let temp_raw = buf.get_u16_le();
        buf.advance(1);
        let light = buf.get_u16_le();
        buf.advance(2);
        let moisture = buf.get_u8();
        let conductivity = buf.get_u16_le();

        ParsedReading {
            temperature: f64::from(temp_raw) / 10.0,
            light,
            moisture,
            conductivity,
        }
    }

    /// Decode a measurement payload from a slice.
    ///
    /// Bytes past [`MEASUREMENT_LEN`] are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` is shorter than
    /// [`MEASUREMENT_LEN`].
    #[must_use = "parsing returns a Result that should be handled"]
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        let payload: &[u8; MEASUREMENT_LEN] = data
            .get(..MEASUREMENT_LEN)
            .and_then(|head| head.try_into().ok())
            .ok_or(ParseError::InsufficientBytes {
                expected: MEASUREMENT_LEN,
                actual: data.len(),
            })?;
        Ok(Self::decode(payload))
    }

    /// Value of a measurement parameter.
    ///
    /// Returns `None` for [`Parameter::Battery`], which is reported through
    /// the firmware characteristic instead.
    #[must_use]
    pub fn value(&self, parameter: Parameter) -> Option<f64> {
        match parameter {
            Parameter::Temperature => Some(self.temperature),
            Parameter::Light => Some(f64::from(self.light)),
            Parameter::Moisture => Some(f64::from(self.moisture)),
            Parameter::Conductivity => Some(f64::from(self.conductivity)),
            Parameter::Battery => None,
        }
    }
}

/// Decode bytes by mapping each one directly to the character with that code.
///
/// The sensor's name and firmware fields are not UTF-8; a byte above 0x7F
/// becomes the Latin-1 character with the same code point.
///
/// ```
/// use flora_types::decode_char_codes;
///
/// assert_eq!(decode_char_codes(b"Flower care"), "Flower care");
/// assert_eq!(decode_char_codes(&[0x33, 0xE9]), "3é");
/// ```
#[must_use]
pub fn decode_char_codes(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}


/// Property-based tests for the measurement decoder.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn decode_is_deterministic(payload in proptest::array::uniform16(any::<u8>())) {
            prop_assert_eq!(ParsedReading::decode(&payload), ParsedReading::decode(&payload));
        }

        #[test]
        fn from_bytes_never_panics(data in proptest::collection::vec(any::<u8>(), 0..32)) {
            let result = ParsedReading::from_bytes(&data);
            prop_assert_eq!(result.is_ok(), data.len() >= MEASUREMENT_LEN);
        }

        #[test]
        fn moisture_is_byte_seven(payload in proptest::array::uniform16(any::<u8>())) {
            prop_assert_eq!(ParsedReading::decode(&payload).moisture, payload[7]);
        }
    }
}
