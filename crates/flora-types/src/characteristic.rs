//! Characteristic map for Mi Flora sensors.
//!
//! The sensor exposes a fixed set of registers. Each one is addressable both
//! by its ATT handle (as used by handle-oriented tools) and by its UUID (as
//! used by platform BLE stacks that do not expose raw handles).

use core::fmt;

use uuid::{Uuid, uuid};

/// Value written to [`Characteristic::ModeChange`] to arm a live measurement.
///
/// The measurement characteristic returns stale or empty data unless this is
/// written first within the same connection.
pub const ARM_MEASUREMENT: [u8; 2] = [0xA0, 0x1F];

/// Device name characteristic UUID (standard GAP).
pub const DEVICE_NAME: Uuid = uuid!("00002a00-0000-1000-8000-00805f9b34fb");

/// Mode change characteristic UUID, written to arm a measurement.
pub const MODE_CHANGE: Uuid = uuid!("00001a00-0000-1000-8000-00805f9b34fb");

/// Live measurement characteristic UUID.
pub const MEASUREMENT: Uuid = uuid!("00001a01-0000-1000-8000-00805f9b34fb");

/// Firmware version and battery level characteristic UUID.
pub const FIRMWARE_BATTERY: Uuid = uuid!("00001a02-0000-1000-8000-00805f9b34fb");

/// A register on the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Characteristic {
    /// Advertised device name.
    Name = 0x0003,
    /// Mode change register; accepts [`ARM_MEASUREMENT`].
    ModeChange = 0x0033,
    /// 16-byte live measurement payload.
    Measurement = 0x0035,
    /// Battery level followed by the firmware version string.
    Firmware = 0x0038,
}

impl Characteristic {
    /// Every register the poller talks to.
    pub const ALL: [Characteristic; 4] = [
        Characteristic::Name,
        Characteristic::ModeChange,
        Characteristic::Measurement,
        Characteristic::Firmware,
    ];

    /// The ATT handle of this register.
    ///
    /// ```
    /// use flora_types::Characteristic;
    ///
    /// assert_eq!(Characteristic::Firmware.handle(), 0x38);
    /// ```
    #[must_use]
    pub const fn handle(self) -> u16 {
        self as u16
    }

    /// The UUID of this register.
    #[must_use]
    pub const fn uuid(self) -> Uuid {
        match self {
            Characteristic::Name => DEVICE_NAME,
            Characteristic::ModeChange => MODE_CHANGE,
            Characteristic::Measurement => MEASUREMENT,
            Characteristic::Firmware => FIRMWARE_BATTERY,
        }
    }

    /// Look up a register by ATT handle.
    #[must_use]
    pub fn from_handle(handle: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.handle() == handle)
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Characteristic::Name => "name",
            Characteristic::ModeChange => "mode-change",
            Characteristic::Measurement => "measurement",
            Characteristic::Firmware => "firmware",
        };
        write!(f, "{} (0x{:04x})", name, self.handle())
    }
}
