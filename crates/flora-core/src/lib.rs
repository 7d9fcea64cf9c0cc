//! Polling, caching and validation engine for Xiaomi Mi Flora plant sensors.
//!
//! A Mi Flora sensor reports temperature, light, soil moisture, soil
//! conductivity and battery level over Bluetooth Low Energy. Reading it is
//! slow, power-hungry for the sensor, and unreliable, so this crate puts a
//! cache and a retry policy in front of every access.
//!
//! # Features
//!
//! - **Cached measurements**: One armed measurement read serves every
//!   parameter until the cache times out (10 minutes by default)
//! - **Failure backoff**: A failed refresh is retried after 5 minutes rather
//!   than on every call
//! - **Bounded retries**: Each operation is one connect → operate →
//!   disconnect session, retried a fixed number of times under a timeout
//! - **Payload validation**: Implausible frames are discarded
//! - **Firmware/battery tracking**: Read at most once a day
//! - **Pluggable transport**: [`BleTransport`] for real sensors,
//!   [`MockTransport`] for tests
//!
//! # Quick Start
//!
//! ```no_run
//! use flora_core::{BleTransport, SensorPoller};
//! use flora_types::Parameter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let poller = SensorPoller::new("C4:7C:8D:6A:3E:11".parse()?, BleTransport::new());
//!
//!     for parameter in Parameter::ALL {
//!         let value = poller.parameter_value(parameter, true).await?;
//!         println!("{}: {} {}", parameter, value, parameter.unit());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! Only the first call above touches the radio; the remaining parameters
//! come from the cache and the firmware record read alongside it.

pub mod ble;
pub mod channel;
pub mod config;
pub mod error;
pub mod mock;
pub mod poller;
pub mod transport;
pub mod validation;

pub use ble::{BleConfig, BleSession, BleTransport};
pub use channel::RetryingChannel;
pub use config::{ConfigError, PollerConfig};
pub use error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
pub use mock::{MockSession, MockTransport, MockTransportBuilder};
pub use poller::{CacheStatus, SensorPoller};
pub use transport::{Session, Transport};
pub use validation::{PayloadValidator, Rejection, ValidatorConfig};

// Re-export the protocol types so most users need only this crate.
pub use flora_types::{
    Characteristic, DeviceAddress, FirmwareInfo, MEASUREMENT_LEN, Parameter, ParsedReading,
};
