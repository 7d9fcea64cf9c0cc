//! Transport abstraction.
//!
//! The poller never talks to a radio directly. It is handed a [`Transport`]
//! that can open one [`Session`] to a sensor; each session is a single
//! connect → operate → disconnect cycle. [`BleTransport`](crate::BleTransport)
//! implements this over the host Bluetooth stack and
//! [`MockTransport`](crate::MockTransport) implements it for tests.

use std::sync::Arc;

use async_trait::async_trait;

use flora_types::{Characteristic, DeviceAddress};

use crate::error::Result;

/// Something that can open sessions to a sensor.
///
/// # Example
///
/// ```ignore
/// use flora_core::{Session, Transport, Result};
/// use flora_types::{Characteristic, DeviceAddress};
///
/// async fn read_name<T: Transport>(t: &T, address: &DeviceAddress) -> Result<Vec<u8>> {
///     let mut session = t.connect(address).await?;
///     let name = session.read_characteristic(Characteristic::Name).await;
///     session.close().await?;
///     name
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// The session type produced by [`connect`](Transport::connect).
    type Session: Session;

    /// Connect to the sensor at `address`.
    async fn connect(&self, address: &DeviceAddress) -> Result<Self::Session>;
}

/// One open connection to a sensor.
#[async_trait]
pub trait Session: Send {
    /// Read the current value of a characteristic.
    async fn read_characteristic(&mut self, characteristic: Characteristic) -> Result<Vec<u8>>;

    /// Write a value to a characteristic.
    async fn write_characteristic(
        &mut self,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<()>;

    /// Disconnect. The session must not be used afterwards.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    type Session = T::Session;

    async fn connect(&self, address: &DeviceAddress) -> Result<Self::Session> {
        (**self).connect(address).await
    }
}
