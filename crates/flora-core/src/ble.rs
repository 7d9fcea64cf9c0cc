//! Bluetooth Low Energy transport.
//!
//! [`BleTransport`] implements [`Transport`] on top of btleplug. Each
//! [`connect`](Transport::connect) locates the peripheral by MAC address,
//! connects, discovers services, and hands out a [`BleSession`] that
//! addresses characteristics by their GATT UUID.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::OnceCell;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};
use uuid::Uuid;

use flora_types::{Characteristic, DeviceAddress};

use crate::error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
use crate::transport::{Session, Transport};

/// Default timeout for the BLE connection itself.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(4);

/// Default timeout for service discovery.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Default duration of the scan run when the sensor is not yet known.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(2);

/// Timeouts used by [`BleTransport`].
///
/// The channel applies its own per-attempt timeout around each
/// connect and each operation; these bound the individual BLE steps
/// within it. [`BleConfig::connect_budget`] should not exceed
/// [`PollerConfig::attempt_timeout`](crate::PollerConfig::attempt_timeout),
/// otherwise a connect that needs a scan is cut off by the attempt timeout.
/// The defaults add up to 8 seconds, leaving room for the reads inside
/// the default attempt timeout of 10 seconds.
#[derive(Debug, Clone)]
pub struct BleConfig {
    /// Timeout for establishing the connection.
    pub connection_timeout: Duration,
    /// Timeout for service discovery.
    pub discovery_timeout: Duration,
    /// How long to scan for a sensor the adapter has not seen yet.
    pub scan_duration: Duration,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            scan_duration: DEFAULT_SCAN_DURATION,
        }
    }
}

impl BleConfig {
    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the scan duration.
    #[must_use]
    pub fn scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Worst-case time for one connect: scan, connect and discovery.
    pub fn connect_budget(&self) -> Duration {
        self.scan_duration
            .saturating_add(self.connection_timeout)
            .saturating_add(self.discovery_timeout)
    }
}

/// Transport over the first Bluetooth adapter of the host.
#[derive(Debug, Default)]
pub struct BleTransport {
    adapter: OnceCell<Adapter>,
    config: BleConfig,
}

impl BleTransport {
    /// Create a transport with default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport with custom timeouts.
    pub fn with_config(config: BleConfig) -> Self {
        Self {
            adapter: OnceCell::new(),
            config,
        }
    }

    /// The transport configuration.
    pub fn config(&self) -> &BleConfig {
        &self.config
    }

    async fn adapter(&self) -> Result<&Adapter> {
        self.adapter
            .get_or_try_init(|| async {
                let manager = Manager::new().await?;
                manager
                    .adapters()
                    .await?
                    .into_iter()
                    .next()
                    .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
            })
            .await
    }

    /// Find the peripheral, scanning only if the adapter does not know it yet.
    async fn find_peripheral(&self, address: &DeviceAddress) -> Result<Peripheral> {
        let adapter = self.adapter().await?;

        if let Some(peripheral) = known_peripheral(adapter, address).await? {
            debug!("Found {} without scanning", address);
            return Ok(peripheral);
        }

        info!("Scanning {:?} for {}", self.config.scan_duration, address);
        adapter.start_scan(ScanFilter::default()).await?;
        sleep(self.config.scan_duration).await;
        adapter.stop_scan().await?;

        known_peripheral(adapter, address)
            .await?
            .ok_or_else(|| Error::device_not_found(*address))
    }
}

async fn known_peripheral(adapter: &Adapter, address: &DeviceAddress) -> Result<Option<Peripheral>> {
    for peripheral in adapter.peripherals().await? {
        let Some(props) = peripheral.properties().await? else {
            continue;
        };
        if props.address.into_inner() == *address.as_bytes() {
            return Ok(Some(peripheral));
        }
    }
    Ok(None)
}

#[async_trait]
impl Transport for BleTransport {
    type Session = BleSession;

    #[tracing::instrument(level = "debug", skip(self, address), fields(address = %address))]
    async fn connect(&self, address: &DeviceAddress) -> Result<BleSession> {
        let peripheral = self.find_peripheral(address).await?;

        let reason = match timeout(self.config.connection_timeout, peripheral.connect()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(ConnectionFailureReason::BleError(e.to_string())),
            Err(_) => Some(ConnectionFailureReason::Timeout),
        };
        if let Some(reason) = reason {
            if let Err(e) = peripheral.disconnect().await {
                debug!("Disconnecting {} after failed connect: {}", address, e);
            }
            return Err(Error::connection_failed(Some(address.to_string()), reason));
        }

        if let Err(e) = discover(&peripheral, self.config.discovery_timeout).await {
            // Leave nothing half-open behind
            if let Err(close) = peripheral.disconnect().await {
                debug!("Disconnecting {} after failed discovery: {}", address, close);
            }
            return Err(e);
        }

        let mut characteristics = HashMap::new();
        for service in peripheral.services() {
            for characteristic in service.characteristics {
                characteristics.insert(characteristic.uuid, characteristic);
            }
        }
        debug!("Connected with {} characteristics", characteristics.len());

        Ok(BleSession {
            peripheral,
            characteristics,
        })
    }
}

async fn discover(peripheral: &Peripheral, limit: Duration) -> Result<()> {
    timeout(limit, peripheral.discover_services())
        .await
        .map_err(|_| Error::timeout("discover services", limit))??;
    Ok(())
}

/// An open connection to one sensor.
#[derive(Debug)]
pub struct BleSession {
    peripheral: Peripheral,
    characteristics: HashMap<Uuid, btleplug::api::Characteristic>,
}

impl BleSession {
    fn lookup(&self, characteristic: Characteristic) -> Result<&btleplug::api::Characteristic> {
        self.characteristics
            .get(&characteristic.uuid())
            .ok_or_else(|| {
                Error::characteristic_not_found(
                    characteristic.uuid().to_string(),
                    self.peripheral.services().len(),
                )
            })
    }
}

#[async_trait]
impl Session for BleSession {
    async fn read_characteristic(&mut self, characteristic: Characteristic) -> Result<Vec<u8>> {
        let target = self.lookup(characteristic)?;
        let data = self.peripheral.read(target).await?;
        debug!("Read {} bytes from {}", data.len(), characteristic);
        Ok(data)
    }

    async fn write_characteristic(
        &mut self,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<()> {
        let target = self.lookup(characteristic)?;
        self.peripheral
            .write(target, value, WriteType::WithResponse)
            .await
            .map_err(|e| Error::WriteFailed {
                handle: characteristic.handle(),
                reason: e.to_string(),
            })
    }

    async fn close(&mut self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = BleConfig::default();
        assert_eq!(config.connection_timeout, Duration::from_secs(4));
        assert_eq!(config.discovery_timeout, Duration::from_secs(2));
        assert_eq!(config.scan_duration, Duration::from_secs(2));
    }

    #[test]
    fn test_default_connect_fits_attempt_timeout() {
        let budget = BleConfig::default().connect_budget();
        assert!(budget < crate::config::DEFAULT_ATTEMPT_TIMEOUT);

        let slow = BleConfig::default().scan_duration(Duration::MAX);
        assert_eq!(slow.connect_budget(), Duration::MAX);
    }

    #[test]
    fn test_config_builder() {
        let config = BleConfig::default()
            .connection_timeout(Duration::from_secs(20))
            .discovery_timeout(Duration::from_secs(8))
            .scan_duration(Duration::from_secs(2));
        assert_eq!(config.connection_timeout, Duration::from_secs(20));
        assert_eq!(config.discovery_timeout, Duration::from_secs(8));
        assert_eq!(config.scan_duration, Duration::from_secs(2));

        let transport = BleTransport::with_config(config);
        assert_eq!(transport.config().scan_duration, Duration::from_secs(2));
    }
}
