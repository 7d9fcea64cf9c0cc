//! Mock transport implementation for testing.
//!
//! This module provides a scriptable [`Transport`] that behaves like a
//! Mi Flora sensor without requiring BLE hardware.
//!
//! # Features
//!
//! - **Canned responses**: Set the bytes returned for each characteristic
//! - **Failure injection**: Fail the next N connects, or every operation
//! - **Latency simulation**: Delay connects and reads to exercise timeouts
//! - **Call accounting**: Count connections, reads and writes for assertions
//!
//! Like the real sensor, the measurement characteristic only returns live
//! data after [`ARM_MEASUREMENT`] has been written in the same session;
//! otherwise it returns an all-zero frame.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use flora_types::{ARM_MEASUREMENT, Characteristic, DeviceAddress, MEASUREMENT_LEN};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::transport::{Session, Transport};

#[derive(Debug, Default)]
struct MockState {
    responses: RwLock<HashMap<Characteristic, Vec<u8>>>,
    writes: RwLock<Vec<(Characteristic, Vec<u8>)>>,
    unavailable: RwLock<Vec<Characteristic>>,
    connect_count: AtomicU32,
    close_count: AtomicU32,
    measurement_reads: AtomicU32,
    firmware_reads: AtomicU32,
    name_reads: AtomicU32,
    always_fail: AtomicBool,
    /// Number of connects to fail before succeeding.
    remaining_failures: AtomicU32,
    /// Simulated connect latency in milliseconds (0 = no delay).
    connect_latency_ms: AtomicU64,
    /// Simulated read latency in milliseconds (0 = no delay).
    read_latency_ms: AtomicU64,
}

/// A mock Mi Flora sensor for testing.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the poller owns another.
///
/// # Example
///
/// ```
/// use flora_core::{MockTransport, SensorPoller};
/// use flora_types::{DeviceAddress, Parameter};
///
/// #[tokio::main]
/// async fn main() {
///     let mock = MockTransport::builder()
///         .firmware(90, "3.2.1")
///         .measurement([
///             0xED, 0x00, 0, 0x2C, 0x01, 0, 0, 40, 0x96, 0x00, 0x02, 0x3C, 0x00, 0xFB, 0x34, 0x9B,
///         ])
///         .build();
///     let address = DeviceAddress::new([0xC4, 0x7C, 0x8D, 0x6A, 0x3E, 0x11]);
///     let poller = SensorPoller::new(address, mock.clone());
///
///     let moisture = poller.parameter_value(Parameter::Moisture, true).await.unwrap();
///     assert_eq!(moisture, 40.0);
///     assert_eq!(mock.measurement_reads(), 1);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    /// Create a mock that answers nothing; every read fails until responses are set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a mock with canned responses.
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::new()
    }

    // --- Test control methods ---

    /// Set the bytes returned when `characteristic` is read.
    pub async fn set_response(&self, characteristic: Characteristic, data: Vec<u8>) {
        self.state
            .responses
            .write()
            .await
            .insert(characteristic, data);
    }

    /// Set the measurement payload.
    pub async fn set_measurement(&self, payload: [u8; MEASUREMENT_LEN]) {
        self.set_response(Characteristic::Measurement, payload.to_vec())
            .await;
    }

    /// Set the firmware record from a battery level and version string.
    pub async fn set_firmware(&self, battery: u8, version: &str) {
        self.set_response(Characteristic::Firmware, firmware_record(battery, version))
            .await;
    }

    /// Make reads of `characteristic` fail (or succeed again).
    pub async fn set_unavailable(&self, characteristic: Characteristic, unavailable: bool) {
        let mut list = self.state.unavailable.write().await;
        list.retain(|c| *c != characteristic);
        if unavailable {
            list.push(characteristic);
        }
    }

    /// Make every connect fail (or succeed again).
    pub fn set_always_fail(&self, fail: bool) {
        self.state.always_fail.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` connects, then succeed.
    ///
    /// This is useful for testing retry logic.
    pub fn fail_connects(&self, count: u32) {
        self.state
            .remaining_failures
            .store(count, Ordering::Relaxed);
    }

    /// Set simulated connect latency.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.state
            .connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set simulated read latency.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_read_latency(&self, latency: Duration) {
        self.state
            .read_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    // --- Call accounting ---

    /// Number of connect attempts, successful or not.
    pub fn connect_count(&self) -> u32 {
        self.state.connect_count.load(Ordering::Relaxed)
    }

    /// Number of sessions closed.
    pub fn close_count(&self) -> u32 {
        self.state.close_count.load(Ordering::Relaxed)
    }

    /// Number of measurement characteristic reads.
    pub fn measurement_reads(&self) -> u32 {
        self.state.measurement_reads.load(Ordering::Relaxed)
    }

    /// Number of firmware characteristic reads.
    pub fn firmware_reads(&self) -> u32 {
        self.state.firmware_reads.load(Ordering::Relaxed)
    }

    /// Number of name characteristic reads.
    pub fn name_reads(&self) -> u32 {
        self.state.name_reads.load(Ordering::Relaxed)
    }

    /// All writes performed, in order.
    pub async fn writes(&self) -> Vec<(Characteristic, Vec<u8>)> {
        self.state.writes.read().await.clone()
    }

    /// Reset all counters and the write log.
    pub async fn reset_counts(&self) {
        self.state.connect_count.store(0, Ordering::Relaxed);
        self.state.close_count.store(0, Ordering::Relaxed);
        self.state.measurement_reads.store(0, Ordering::Relaxed);
        self.state.firmware_reads.store(0, Ordering::Relaxed);
        self.state.name_reads.store(0, Ordering::Relaxed);
        self.state.writes.write().await.clear();
    }
}

/// Encode a firmware record the way the sensor sends it.
fn firmware_record(battery: u8, version: &str) -> Vec<u8> {
    let mut record = vec![battery, 0x15];
    record.extend(version.chars().map(|c| c as u8));
    record
}

#[async_trait]
impl Transport for MockTransport {
    type Session = MockSession;

    async fn connect(&self, address: &DeviceAddress) -> Result<MockSession> {
        let state = &self.state;
        state.connect_count.fetch_add(1, Ordering::Relaxed);

        let latency = state.connect_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        // Check for transient failures first
        if state.remaining_failures.load(Ordering::Relaxed) > 0 {
            state.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::connection_failed(
                Some(address.to_string()),
                ConnectionFailureReason::OutOfRange,
            ));
        }

        if state.always_fail.load(Ordering::Relaxed) {
            return Err(Error::connection_failed(
                Some(address.to_string()),
                ConnectionFailureReason::OutOfRange,
            ));
        }

        Ok(MockSession {
            state: Arc::clone(&self.state),
            open: true,
            armed: false,
        })
    }
}

/// A session opened by [`MockTransport`].
#[derive(Debug)]
pub struct MockSession {
    state: Arc<MockState>,
    open: bool,
    armed: bool,
}

impl MockSession {
    fn check_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[async_trait]
impl Session for MockSession {
    async fn read_characteristic(&mut self, characteristic: Characteristic) -> Result<Vec<u8>> {
        self.check_open()?;

        let counter = match characteristic {
            Characteristic::Measurement => Some(&self.state.measurement_reads),
            Characteristic::Firmware => Some(&self.state.firmware_reads),
            Characteristic::Name => Some(&self.state.name_reads),
            Characteristic::ModeChange => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        let latency = self.state.read_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.state.unavailable.read().await.contains(&characteristic) {
            return Err(Error::InvalidData(format!(
                "mock read of {} failed",
                characteristic
            )));
        }

        if characteristic == Characteristic::Measurement && !self.armed {
            return Ok(vec![0; MEASUREMENT_LEN]);
        }

        self.state
            .responses
            .read()
            .await
            .get(&characteristic)
            .cloned()
            .ok_or_else(|| {
                Error::characteristic_not_found(characteristic.uuid().to_string(), 0)
            })
    }

    async fn write_characteristic(
        &mut self,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<()> {
        self.check_open()?;
        self.state
            .writes
            .write()
            .await
            .push((characteristic, value.to_vec()));

        if characteristic == Characteristic::ModeChange && value == ARM_MEASUREMENT {
            self.armed = true;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.state.close_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// Builder for creating mock transports with canned responses.
#[derive(Debug, Default)]
pub struct MockTransportBuilder {
    responses: HashMap<Characteristic, Vec<u8>>,
}

impl MockTransportBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the device name.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.responses
            .insert(Characteristic::Name, name.as_bytes().to_vec());
        self
    }

    /// Set the battery level and firmware version.
    #[must_use]
    pub fn firmware(mut self, battery: u8, version: &str) -> Self {
        self.responses
            .insert(Characteristic::Firmware, firmware_record(battery, version));
        self
    }

    /// Set the measurement payload.
    #[must_use]
    pub fn measurement(mut self, payload: [u8; MEASUREMENT_LEN]) -> Self {
        self.responses
            .insert(Characteristic::Measurement, payload.to_vec());
        self
    }

    /// Set raw bytes for any characteristic.
    #[must_use]
    pub fn response(mut self, characteristic: Characteristic, data: Vec<u8>) -> Self {
        self.responses.insert(characteristic, data);
        self
    }

    /// Build the mock transport.
    #[must_use]
    pub fn build(self) -> MockTransport {
        let state = MockState {
            responses: RwLock::new(self.responses),
            ..Default::default()
        };
        MockTransport {
            state: Arc::new(state),
        }
    }
}
