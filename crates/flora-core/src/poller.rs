//! Cached, validated access to one sensor.
//!
//! A [`SensorPoller`] owns the cache for a single sensor. Measurements are
//! served from the cache while fresh; a stale or missing cache is refilled
//! under the poller's lock so concurrent callers share one device session.
//!
//! # Cache states
//!
//! ```text
//! Empty ──fill ok──▶ Fresh ──timeout──▶ Stale ──fill ok──▶ Fresh
//!   │                                     │
//!   └──fill failed──▶ BackedOff ◀──fill failed
//! ```
//!
//! A failed fill keeps the cache empty and schedules the next mandatory
//! refresh after [`PollerConfig::failure_backoff`] rather than a full
//! [`PollerConfig::cache_timeout`], so an unreachable sensor is neither
//! hammered on every call nor ignored for the whole cache period.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use flora_types::{
    ARM_MEASUREMENT, Characteristic, DeviceAddress, FirmwareInfo, MEASUREMENT_LEN, Parameter,
    ParsedReading, decode_char_codes,
};

use crate::channel::RetryingChannel;
use crate::config::PollerConfig;
use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::validation::PayloadValidator;

/// Observable state of the measurement cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheStatus {
    /// No fill has been attempted yet.
    Empty,
    /// A valid payload is cached and within the cache timeout.
    Fresh,
    /// The last fill failed; the next refresh is not due yet.
    BackedOff,
    /// A refresh is due on the next access.
    Stale,
}

#[derive(Debug, Default)]
struct CacheEntry {
    payload: Option<[u8; MEASUREMENT_LEN]>,
    last_read: Option<Instant>,
    /// `None` after a read means the refresh lies beyond the clock's range.
    next_refresh: Option<Instant>,
}

impl CacheEntry {
    fn needs_refresh(&self, now: Instant) -> bool {
        match self.last_read {
            None => true,
            Some(_) => self.next_refresh.is_some_and(|due| now >= due),
        }
    }

    fn record_success(&mut self, now: Instant, payload: [u8; MEASUREMENT_LEN], ttl: Duration) {
        self.payload = Some(payload);
        self.last_read = Some(now);
        self.next_refresh = now.checked_add(ttl);
    }

    fn record_failure(&mut self, now: Instant, backoff: Duration) {
        self.payload = None;
        self.last_read = Some(now);
        self.next_refresh = now.checked_add(backoff);
    }

    fn status(&self, now: Instant) -> CacheStatus {
        if self.last_read.is_none() {
            CacheStatus::Empty
        } else if self.needs_refresh(now) {
            CacheStatus::Stale
        } else if self.payload.is_some() {
            CacheStatus::Fresh
        } else {
            CacheStatus::BackedOff
        }
    }
}

#[derive(Debug, Default)]
struct FirmwareState {
    version: Option<String>,
    battery: u8,
    last_checked: Option<Instant>,
}

#[derive(Debug, Default)]
struct PollerState {
    cache: CacheEntry,
    firmware: FirmwareState,
}

/// Polls one Mi Flora sensor through a [`Transport`].
///
/// The poller is cheap to share behind an `Arc`; all methods take `&self`.
///
/// # Example
///
/// ```no_run
/// use flora_core::{BleTransport, SensorPoller};
/// use flora_types::Parameter;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let address = "C4:7C:8D:6A:3E:11".parse()?;
///     let poller = SensorPoller::new(address, BleTransport::new());
///
///     let moisture = poller.parameter_value(Parameter::Moisture, true).await?;
///     let battery = poller.battery_level().await;
///     println!("moisture {}%, battery {}%", moisture, battery);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct SensorPoller<T> {
    channel: RetryingChannel<T>,
    validator: PayloadValidator,
    config: PollerConfig,
    /// Guards every firmware and measurement session.
    state: Mutex<PollerState>,
}

impl<T: Transport> SensorPoller<T> {
    /// Create a poller with the default configuration
    /// (10 minute cache, 3 retries).
    pub fn new(address: DeviceAddress, transport: T) -> Self {
        Self::with_config(address, transport, PollerConfig::default())
    }

    /// Create a poller from a configuration that has passed
    /// [`PollerConfig::validate`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is rejected.
    pub fn try_with_config(
        address: DeviceAddress,
        transport: T,
        config: PollerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_config(address, transport, config))
    }

    /// Create a poller with a custom configuration.
    ///
    /// The configuration is used as given; see [`try_with_config`](Self::try_with_config)
    /// for a validating constructor.
    pub fn with_config(address: DeviceAddress, transport: T, config: PollerConfig) -> Self {
        let channel =
            RetryingChannel::new(transport, address, config.retries, config.attempt_timeout);
        Self {
            channel,
            validator: PayloadValidator::default(),
            config,
            state: Mutex::new(PollerState::default()),
        }
    }

    /// Replace the payload validator.
    #[must_use]
    pub fn validator(mut self, validator: PayloadValidator) -> Self {
        self.validator = validator;
        self
    }

    /// The sensor this poller reads.
    pub fn address(&self) -> &DeviceAddress {
        self.channel.address()
    }

    /// The poller configuration.
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Read the advertised name of the sensor. Never cached.
    ///
    /// Returns `None` if the sensor could not be read.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address()))]
    pub async fn name(&self) -> Option<String> {
        self.channel
            .read(Characteristic::Name)
            .await
            .map(|bytes| decode_char_codes(&bytes))
    }

    /// The firmware version, read from the sensor at most once per
    /// [`PollerConfig::firmware_refresh`] while a version is known.
    ///
    /// Returns `None` if the last firmware read failed.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address()))]
    pub async fn firmware_version(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        self.refresh_firmware(&mut state.firmware).await;
        state.firmware.version.clone()
    }

    /// Battery level in percent.
    ///
    /// Comes from the firmware record and shares its refresh schedule;
    /// `0` if the last firmware read failed.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address()))]
    pub async fn battery_level(&self) -> u8 {
        let mut state = self.state.lock().await;
        self.refresh_firmware(&mut state.firmware).await;
        state.firmware.battery
    }

    /// Read one parameter.
    ///
    /// [`Parameter::Battery`] is answered from the firmware record. Other
    /// parameters come from the measurement cache, which is refreshed first
    /// when `read_cached` is `false` or the cache is due.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoData`] if no valid measurement is available.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address()))]
    pub async fn parameter_value(&self, parameter: Parameter, read_cached: bool) -> Result<f64> {
        if parameter == Parameter::Battery {
            return Ok(f64::from(self.battery_level().await));
        }

        let reading = self.read_all(read_cached).await?;
        reading.value(parameter).ok_or(Error::NoData {
            address: *self.address(),
        })
    }

    /// Read all measurement parameters from one cached payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoData`] if no valid measurement is available.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address()))]
    pub async fn read_all(&self, read_cached: bool) -> Result<ParsedReading> {
        let payload = {
            let mut state = self.state.lock().await;
            if !read_cached || state.cache.needs_refresh(Instant::now()) {
                self.fill(&mut state).await;
            } else {
                debug!("Using cached measurement");
            }
            state.cache.payload
        };

        match payload {
            Some(payload) => Ok(ParsedReading::decode(&payload)),
            None => {
                // One more attempt so the next caller may find data.
                let mut state = self.state.lock().await;
                self.fill(&mut state).await;
                Err(Error::NoData {
                    address: *self.address(),
                })
            }
        }
    }

    /// Current state of the measurement cache.
    pub async fn cache_status(&self) -> CacheStatus {
        self.state.lock().await.cache.status(Instant::now())
    }

    /// Drop the cached measurement so the next access reads the sensor.
    pub async fn clear_cache(&self) {
        self.state.lock().await.cache = CacheEntry::default();
    }

    /// Refresh the firmware record unless a known version is still fresh.
    async fn refresh_firmware(&self, firmware: &mut FirmwareState) {
        let now = Instant::now();
        let fresh = firmware.version.is_some()
            && firmware
                .last_checked
                .is_some_and(|checked| now.duration_since(checked) < self.config.firmware_refresh);
        if fresh {
            return;
        }

        firmware.last_checked = Some(now);
        let info = self
            .channel
            .read(Characteristic::Firmware)
            .await
            .map(|bytes| FirmwareInfo::from_bytes(&bytes));

        match info {
            Some(Ok(info)) => {
                debug!(
                    "Firmware {} with battery at {}%",
                    info.version, info.battery
                );
                firmware.battery = info.battery;
                firmware.version = Some(info.version);
            }
            Some(Err(e)) => {
                warn!("Unreadable firmware record from {}: {}", self.address(), e);
                firmware.battery = 0;
                firmware.version = None;
            }
            None => {
                firmware.battery = 0;
                firmware.version = None;
            }
        }
    }

    /// Refresh the measurement cache. Must be called with the state lock held.
    async fn fill(&self, state: &mut PollerState) {
        self.refresh_firmware(&mut state.firmware).await;

        // A sensor that cannot answer the firmware query will not answer
        // the measurement either. An empty version counts as no answer.
        let Some(firmware) = state
            .firmware
            .version
            .clone()
            .filter(|version| !version.is_empty())
        else {
            warn!(
                "{} unreachable, next attempt in {:?}",
                self.address(),
                self.config.failure_backoff
            );
            state
                .cache
                .record_failure(Instant::now(), self.config.failure_backoff);
            return;
        };

        let raw = self
            .channel
            .write_then_read(
                Characteristic::ModeChange,
                &ARM_MEASUREMENT,
                Characteristic::Measurement,
            )
            .await;
        let now = Instant::now();

        let Some(raw) = raw else {
            warn!(
                "No measurement from {}, next attempt in {:?}",
                self.address(),
                self.config.failure_backoff
            );
            state.cache.record_failure(now, self.config.failure_backoff);
            return;
        };

        match self.validator.check(&raw, &firmware) {
            Ok(()) => match <[u8; MEASUREMENT_LEN]>::try_from(raw.as_slice()) {
                Ok(payload) => {
                    info!("Measurement cached for {}", self.address());
                    state
                        .cache
                        .record_success(now, payload, self.config.cache_timeout);
                }
                Err(_) => state.cache.record_failure(now, self.config.failure_backoff),
            },
            Err(rejection) => {
                warn!(
                    "Discarding measurement from {}: {}",
                    self.address(),
                    rejection
                );
                state.cache.record_failure(now, self.config.failure_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    const FRAME: [u8; MEASUREMENT_LEN] = [
        0xC8, 0x00, 0x00, 0x2C, 0x01, 0x00, 0x00, 0x2D, 0x96, 0x00, 0x02, 0x3C, 0x00, 0xFB, 0x34,
        0x9B,
    ];

    fn address() -> DeviceAddress {
        DeviceAddress::new([0xC4, 0x7C, 0x8D, 0x6A, 0x3E, 0x11])
    }

    fn healthy() -> MockTransport {
        MockTransport::builder()
            .name("Flower care")
            .firmware(87, "3.2.1")
            .measurement(FRAME)
            .build()
    }

    #[test]
    fn test_cache_entry_transitions() {
        let t0 = Instant::now();
        let mut entry = CacheEntry::default();
        assert_eq!(entry.status(t0), CacheStatus::Empty);
        assert!(entry.needs_refresh(t0));

        entry.record_success(t0, FRAME, Duration::from_secs(600));
        assert_eq!(entry.status(t0 + Duration::from_secs(599)), CacheStatus::Fresh);
        assert_eq!(entry.status(t0 + Duration::from_secs(600)), CacheStatus::Stale);

        entry.record_failure(t0, Duration::from_secs(300));
        assert_eq!(entry.payload, None);
        assert_eq!(entry.status(t0), CacheStatus::BackedOff);
        assert_eq!(
            entry.status(t0 + Duration::from_secs(299)),
            CacheStatus::BackedOff
        );
        assert_eq!(entry.status(t0 + Duration::from_secs(300)), CacheStatus::Stale);
    }

    #[test]
    fn test_unreachable_refresh_is_never_due() {
        let t0 = Instant::now();
        let mut entry = CacheEntry::default();

        entry.record_success(t0, FRAME, Duration::from_secs(u64::MAX));
        assert_eq!(entry.next_refresh, None);
        assert!(!entry.needs_refresh(t0 + Duration::from_secs(10 * 365 * 86_400)));
        assert_eq!(entry.status(t0), CacheStatus::Fresh);

        entry.record_failure(t0, Duration::MAX);
        assert!(!entry.needs_refresh(t0));
        assert_eq!(entry.status(t0), CacheStatus::BackedOff);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parameter_values() {
        let poller = SensorPoller::new(address(), healthy());

        assert_eq!(
            poller
                .parameter_value(Parameter::Temperature, true)
                .await
                .unwrap(),
            20.0
        );
        assert_eq!(
            poller.parameter_value(Parameter::Light, true).await.unwrap(),
            300.0
        );
        assert_eq!(
            poller
                .parameter_value(Parameter::Moisture, true)
                .await
                .unwrap(),
            45.0
        );
        assert_eq!(
            poller
                .parameter_value(Parameter::Conductivity, true)
                .await
                .unwrap(),
            150.0
        );
        assert_eq!(
            poller
                .parameter_value(Parameter::Battery, true)
                .await
                .unwrap(),
            87.0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_name_is_uncached() {
        let mock = healthy();
        let poller = SensorPoller::new(address(), mock.clone());

        assert_eq!(poller.name().await.as_deref(), Some("Flower care"));
        assert_eq!(poller.name().await.as_deref(), Some("Flower care"));
        assert_eq!(mock.name_reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_name_unavailable() {
        let mock = healthy();
        mock.set_always_fail(true);
        let poller = SensorPoller::with_config(address(), mock, PollerConfig::default().retries(0));
        assert_eq!(poller.name().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_firmware_cached_for_a_day() {
        let mock = healthy();
        let poller = SensorPoller::new(address(), mock.clone());

        assert_eq!(poller.firmware_version().await.as_deref(), Some("3.2.1"));
        assert_eq!(poller.battery_level().await, 87);
        assert_eq!(mock.firmware_reads(), 1);

        tokio::time::advance(Duration::from_secs(24 * 3600 - 1)).await;
        poller.battery_level().await;
        assert_eq!(mock.firmware_reads(), 1);

        mock.set_firmware(55, "3.2.1").await;
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(poller.battery_level().await, 55);
        assert_eq!(mock.firmware_reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_firmware_failure_resets_battery() {
        let mock = healthy();
        let poller = SensorPoller::with_config(address(), mock.clone(), PollerConfig::default().retries(1));
        assert_eq!(poller.battery_level().await, 87);

        tokio::time::advance(Duration::from_secs(24 * 3600)).await;
        mock.set_always_fail(true);
        assert_eq!(poller.firmware_version().await, None);
        assert_eq!(poller.battery_level().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cache_forces_read() {
        let mock = healthy();
        let poller = SensorPoller::new(address(), mock.clone());

        poller.read_all(true).await.unwrap();
        assert_eq!(poller.cache_status().await, CacheStatus::Fresh);

        poller.clear_cache().await;
        assert_eq!(poller.cache_status().await, CacheStatus::Empty);

        poller.read_all(true).await.unwrap();
        assert_eq!(mock.measurement_reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unarmed_read_is_never_cached() {
        // Arming is mandatory: the measurement must come from an armed session
        let mock = healthy();
        let poller = SensorPoller::new(address(), mock.clone());
        poller.read_all(false).await.unwrap();

        let writes = mock.writes().await;
        assert_eq!(
            writes,
            vec![(Characteristic::ModeChange, ARM_MEASUREMENT.to_vec())]
        );
    }
}
