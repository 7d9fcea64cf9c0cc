//! Retrying session channel.
//!
//! Every operation against the sensor runs as one whole session: connect,
//! perform the reads/writes, disconnect. A failure anywhere in the session,
//! or the session overrunning its timeout, costs one attempt. A session
//! that was opened is always closed, including when the operation times out. Attempts are
//! resubmitted immediately, at most `retries + 1` times in total, after
//! which the operation reports no data instead of an error.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use flora_core::{MockTransport, RetryingChannel};
//! use flora_types::{Characteristic, DeviceAddress};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mock = MockTransport::builder().name("Flower care").build();
//! mock.fail_connects(2);
//!
//! let address = DeviceAddress::new([0xC4, 0x7C, 0x8D, 0x6A, 0x3E, 0x11]);
//! let channel = RetryingChannel::new(mock.clone(), address, 3, Duration::from_secs(10));
//!
//! let name = channel.read(Characteristic::Name).await;
//! assert_eq!(name.as_deref(), Some(&b"Flower care"[..]));
//! assert_eq!(mock.connect_count(), 3);
//! # }
//! ```

use std::fmt;
use std::time::Duration;

use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use flora_types::{Characteristic, DeviceAddress};

use crate::error::{Error, Result};
use crate::transport::{Session, Transport};

/// What to do inside one session.
#[derive(Debug, Clone, Copy)]
enum Operation<'a> {
    Read(Characteristic),
    Write(Characteristic, &'a [u8]),
    WriteThenRead {
        arm: Characteristic,
        value: &'a [u8],
        read: Characteristic,
    },
}

impl Operation<'_> {
    async fn run<S: Session>(&self, session: &mut S) -> Result<Vec<u8>> {
        match *self {
            Operation::Read(characteristic) => session.read_characteristic(characteristic).await,
            Operation::Write(characteristic, value) => {
                session.write_characteristic(characteristic, value).await?;
                Ok(Vec::new())
            }
            Operation::WriteThenRead { arm, value, read } => {
                session.write_characteristic(arm, value).await?;
                session.read_characteristic(read).await
            }
        }
    }
}

impl fmt::Display for Operation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read(c) => write!(f, "read {}", c),
            Operation::Write(c, _) => write!(f, "write {}", c),
            Operation::WriteThenRead { arm, read, .. } => {
                write!(f, "write {} then read {}", arm, read)
            }
        }
    }
}

/// Bounded-retry access to one sensor through a [`Transport`].
#[derive(Debug)]
pub struct RetryingChannel<T> {
    transport: T,
    address: DeviceAddress,
    retries: u32,
    attempt_timeout: Duration,
}

impl<T: Transport> RetryingChannel<T> {
    /// Create a channel making at most `retries + 1` attempts per operation,
    /// each limited to `attempt_timeout`.
    pub fn new(transport: T, address: DeviceAddress, retries: u32, attempt_timeout: Duration) -> Self {
        Self {
            transport,
            address,
            retries,
            attempt_timeout,
        }
    }

    /// The sensor this channel talks to.
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Read a characteristic. `None` once every attempt has failed.
    pub async fn read(&self, characteristic: Characteristic) -> Option<Vec<u8>> {
        self.perform(Operation::Read(characteristic)).await
    }

    /// Write a characteristic. `false` once every attempt has failed.
    pub async fn write(&self, characteristic: Characteristic, value: &[u8]) -> bool {
        self.perform(Operation::Write(characteristic, value))
            .await
            .is_some()
    }

    /// Write `value` to `arm` and read `read` within the same session.
    ///
    /// Used for registers that must be armed before they report fresh data.
    pub async fn write_then_read(
        &self,
        arm: Characteristic,
        value: &[u8],
        read: Characteristic,
    ) -> Option<Vec<u8>> {
        self.perform(Operation::WriteThenRead { arm, value, read })
            .await
    }

    async fn perform(&self, operation: Operation<'_>) -> Option<Vec<u8>> {
        let attempts = u64::from(self.retries) + 1;

        for attempt in 1..=attempts {
            let error = match self.session(&operation).await {
                Ok(data) => {
                    if attempt > 1 {
                        debug!(
                            "{} on {} succeeded after {} retries",
                            operation,
                            self.address,
                            attempt - 1
                        );
                    }
                    return Some(data);
                }
                Err(e) => e,
            };

            warn!(
                "{} on {} failed (attempt {}/{}): {}",
                operation, self.address, attempt, attempts, error
            );
        }

        warn!(
            "{} on {} gave up after {} attempts",
            operation, self.address, attempts
        );
        None
    }

    /// One connect → operate → disconnect cycle within `attempt_timeout`.
    async fn session(&self, operation: &Operation<'_>) -> Result<Vec<u8>> {
        let started = Instant::now();
        let mut session = timeout(self.attempt_timeout, self.transport.connect(&self.address))
            .await
            .map_err(|_| {
                Error::timeout(format!("connect for {}", operation), self.attempt_timeout)
            })??;

        let remaining = self.attempt_timeout.saturating_sub(started.elapsed());
        let result = match timeout(remaining, operation.run(&mut session)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(operation.to_string(), self.attempt_timeout)),
        };

        // The session is closed whether or not the operation succeeded.
        match timeout(self.attempt_timeout, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Closing session to {} failed: {}", self.address, e),
            Err(_) => debug!("Closing session to {} timed out", self.address),
        }
        result
    }
}
