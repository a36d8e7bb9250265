//! Sensor port - abstraction for probing and reading one sensor
//!
//! This trait allows the scanner and the serving layers to handle sensors
//! without knowing the specific transport (I2C behind a mux, SPI, UART).

use std::fmt::Debug;
use std::thread;
use std::time::Duration;

use crate::domain::{Measurement, SensorKind};

/// Error type for sensor operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SensorError {
    /// Transport-level failure (I2C NAK, SPI fault, serial I/O)
    #[error("bus error: {0}")]
    Bus(String),
    /// Response failed its checksum
    #[error("CRC mismatch")]
    Crc,
    /// No device answered the probe
    #[error("sensor not detected")]
    NotDetected,
    /// Device answered but the payload is out of spec
    #[error("invalid data from sensor")]
    InvalidData,
    /// The device reported an error state of its own
    #[error("device error code 0x{0:02x}")]
    Device(u8),
    /// No complete response within the allotted time
    #[error("timed out waiting for sensor")]
    Timeout,
}

impl SensorError {
    /// Wrap a transport error, keeping its debug rendering.
    pub fn bus(err: impl Debug) -> Self {
        SensorError::Bus(format!("{err:?}"))
    }

    /// Whether retrying the operation could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SensorError::Bus(_) | SensorError::Crc | SensorError::Timeout
        )
    }
}

/// Port for a single sensor.
///
/// Implementations are blocking; callers serialize access per bus, so a
/// slow sensor delays only its own read.
pub trait SensorPort: Send {
    /// What this sensor measures.
    fn kind(&self) -> SensorKind;

    /// Cheap detection check: issue the device's test command and verify
    /// the response. Used during scanning to classify addresses.
    fn probe(&mut self) -> Result<(), SensorError>;

    /// Take one measurement.
    fn read(&mut self) -> Result<Measurement, SensorError>;
}

/// Retry policy for transient transport failures.
///
/// The rig applies one policy everywhere instead of the per-file tuning
/// the hardware scripts accumulated.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Attempts including the first (minimum 1)
    pub attempts: u32,
    /// Delay before the first retry; doubles on each further retry
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(20),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            initial_backoff: Duration::from_millis(0),
        }
    }

    /// Run `op`, retrying transient failures with doubling backoff.
    ///
    /// Returns `Ok((value, retries_used))` so callers can mark a sensor
    /// degraded when it needed retries to answer.
    pub fn run<T>(
        &self,
        mut op: impl FnMut() -> Result<T, SensorError>,
    ) -> Result<(T, u32), SensorError> {
        let mut backoff = self.initial_backoff;
        let mut used = 0;
        loop {
            match op() {
                Ok(value) => return Ok((value, used)),
                Err(e) if e.is_transient() && used + 1 < self.attempts.max(1) => {
                    used += 1;
                    thread::sleep(backoff);
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
