//! SDP810 differential pressure sensor adapter
//!
//! Sensirion SDP8xx, I2C address 0x25 (0x26 variant). The driver runs the
//! sensor in continuous measurement mode: one start command, then each
//! read fetches 9 bytes of `[dp, temp, scale]` CRC-protected words. The
//! 500 Pa part reports a scale factor of 60, giving the familiar
//! `raw / 60.0` Pa conversion.

use std::thread;
use std::time::Duration;

use embedded_hal::i2c::I2c;

use crate::domain::crc::check_word;
use crate::domain::{Measurement, SensorKind};
use crate::ports::sensor::{SensorError, SensorPort};

/// Continuous differential-pressure measurement, averaged until read.
const CMD_START_CONTINUOUS_DP: [u8; 2] = [0x36, 0x1E];
/// Stop continuous measurement.
const CMD_STOP_CONTINUOUS: [u8; 2] = [0x3F, 0xF9];

/// First result is available 8 ms after the start command.
const WARMUP_WAIT: Duration = Duration::from_millis(20);
/// The sensor needs 500 us after a stop before accepting commands.
const STOP_WAIT: Duration = Duration::from_millis(1);

/// SDP810 driver, generic over its I2C slot.
pub struct Sdp810<I> {
    i2c: I,
    address: u8,
    started: bool,
}

impl<I: I2c> Sdp810<I> {
    /// Known I2C addresses for SDP8xx parts.
    pub const ADDRESSES: &'static [u8] = &[0x25, 0x26];

    pub fn new(i2c: I, address: u8) -> Self {
        Self {
            i2c,
            address,
            started: false,
        }
    }

    fn start(&mut self) -> Result<(), SensorError> {
        self.i2c
            .write(self.address, &CMD_START_CONTINUOUS_DP)
            .map_err(SensorError::bus)?;
        thread::sleep(WARMUP_WAIT);
        self.started = true;
        Ok(())
    }

    /// Raw `(dp_raw, temp_raw, scale)` words from one continuous-mode read.
    fn read_raw(&mut self) -> Result<(i16, i16, i16), SensorError> {
        let mut buf = [0u8; 9];
        self.i2c
            .read(self.address, &mut buf)
            .map_err(SensorError::bus)?;

        let dp = check_word([buf[0], buf[1], buf[2]]).ok_or(SensorError::Crc)?;
        let temp = check_word([buf[3], buf[4], buf[5]]).ok_or(SensorError::Crc)?;
        let scale = check_word([buf[6], buf[7], buf[8]]).ok_or(SensorError::Crc)?;
        Ok((dp as i16, temp as i16, scale as i16))
    }
}

impl<I: I2c + Send> SensorPort for Sdp810<I> {
    fn kind(&self) -> SensorKind {
        SensorKind::DifferentialPressure
    }

    fn probe(&mut self) -> Result<(), SensorError> {
        // A stop command is safe in any state and only ACKed by an SDP8xx.
        self.i2c
            .write(self.address, &CMD_STOP_CONTINUOUS)
            .map_err(|_| SensorError::NotDetected)?;
        thread::sleep(STOP_WAIT);
        self.started = false;
        Ok(())
    }

    fn read(&mut self) -> Result<Measurement, SensorError> {
        if !self.started {
            self.start()?;
        }
        let (dp_raw, _temp_raw, scale) = self.read_raw()?;
        if scale <= 0 {
            return Err(SensorError::InvalidData);
        }
        Ok(Measurement::DifferentialPressure {
            pascal: f32::from(dp_raw) / f32::from(scale),
        })
    }
}
