//! SHT40 temperature/humidity sensor adapter
//!
//! Sensirion SHT4x family, I2C address 0x44 (0x45/0x46 variants exist).
//! A measurement is a command write, a fixed wait while the sensor is
//! unresponsive, then a 6-byte read of two CRC-protected words.

use std::thread;
use std::time::Duration;

use embedded_hal::i2c::I2c;

use crate::domain::crc::check_word;
use crate::domain::{Measurement, SensorKind};
use crate::ports::sensor::{SensorError, SensorPort};

/// Measure T and RH with high repeatability, ~8.3 ms duration.
const CMD_MEASURE_HIGH_PRECISION: u8 = 0xFD;
/// Read the 32-bit factory serial number.
const CMD_READ_SERIAL: u8 = 0x89;

/// Measurement duration plus margin; the sensor NAKs while busy.
const MEASURE_WAIT: Duration = Duration::from_millis(10);
const SERIAL_WAIT: Duration = Duration::from_millis(1);

/// SHT40 driver, generic over its I2C slot.
pub struct Sht40<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> Sht40<I> {
    /// Known I2C addresses for SHT4x parts.
    pub const ADDRESSES: &'static [u8] = &[0x44, 0x45];

    pub fn new(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Factory serial number, CRC-verified. Doubles as the probe command.
    pub fn serial_number(&mut self) -> Result<u32, SensorError> {
        self.i2c
            .write(self.address, &[CMD_READ_SERIAL])
            .map_err(SensorError::bus)?;
        thread::sleep(SERIAL_WAIT);

        let mut buf = [0u8; 6];
        self.i2c
            .read(self.address, &mut buf)
            .map_err(SensorError::bus)?;

        let high = check_word([buf[0], buf[1], buf[2]]).ok_or(SensorError::Crc)?;
        let low = check_word([buf[3], buf[4], buf[5]]).ok_or(SensorError::Crc)?;
        Ok(u32::from(high) << 16 | u32::from(low))
    }
}

/// SHT4x datasheet section 4.6: raw ticks to degrees Celsius.
fn convert_temperature(raw: u16) -> f32 {
    -45.0 + 175.0 * f32::from(raw) / 65535.0
}

/// Raw ticks to relative humidity, clamped to the physical range.
fn convert_humidity(raw: u16) -> f32 {
    (-6.0 + 125.0 * f32::from(raw) / 65535.0).clamp(0.0, 100.0)
}

impl<I: I2c + Send> SensorPort for Sht40<I> {
    fn kind(&self) -> SensorKind {
        SensorKind::TempHumidity
    }

    fn probe(&mut self) -> Result<(), SensorError> {
        self.serial_number().map(|_| ()).map_err(|e| match e {
            // an address NAK on the probe means nothing is there
            SensorError::Bus(_) => SensorError::NotDetected,
            other => other,
        })
    }

    fn read(&mut self) -> Result<Measurement, SensorError> {
        self.i2c
            .write(self.address, &[CMD_MEASURE_HIGH_PRECISION])
            .map_err(SensorError::bus)?;
        thread::sleep(MEASURE_WAIT);

        let mut buf = [0u8; 6];
        self.i2c
            .read(self.address, &mut buf)
            .map_err(SensorError::bus)?;

        let raw_t = check_word([buf[0], buf[1], buf[2]]).ok_or(SensorError::Crc)?;
        let raw_rh = check_word([buf[3], buf[4], buf[5]]).ok_or(SensorError::Crc)?;

        Ok(Measurement::TempHumidity {
            temperature_c: convert_temperature(raw_t),
            humidity_rh: convert_humidity(raw_rh),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::crc::crc8;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    fn word(w: u16) -> [u8; 3] {
        let be = w.to_be_bytes();
        [be[0], be[1], crc8(&be)]
    }

    #[test]
    fn read_decodes_and_converts() {
        // mid-scale ticks: 0x8000 -> 42.493 degC / 56.499 %RH
        let t = word(0x8000);
        let rh = word(0x8000);
        let mock = I2cMock::new(&[
            Transaction::write(0x44, vec![CMD_MEASURE_HIGH_PRECISION]),
            Transaction::read(0x44, vec![t[0], t[1], t[2], rh[0], rh[1], rh[2]]),
        ]);
        let mut handle = mock.clone();
        let mut sensor = Sht40::new(mock, 0x44);

        match sensor.read().unwrap() {
            Measurement::TempHumidity {
                temperature_c,
                humidity_rh,
            } => {
                assert!((temperature_c - 42.49).abs() < 0.05);
                assert!((humidity_rh - 56.5).abs() < 0.05);
            }
            other => panic!("wrong variant: {other:?}"),
        }
        handle.done();
    }

    #[test]
    fn read_rejects_bad_crc() {
        let t = word(0x8000);
        let mock = I2cMock::new(&[
            Transaction::write(0x44, vec![CMD_MEASURE_HIGH_PRECISION]),
            Transaction::read(0x44, vec![t[0], t[1], t[2] ^ 0xFF, 0x00, 0x00, 0x81]),
        ]);
        let mut handle = mock.clone();
        let mut sensor = Sht40::new(mock, 0x44);
        assert_eq!(sensor.read().unwrap_err(), SensorError::Crc);
        handle.done();
    }

    #[test]
    fn humidity_is_clamped() {
        assert_eq!(convert_humidity(0xFFFF), 100.0);
        assert_eq!(convert_humidity(0x0000), 0.0);
    }

    #[test]
    fn serial_number_assembles_words() {
        let hi = word(0x1234);
        let lo = word(0x5678);
        let mock = I2cMock::new(&[
            Transaction::write(0x44, vec![CMD_READ_SERIAL]),
            Transaction::read(0x44, vec![hi[0], hi[1], hi[2], lo[0], lo[1], lo[2]]),
        ]);
        let mut handle = mock.clone();
        let mut sensor = Sht40::new(mock, 0x44);
        assert_eq!(sensor.serial_number().unwrap(), 0x1234_5678);
        handle.done();
    }
}
