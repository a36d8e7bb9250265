//! BH1750 ambient light sensor adapter
//!
//! ROHM BH1750FVI, I2C address 0x23 (0x5C with ADDR high). One-shot
//! high-resolution mode: opcode write, up to 180 ms conversion, 2-byte
//! big-endian read. No checksum on this part; `lux = raw / 1.2`.

use std::thread;
use std::time::Duration;

use embedded_hal::i2c::I2c;

use crate::domain::{Measurement, SensorKind};
use crate::ports::sensor::{SensorError, SensorPort};

const OP_POWER_ON: u8 = 0x01;
/// One-shot high resolution mode, 1 lx resolution.
const OP_ONE_TIME_HIGH_RES: u8 = 0x20;

/// Datasheet worst-case conversion time for high-res mode.
const CONVERSION_WAIT: Duration = Duration::from_millis(180);

/// BH1750 driver, generic over its I2C slot.
pub struct Bh1750<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> Bh1750<I> {
    /// Known I2C addresses (ADDR pin low / high).
    pub const ADDRESSES: &'static [u8] = &[0x23, 0x5C];

    pub fn new(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }
}

/// Raw counts to lux per the datasheet's 1.2 counts/lx figure.
fn convert_lux(raw: u16) -> f32 {
    f32::from(raw) / 1.2
}

impl<I: I2c + Send> SensorPort for Bh1750<I> {
    fn kind(&self) -> SensorKind {
        SensorKind::Illuminance
    }

    fn probe(&mut self) -> Result<(), SensorError> {
        // Power-on is a no-op if already awake and only ACKed by the part.
        self.i2c
            .write(self.address, &[OP_POWER_ON])
            .map_err(|_| SensorError::NotDetected)
    }

    fn read(&mut self) -> Result<Measurement, SensorError> {
        self.i2c
            .write(self.address, &[OP_ONE_TIME_HIGH_RES])
            .map_err(SensorError::bus)?;
        thread::sleep(CONVERSION_WAIT);

        let mut buf = [0u8; 2];
        self.i2c
            .read(self.address, &mut buf)
            .map_err(SensorError::bus)?;

        Ok(Measurement::Illuminance {
            lux: convert_lux(u16::from_be_bytes(buf)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    #[test]
    fn read_converts_counts() {
        let mock = I2cMock::new(&[
            Transaction::write(0x23, vec![OP_ONE_TIME_HIGH_RES]),
            Transaction::read(0x23, vec![0x00, 0x78]), // 120 counts -> 100 lx
        ]);
        let mut handle = mock.clone();
        let mut sensor = Bh1750::new(mock, 0x23);
        match sensor.read().unwrap() {
            Measurement::Illuminance { lux } => assert!((lux - 100.0).abs() < 1e-3),
            other => panic!("wrong variant: {other:?}"),
        }
        handle.done();
    }

    #[test]
    fn probe_powers_on() {
        let mock = I2cMock::new(&[Transaction::write(0x5C, vec![OP_POWER_ON])]);
        let mut handle = mock.clone();
        let mut sensor = Bh1750::new(mock, 0x5C);
        sensor.probe().unwrap();
        handle.done();
    }
}
