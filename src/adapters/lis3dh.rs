//! LIS3DH 3-axis accelerometer adapter (SPI)
//!
//! ST LIS3DH on SPI mode 3. Register reads set bit 7; multi-byte access
//! sets bit 6 for address auto-increment. The driver runs the part in
//! high-resolution mode at +/-2 g, 100 Hz.

use embedded_hal::spi::{Operation, SpiDevice};

use crate::domain::{Measurement, SensorKind};
use crate::ports::sensor::{SensorError, SensorPort};

const REG_WHO_AM_I: u8 = 0x0F;
const REG_CTRL1: u8 = 0x20;
const REG_CTRL4: u8 = 0x23;
const REG_OUT_X_L: u8 = 0x28;

/// WHO_AM_I response for the LIS3DH.
const DEVICE_ID: u8 = 0x33;
/// 100 Hz, normal power, X/Y/Z enabled.
const CTRL1_100HZ_XYZ: u8 = 0x57;
/// High-resolution mode, +/-2 g full scale.
const CTRL4_HR_2G: u8 = 0x08;

const SPI_READ: u8 = 0x80;
const SPI_AUTO_INC: u8 = 0x40;

/// Sensitivity in HR mode at +/-2 g: 1 mg per digit on 12 bits.
const MG_PER_DIGIT: f32 = 0.001;

/// LIS3DH driver, generic over its SPI device.
pub struct Lis3dh<S> {
    spi: S,
    initialized: bool,
}

impl<S: SpiDevice> Lis3dh<S> {
    pub fn new(spi: S) -> Self {
        Self {
            spi,
            initialized: false,
        }
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, SensorError> {
        let mut buf = [0u8; 2];
        self.spi
            .transfer(&mut buf, &[reg | SPI_READ, 0x00])
            .map_err(SensorError::bus)?;
        Ok(buf[1])
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        self.spi
            .transaction(&mut [Operation::Write(&[reg, value])])
            .map_err(SensorError::bus)
    }

    fn init(&mut self) -> Result<(), SensorError> {
        self.write_register(REG_CTRL1, CTRL1_100HZ_XYZ)?;
        self.write_register(REG_CTRL4, CTRL4_HR_2G)?;
        self.initialized = true;
        Ok(())
    }
}

/// Two's-complement 12-bit sample (left-justified in 16 bits) to g.
fn convert_sample(low: u8, high: u8) -> f32 {
    let raw = i16::from_le_bytes([low, high]) >> 4;
    f32::from(raw) * MG_PER_DIGIT
}

impl<S: SpiDevice + Send> SensorPort for Lis3dh<S> {
    fn kind(&self) -> SensorKind {
        SensorKind::Acceleration
    }

    fn probe(&mut self) -> Result<(), SensorError> {
        let id = self.read_register(REG_WHO_AM_I)?;
        if id != DEVICE_ID {
            return Err(SensorError::NotDetected);
        }
        self.init()
    }

    fn read(&mut self) -> Result<Measurement, SensorError> {
        if !self.initialized {
            self.probe()?;
        }
        let mut buf = [0u8; 7];
        let cmd = [REG_OUT_X_L | SPI_READ | SPI_AUTO_INC, 0, 0, 0, 0, 0, 0];
        self.spi
            .transfer(&mut buf, &cmd)
            .map_err(SensorError::bus)?;

        Ok(Measurement::Acceleration {
            x_g: convert_sample(buf[1], buf[2]),
            y_g: convert_sample(buf[3], buf[4]),
            z_g: convert_sample(buf[5], buf[6]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_g_converts_to_unity() {
        // +1 g in HR mode: 1000 digits, left-justified: 1000 << 4 = 0x3E80
        let raw = (1000i16 << 4).to_le_bytes();
        let g = convert_sample(raw[0], raw[1]);
        assert!((g - 1.0).abs() < 1e-6);
    }

    #[test]
    fn negative_samples_sign_extend() {
        let raw = ((-512i16) << 4).to_le_bytes();
        let g = convert_sample(raw[0], raw[1]);
        assert!((g + 0.512).abs() < 1e-6);
    }

    #[test]
    fn zero_is_zero() {
        assert_eq!(convert_sample(0, 0), 0.0);
    }
}
