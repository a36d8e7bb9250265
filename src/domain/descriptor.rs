//! Sensor descriptors - where a detected sensor sits and how it is doing
//!
//! A descriptor is produced by the hardware scan and carried on every
//! snapshot so clients can tell sensors of the same kind apart.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::reading::SensorKind;

/// Where a sensor is physically attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "transport")]
pub enum BusLocation {
    /// Directly on an I2C bus (no multiplexer between)
    I2cDirect { bus: u8, address: u8 },
    /// Behind a TCA9548A channel
    I2cMuxed {
        bus: u8,
        mux_address: u8,
        channel: u8,
        address: u8,
    },
    /// On a serial port (SPS30)
    Uart,
    /// On an SPI bus (LIS3DH)
    Spi,
}

impl fmt::Display for BusLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusLocation::I2cDirect { bus, address } => {
                write!(f, "i2c{bus}:0x{address:02x}")
            }
            BusLocation::I2cMuxed {
                bus,
                mux_address,
                channel,
                address,
            } => write!(f, "i2c{bus}:mux{mux_address:02x}:ch{channel}:0x{address:02x}"),
            BusLocation::Uart => f.write_str("uart"),
            BusLocation::Spi => f.write_str("spi"),
        }
    }
}

/// Health of a sensor as of its last interaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    /// Responding normally
    Ok,
    /// Responding, but readings needed retries
    Degraded,
    /// Last read failed
    Error,
}

/// Identity of one detected sensor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    /// Stable label, unique within one scan (e.g. `i2c1:mux70:ch3:0x44`)
    pub label: String,
    /// What the sensor measures
    pub kind: SensorKind,
    /// Where it is attached
    pub location: BusLocation,
    /// Health as of the last read
    pub status: SensorStatus,
}

impl SensorDescriptor {
    /// Build a descriptor; the label is derived from the location.
    pub fn new(kind: SensorKind, location: BusLocation) -> Self {
        Self {
            label: location.to_string(),
            kind,
            location,
            status: SensorStatus::Ok,
        }
    }

    /// Copy of this descriptor with a different status.
    pub fn with_status(&self, status: SensorStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn muxed_label_format() {
        let loc = BusLocation::I2cMuxed {
            bus: 1,
            mux_address: 0x70,
            channel: 3,
            address: 0x44,
        };
        assert_eq!(loc.to_string(), "i2c1:mux70:ch3:0x44");
    }

    #[test]
    fn direct_label_format() {
        let loc = BusLocation::I2cDirect { bus: 0, address: 0x23 };
        assert_eq!(loc.to_string(), "i2c0:0x23");
    }

    #[test]
    fn descriptor_label_matches_location() {
        let d = SensorDescriptor::new(
            SensorKind::TempHumidity,
            BusLocation::I2cDirect { bus: 0, address: 0x44 },
        );
        assert_eq!(d.label, "i2c0:0x44");
        assert_eq!(d.status, SensorStatus::Ok);
    }
}
