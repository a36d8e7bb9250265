//! Domain layer - pure business logic independent of infrastructure
//!
//! This module contains the core domain entities of the sensor rig:
//! measurement values, sensor identities, and the Sensirion CRC-8
//! checksum shared by several of the supported sensors.

pub mod crc;
pub mod descriptor;
pub mod reading;

pub use descriptor::{BusLocation, SensorDescriptor, SensorStatus};
pub use reading::{unix_millis, Measurement, SensorKind, SensorSnapshot};
