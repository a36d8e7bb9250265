//! Sensor measurement domain entities
//!
//! This module defines what the rig measures. It has no knowledge of how
//! values are transported to clients or which bus a sensor hangs off.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::domain::descriptor::SensorDescriptor;

/// The category of a sensor, used in URLs and JSON payloads.
///
/// Serialized names are stable API surface: `temp_humidity`,
/// `differential_pressure`, `illuminance`, `particulates`, `acceleration`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Temperature and relative humidity (SHT40)
    TempHumidity,
    /// Differential pressure (SDP810)
    DifferentialPressure,
    /// Ambient light (BH1750)
    Illuminance,
    /// Particulate matter mass concentrations (SPS30)
    Particulates,
    /// 3-axis acceleration (LIS3DH)
    Acceleration,
}

impl SensorKind {
    /// All kinds the rig knows how to detect.
    pub const ALL: [SensorKind; 5] = [
        SensorKind::TempHumidity,
        SensorKind::DifferentialPressure,
        SensorKind::Illuminance,
        SensorKind::Particulates,
        SensorKind::Acceleration,
    ];

    /// Stable snake_case name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::TempHumidity => "temp_humidity",
            SensorKind::DifferentialPressure => "differential_pressure",
            SensorKind::Illuminance => "illuminance",
            SensorKind::Particulates => "particulates",
            SensorKind::Acceleration => "acceleration",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Error returned when parsing an unrecognized sensor kind name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown sensor kind: {0:?}")]
pub struct UnknownKind(pub String);

/// A physical value read from one sensor.
///
/// The variant always matches the [`SensorKind`] of the sensor that
/// produced it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Measurement {
    TempHumidity {
        /// Temperature in degrees Celsius
        temperature_c: f32,
        /// Relative humidity in percent, clamped to 0..=100
        humidity_rh: f32,
    },
    DifferentialPressure {
        /// Differential pressure in Pascal
        pascal: f32,
    },
    Illuminance {
        /// Ambient light level in lux
        lux: f32,
    },
    Particulates {
        /// Mass concentration PM1.0 in ug/m3
        pm1_0: f32,
        /// Mass concentration PM2.5 in ug/m3
        pm2_5: f32,
        /// Mass concentration PM4.0 in ug/m3
        pm4_0: f32,
        /// Mass concentration PM10 in ug/m3
        pm10_0: f32,
    },
    Acceleration {
        /// X axis acceleration in g
        x_g: f32,
        /// Y axis acceleration in g
        y_g: f32,
        /// Z axis acceleration in g
        z_g: f32,
    },
}

impl Measurement {
    /// The sensor kind this measurement belongs to.
    pub fn kind(&self) -> SensorKind {
        match self {
            Measurement::TempHumidity { .. } => SensorKind::TempHumidity,
            Measurement::DifferentialPressure { .. } => SensorKind::DifferentialPressure,
            Measurement::Illuminance { .. } => SensorKind::Illuminance,
            Measurement::Particulates { .. } => SensorKind::Particulates,
            Measurement::Acceleration { .. } => SensorKind::Acceleration,
        }
    }
}

/// One sensor's identity plus its most recent value.
///
/// `measurement` is `None` when the sensor failed to read; its status in
/// the embedded descriptor says why it is missing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Which sensor this is and where it sits
    pub sensor: SensorDescriptor,
    /// The value, absent if the read failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement: Option<Measurement>,
    /// Unix timestamp in milliseconds when the value was read
    pub timestamp_ms: u64,
}

impl SensorSnapshot {
    /// Snapshot for a successful read, stamped now.
    pub fn ok(sensor: SensorDescriptor, measurement: Measurement) -> Self {
        Self {
            sensor,
            measurement: Some(measurement),
            timestamp_ms: unix_millis(),
        }
    }

    /// Snapshot for a failed read; `sensor.status` carries the failure.
    pub fn failed(sensor: SensorDescriptor) -> Self {
        Self {
            sensor,
            measurement: None,
            timestamp_ms: unix_millis(),
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
