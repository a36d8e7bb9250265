//! Mock rig - random but plausible readings for UI development
//!
//! The digital-twin mode: one sensor of every kind on a pretend mux,
//! values drawn from realistic indoor ranges. Selected only by explicit
//! configuration (`mode = "mock"`); the hardware rig never silently
//! substitutes mock data when a sensor fails.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::{
    BusLocation, Measurement, SensorDescriptor, SensorKind, SensorSnapshot,
};
use crate::ports::rig::{MuxInfo, RigError, RigPort, ScanSummary};

/// Rig implementation backed by a seedable RNG instead of hardware.
pub struct MockRig {
    rng: Mutex<StdRng>,
    sensors: Mutex<Vec<SensorDescriptor>>,
}

impl MockRig {
    /// Deterministic rig; the same seed replays the same value sequence.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            sensors: Mutex::new(Vec::new()),
        }
    }

    fn fake_descriptors() -> Vec<SensorDescriptor> {
        vec![
            SensorDescriptor::new(
                SensorKind::TempHumidity,
                BusLocation::I2cMuxed {
                    bus: 1,
                    mux_address: 0x70,
                    channel: 0,
                    address: 0x44,
                },
            ),
            SensorDescriptor::new(
                SensorKind::DifferentialPressure,
                BusLocation::I2cMuxed {
                    bus: 1,
                    mux_address: 0x70,
                    channel: 1,
                    address: 0x25,
                },
            ),
            SensorDescriptor::new(
                SensorKind::Illuminance,
                BusLocation::I2cMuxed {
                    bus: 1,
                    mux_address: 0x70,
                    channel: 2,
                    address: 0x23,
                },
            ),
            SensorDescriptor::new(SensorKind::Particulates, BusLocation::Uart),
            SensorDescriptor::new(SensorKind::Acceleration, BusLocation::Spi),
        ]
    }

    fn fake_measurement(&self, kind: SensorKind) -> Measurement {
        let mut rng = match self.rng.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        match kind {
            SensorKind::TempHumidity => Measurement::TempHumidity {
                temperature_c: rng.gen_range(18.0..28.0),
                humidity_rh: rng.gen_range(30.0..60.0),
            },
            SensorKind::DifferentialPressure => Measurement::DifferentialPressure {
                pascal: rng.gen_range(-5.0..5.0),
            },
            SensorKind::Illuminance => Measurement::Illuminance {
                lux: rng.gen_range(50.0..800.0),
            },
            SensorKind::Particulates => {
                let pm1_0 = rng.gen_range(1.0..15.0);
                Measurement::Particulates {
                    pm1_0,
                    pm2_5: pm1_0 * rng.gen_range(1.0..1.8),
                    pm4_0: pm1_0 * rng.gen_range(1.8..2.5),
                    pm10_0: pm1_0 * rng.gen_range(2.5..3.5),
                }
            }
            SensorKind::Acceleration => Measurement::Acceleration {
                x_g: rng.gen_range(-0.02..0.02),
                y_g: rng.gen_range(-0.02..0.02),
                z_g: 1.0 + rng.gen_range(-0.02..0.02),
            },
        }
    }
}

impl Default for MockRig {
    fn default() -> Self {
        Self::with_seed(rand::random())
    }
}

impl RigPort for MockRig {
    fn scan(&self) -> Result<ScanSummary, RigError> {
        let sensors = Self::fake_descriptors();
        *self.sensors.lock().unwrap_or_else(|p| p.into_inner()) = sensors.clone();
        Ok(ScanSummary {
            buses_scanned: vec![0, 1],
            muxes_found: vec![MuxInfo {
                bus: 1,
                address: 0x70,
            }],
            sensors,
        })
    }

    fn sensors(&self) -> Vec<SensorDescriptor> {
        self.sensors
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn snapshot(&self) -> Vec<SensorSnapshot> {
        self.sensors()
            .into_iter()
            .map(|d| {
                let m = self.fake_measurement(d.kind);
                SensorSnapshot::ok(d, m)
            })
            .collect()
    }

    fn read_kind(&self, kind: SensorKind) -> Result<SensorSnapshot, RigError> {
        let descriptor = self
            .sensors()
            .into_iter()
            .find(|d| d.kind == kind)
            .ok_or(RigError::NoSuchSensor(kind))?;
        let m = self.fake_measurement(kind);
        Ok(SensorSnapshot::ok(descriptor, m))
    }

    fn reset(&self) {
        self.sensors
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_until_scanned() {
        let rig = MockRig::with_seed(1);
        assert!(rig.sensors().is_empty());
        assert!(rig.snapshot().is_empty());
    }

    #[test]
    fn scan_registers_one_of_each_kind() {
        let rig = MockRig::with_seed(1);
        let summary = rig.scan().unwrap();
        assert_eq!(summary.sensors.len(), SensorKind::ALL.len());
        for kind in SensorKind::ALL {
            assert!(summary.sensors.iter().any(|d| d.kind == kind));
        }
    }

    #[test]
    fn snapshot_variant_matches_kind() {
        let rig = MockRig::with_seed(7);
        rig.scan().unwrap();
        for snap in rig.snapshot() {
            let m = snap.measurement.expect("mock reads never fail");
            assert_eq!(m.kind(), snap.sensor.kind);
        }
    }

    #[test]
    fn read_kind_after_reset_fails() {
        let rig = MockRig::with_seed(3);
        rig.scan().unwrap();
        rig.reset();
        assert!(matches!(
            rig.read_kind(SensorKind::Illuminance),
            Err(RigError::NoSuchSensor(SensorKind::Illuminance))
        ));
    }

    #[test]
    fn same_seed_same_sequence() {
        let a = MockRig::with_seed(42);
        let b = MockRig::with_seed(42);
        a.scan().unwrap();
        b.scan().unwrap();
        let ma = a.read_kind(SensorKind::Illuminance).unwrap().measurement;
        let mb = b.read_kind(SensorKind::Illuminance).unwrap().measurement;
        assert_eq!(ma, mb);
    }
}
