//! Hardware scanner - mux detection, sensor classification, registry
//!
//! One full scan walks every configured I2C bus: detect TCA9548A muxes in
//! the 0x70 window, probe the known sensor addresses directly on the bus,
//! then walk each mux channel and probe again. A device is classified by
//! its address and a device-specific test command; addresses that answer
//! the probe get a driver constructed on their [`MuxChannel`] slot and a
//! descriptor in the registry.
//!
//! Reads are sequential and per-sensor fault-isolated: a sensor that
//! fails shows up as `status: error` in the snapshot without affecting
//! the others.

use std::sync::Mutex;

use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use crate::adapters::{Bh1750, MuxChannel, Sdp810, SharedBus, Sht40, Tca9548a};
use crate::domain::{
    BusLocation, SensorDescriptor, SensorKind, SensorSnapshot, SensorStatus,
};
use crate::poller::PmCache;
use crate::ports::rig::{MuxInfo, RigError, RigPort, ScanSummary};
use crate::ports::sensor::{RetryPolicy, SensorError, SensorPort};

/// Sensor addresses worth probing, across all supported I2C parts.
pub const CANDIDATE_ADDRESSES: &[u8] = &[0x44, 0x45, 0x25, 0x26, 0x23, 0x5C];

struct RegisteredSensor {
    descriptor: SensorDescriptor,
    driver: Box<dyn SensorPort>,
}

/// The real rig: shared I2C buses, a registry of discovered sensors,
/// optionally a particulate cache fed by the background poller and
/// statically provisioned sensors (the SPI accelerometer).
pub struct HardwareRig<B: I2c + Send + 'static> {
    buses: Vec<(u8, SharedBus<B>)>,
    retry: RetryPolicy,
    registry: Mutex<Vec<RegisteredSensor>>,
    muxes: Mutex<Vec<MuxInfo>>,
    /// Config-provisioned sensors, not subject to I2C discovery
    fixed: Mutex<Vec<RegisteredSensor>>,
    pm_cache: Option<PmCache>,
}

impl<B: I2c + Send + 'static> HardwareRig<B> {
    /// Build a rig over already-opened buses, `(bus number, bus)` pairs.
    pub fn new(buses: Vec<(u8, SharedBus<B>)>) -> Self {
        Self {
            buses,
            retry: RetryPolicy::default(),
            registry: Mutex::new(Vec::new()),
            muxes: Mutex::new(Vec::new()),
            fixed: Mutex::new(Vec::new()),
            pm_cache: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attach the cache the SPS30 poller writes into.
    pub fn with_pm_cache(mut self, cache: PmCache) -> Self {
        self.pm_cache = Some(cache);
        self
    }

    /// Register a sensor that discovery cannot find (SPI devices).
    /// Fixed sensors survive `scan` and `reset`.
    pub fn add_fixed_sensor(
        &self,
        descriptor: SensorDescriptor,
        driver: Box<dyn SensorPort>,
    ) {
        lock(&self.fixed).push(RegisteredSensor { descriptor, driver });
    }

    /// Try each driver whose address table contains `address`.
    fn classify(
        slot: MuxChannel<B>,
        address: u8,
    ) -> Option<(SensorKind, Box<dyn SensorPort>)> {
        if Sht40::<MuxChannel<B>>::ADDRESSES.contains(&address) {
            let mut driver = Sht40::new(slot, address);
            if driver.probe().is_ok() {
                return Some((SensorKind::TempHumidity, Box::new(driver)));
            }
        } else if Sdp810::<MuxChannel<B>>::ADDRESSES.contains(&address) {
            let mut driver = Sdp810::new(slot, address);
            if driver.probe().is_ok() {
                return Some((SensorKind::DifferentialPressure, Box::new(driver)));
            }
        } else if Bh1750::<MuxChannel<B>>::ADDRESSES.contains(&address) {
            let mut driver = Bh1750::new(slot, address);
            if driver.probe().is_ok() {
                return Some((SensorKind::Illuminance, Box::new(driver)));
            }
        }
        None
    }

    /// Probe every candidate address reachable through `slot`.
    fn probe_slot(
        bus: u8,
        slot_of: impl Fn() -> MuxChannel<B>,
        locate: impl Fn(u8) -> BusLocation,
        found: &mut Vec<RegisteredSensor>,
    ) {
        for &address in CANDIDATE_ADDRESSES {
            if let Some((kind, driver)) = Self::classify(slot_of(), address) {
                let descriptor = SensorDescriptor::new(kind, locate(address));
                info!("bus {bus}: found {kind} at {}", descriptor.label);
                found.push(RegisteredSensor { descriptor, driver });
            }
        }
    }

    /// Read one registered sensor, applying the retry policy and
    /// recording the resulting status on its descriptor.
    fn read_registered(
        &self,
        entry: &mut RegisteredSensor,
    ) -> Result<SensorSnapshot, SensorError> {
        match self.retry.run(|| entry.driver.read()) {
            Ok((measurement, retries)) => {
                entry.descriptor.status = if retries == 0 {
                    SensorStatus::Ok
                } else {
                    SensorStatus::Degraded
                };
                Ok(SensorSnapshot::ok(entry.descriptor.clone(), measurement))
            }
            Err(e) => {
                warn!("read failed for {}: {e}", entry.descriptor.label);
                entry.descriptor.status = SensorStatus::Error;
                Err(e)
            }
        }
    }

    /// The particulate snapshot, if the poller has produced one.
    fn pm_snapshot(&self) -> Option<SensorSnapshot> {
        let cache = self.pm_cache.as_ref()?;
        lock(cache).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<B: I2c + Send + 'static> RigPort for HardwareRig<B> {
    fn scan(&self) -> Result<ScanSummary, RigError> {
        if self.buses.is_empty() {
            return Err(RigError::Scan("no I2C buses configured".into()));
        }

        let mut discovered = Vec::new();
        let mut muxes = Vec::new();
        let mut buses_scanned = Vec::new();

        for (bus_no, bus) in &self.buses {
            let bus_no = *bus_no;
            debug!("scanning i2c bus {bus_no}");
            buses_scanned.push(bus_no);

            // Detect muxes first; detection leaves every mux deselected,
            // so the direct probes below see only the root segment.
            let mut bus_muxes = Vec::new();
            for mux_address in Tca9548a::ADDRESSES {
                match Tca9548a::detect(bus, mux_address) {
                    Ok(true) => {
                        info!("bus {bus_no}: TCA9548A at 0x{mux_address:02x}");
                        bus_muxes.push(mux_address);
                        muxes.push(MuxInfo {
                            bus: bus_no,
                            address: mux_address,
                        });
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("bus {bus_no}: mux probe 0x{mux_address:02x} failed: {e}")
                    }
                }
            }

            Self::probe_slot(
                bus_no,
                || MuxChannel::direct(bus.clone()),
                |address| BusLocation::I2cDirect {
                    bus: bus_no,
                    address,
                },
                &mut discovered,
            );

            for mux_address in bus_muxes {
                for channel in 0..8 {
                    Self::probe_slot(
                        bus_no,
                        || MuxChannel::muxed(bus.clone(), mux_address, channel),
                        |address| BusLocation::I2cMuxed {
                            bus: bus_no,
                            mux_address,
                            channel,
                            address,
                        },
                        &mut discovered,
                    );
                }
                if let Err(e) = Tca9548a::deselect(bus, mux_address) {
                    warn!("bus {bus_no}: deselect mux 0x{mux_address:02x} failed: {e}");
                }
            }
        }

        let mut sensors: Vec<SensorDescriptor> = discovered
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect();
        sensors.extend(lock(&self.fixed).iter().map(|e| e.descriptor.clone()));
        if self.pm_cache.is_some() {
            sensors.push(SensorDescriptor::new(
                SensorKind::Particulates,
                BusLocation::Uart,
            ));
        }

        info!(
            "scan complete: {} bus(es), {} mux(es), {} sensor(s)",
            buses_scanned.len(),
            muxes.len(),
            sensors.len()
        );

        *lock(&self.registry) = discovered;
        *lock(&self.muxes) = muxes.clone();

        Ok(ScanSummary {
            buses_scanned,
            muxes_found: muxes,
            sensors,
        })
    }

    fn sensors(&self) -> Vec<SensorDescriptor> {
        let mut out: Vec<SensorDescriptor> = lock(&self.registry)
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect();
        out.extend(lock(&self.fixed).iter().map(|e| e.descriptor.clone()));
        if self.pm_cache.is_some() {
            out.push(match self.pm_snapshot() {
                Some(snap) => snap.sensor,
                None => SensorDescriptor::new(SensorKind::Particulates, BusLocation::Uart),
            });
        }
        out
    }

    fn snapshot(&self) -> Vec<SensorSnapshot> {
        let mut out = Vec::new();
        for registry in [&self.registry, &self.fixed] {
            for entry in lock(registry).iter_mut() {
                out.push(match self.read_registered(entry) {
                    Ok(snap) => snap,
                    Err(_) => SensorSnapshot::failed(entry.descriptor.clone()),
                });
            }
        }
        if let Some(snap) = self.pm_snapshot() {
            out.push(snap);
        }
        out
    }

    fn read_kind(&self, kind: SensorKind) -> Result<SensorSnapshot, RigError> {
        if kind == SensorKind::Particulates {
            // served from the poller cache; the UART is not shareable
            return match self.pm_snapshot() {
                Some(snap) => Ok(snap),
                None if self.pm_cache.is_some() => {
                    Err(RigError::Sensor(SensorError::Timeout))
                }
                None => Err(RigError::NoSuchSensor(kind)),
            };
        }

        for registry in [&self.registry, &self.fixed] {
            let mut guard = lock(registry);
            if let Some(entry) = guard.iter_mut().find(|e| e.descriptor.kind == kind) {
                return self.read_registered(entry).map_err(RigError::from);
            }
        }
        Err(RigError::NoSuchSensor(kind))
    }

    fn reset(&self) {
        lock(&self.registry).clear();
        for mux in lock(&self.muxes).drain(..) {
            if let Some((_, bus)) = self.buses.iter().find(|(no, _)| *no == mux.bus) {
                if let Err(e) = Tca9548a::deselect(bus, mux.address) {
                    warn!(
                        "reset: deselect mux 0x{:02x} on bus {} failed: {e}",
                        mux.address, mux.bus
                    );
                }
            }
        }
        info!("scanner reset, registry cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::shared;
    use crate::domain::crc::crc8;
    use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    const NAK: ErrorKind = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);

    fn word(w: u16) -> Vec<u8> {
        let be = w.to_be_bytes();
        vec![be[0], be[1], crc8(&be)]
    }

    /// The probe write each driver issues for one candidate address.
    fn probe_write(address: u8) -> Vec<u8> {
        match address {
            0x44 | 0x45 => vec![0x89],       // SHT40 serial number
            0x25 | 0x26 => vec![0x3F, 0xF9], // SDP810 stop continuous
            0x23 | 0x5C => vec![0x01],       // BH1750 power on
            other => panic!("unexpected candidate 0x{other:02x}"),
        }
    }

    /// Empty-slot probes for all candidates, optionally behind a mux mask.
    fn empty_probes(expect: &mut Vec<Transaction>, select: Option<(u8, u8)>, skip: &[u8]) {
        for &address in CANDIDATE_ADDRESSES {
            if skip.contains(&address) {
                continue;
            }
            if let Some((mux, mask)) = select {
                expect.push(Transaction::write(mux, vec![mask]));
            }
            expect.push(Transaction::write(address, probe_write(address)).with_error(NAK));
        }
    }

    /// A rig on one mock bus: TCA9548A at 0x70, SHT40 on channel 3.
    fn rig_expectations() -> Vec<Transaction> {
        let mut expect = Vec::new();

        // mux detection window
        expect.push(Transaction::write(0x70, vec![0x01]));
        expect.push(Transaction::read(0x70, vec![0x01]));
        expect.push(Transaction::write(0x70, vec![0x00]));
        for address in 0x71..=0x77 {
            expect.push(Transaction::write(address, vec![0x01]).with_error(NAK));
        }

        // nothing directly on the bus
        empty_probes(&mut expect, None, &[]);

        // channels 0..=2 empty
        for channel in 0..3u8 {
            empty_probes(&mut expect, Some((0x70, 1 << channel)), &[]);
        }
        // channel 3: SHT40 answers its serial-number probe
        let mut serial = word(0x1234);
        serial.extend_from_slice(&word(0x5678));
        expect.push(Transaction::write(0x70, vec![1 << 3]));
        expect.push(Transaction::write(0x44, vec![0x89]));
        expect.push(Transaction::write(0x70, vec![1 << 3]));
        expect.push(Transaction::read(0x44, serial));
        empty_probes(&mut expect, Some((0x70, 1 << 3)), &[0x44]);
        // channels 4..=7 empty
        for channel in 4..8u8 {
            empty_probes(&mut expect, Some((0x70, 1 << channel)), &[]);
        }

        // mux quiesced after the walk
        expect.push(Transaction::write(0x70, vec![0x00]));
        expect
    }

    #[test]
    fn scan_finds_mux_and_classifies_sht40() {
        let mock = I2cMock::new(&rig_expectations());
        let mut handle = mock.clone();
        let rig = HardwareRig::new(vec![(1, shared(mock))]);

        let summary = rig.scan().unwrap();
        assert_eq!(summary.buses_scanned, vec![1]);
        assert_eq!(
            summary.muxes_found,
            vec![MuxInfo {
                bus: 1,
                address: 0x70
            }]
        );
        assert_eq!(summary.sensors.len(), 1);
        let sensor = &summary.sensors[0];
        assert_eq!(sensor.kind, SensorKind::TempHumidity);
        assert_eq!(sensor.label, "i2c1:mux70:ch3:0x44");
        assert_eq!(rig.sensors().len(), 1);
        handle.done();
    }

    #[test]
    fn snapshot_reads_discovered_sensor() {
        let mut expect = rig_expectations();
        // SHT40 measurement through channel 3
        let mut data = word(0x8000);
        data.extend_from_slice(&word(0x8000));
        expect.push(Transaction::write(0x70, vec![1 << 3]));
        expect.push(Transaction::write(0x44, vec![0xFD]));
        expect.push(Transaction::write(0x70, vec![1 << 3]));
        expect.push(Transaction::read(0x44, data));

        let mock = I2cMock::new(&expect);
        let mut handle = mock.clone();
        let rig = HardwareRig::new(vec![(1, shared(mock))]).with_retry(RetryPolicy::none());

        rig.scan().unwrap();
        let snaps = rig.snapshot();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].sensor.status, SensorStatus::Ok);
        assert!(matches!(
            snaps[0].measurement,
            Some(crate::domain::Measurement::TempHumidity { .. })
        ));
        handle.done();
    }

    #[test]
    fn failing_sensor_is_reported_not_fatal() {
        let mut expect = rig_expectations();
        // measurement trigger NAKs; retries disabled
        expect.push(Transaction::write(0x70, vec![1 << 3]));
        expect.push(Transaction::write(0x44, vec![0xFD]).with_error(NAK));

        let mock = I2cMock::new(&expect);
        let mut handle = mock.clone();
        let rig = HardwareRig::new(vec![(1, shared(mock))]).with_retry(RetryPolicy::none());

        rig.scan().unwrap();
        let snaps = rig.snapshot();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].sensor.status, SensorStatus::Error);
        assert!(snaps[0].measurement.is_none());
        handle.done();
    }

    #[test]
    fn reset_clears_registry_and_quiesces_mux() {
        let mut expect = rig_expectations();
        expect.push(Transaction::write(0x70, vec![0x00])); // reset deselect

        let mock = I2cMock::new(&expect);
        let mut handle = mock.clone();
        let rig = HardwareRig::new(vec![(1, shared(mock))]);

        rig.scan().unwrap();
        rig.reset();
        assert!(rig.sensors().is_empty());
        assert!(matches!(
            rig.read_kind(SensorKind::TempHumidity),
            Err(RigError::NoSuchSensor(_))
        ));
        handle.done();
    }

    #[test]
    fn scan_without_buses_errors() {
        let rig: HardwareRig<I2cMock> = HardwareRig::new(vec![]);
        assert!(matches!(rig.scan(), Err(RigError::Scan(_))));
    }

    #[test]
    fn poller_backed_sensor_is_listed_without_a_scan() {
        let rig: HardwareRig<I2cMock> =
            HardwareRig::new(vec![]).with_pm_cache(crate::poller::pm_cache());
        let sensors = rig.sensors();
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].kind, SensorKind::Particulates);
        assert_eq!(sensors[0].location, BusLocation::Uart);
    }
}
