//! Background poller for the SPS30 particulate sensor
//!
//! The SPS30 sits on a UART that cannot be shared the way the I2C buses
//! can, so one thread owns the port outright and everyone else reads the
//! cached latest snapshot. The thread starts the measurement once and
//! then polls on a fixed interval until stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};

use crate::domain::{BusLocation, SensorDescriptor, SensorKind, SensorSnapshot, SensorStatus};
use crate::ports::sensor::{SensorError, SensorPort};

/// Latest particulate snapshot, shared with the rig.
pub type PmCache = Arc<Mutex<Option<SensorSnapshot>>>;

/// Fresh, empty cache.
pub fn pm_cache() -> PmCache {
    Arc::new(Mutex::new(None))
}

/// Handle to the running poller thread.
pub struct Sps30Poller {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Sps30Poller {
    /// Spawn the poll loop over any sensor driver (the SPS30 in
    /// production, a scripted fake in tests).
    pub fn spawn(
        mut sensor: impl SensorPort + 'static,
        cache: PmCache,
        interval: Duration,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("sps30-poller".into())
            .spawn(move || {
                let descriptor =
                    SensorDescriptor::new(SensorKind::Particulates, BusLocation::Uart);
                info!("SPS30 poller started, interval {interval:?}");
                while !stop_flag.load(Ordering::Relaxed) {
                    let entry = match sensor.read() {
                        Ok(measurement) => SensorSnapshot::ok(descriptor.clone(), measurement),
                        Err(e) => {
                            if !matches!(e, SensorError::Timeout) {
                                warn!("SPS30 read failed: {e}");
                            }
                            SensorSnapshot::failed(
                                descriptor.with_status(SensorStatus::Error),
                            )
                        }
                    };
                    match cache.lock() {
                        Ok(mut guard) => *guard = Some(entry),
                        Err(poisoned) => *poisoned.into_inner() = Some(entry),
                    }
                    // sleep in small steps so stop() is responsive
                    let mut left = interval;
                    while !left.is_zero() && !stop_flag.load(Ordering::Relaxed) {
                        let step = left.min(Duration::from_millis(50));
                        thread::sleep(step);
                        left = left.saturating_sub(step);
                    }
                }
                info!("SPS30 poller stopped");
            })
            .expect("failed to spawn sps30-poller thread");

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the loop to exit and join the thread.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Sps30Poller {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
