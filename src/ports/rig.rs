//! Rig port - abstraction over the whole sensor rig
//!
//! This trait is what the web layer and the diagnostics CLI consume. It is
//! implemented by the hardware scanner and, for UI development without
//! hardware, by the mock rig.

use serde::{Deserialize, Serialize};

use crate::domain::{SensorDescriptor, SensorKind, SensorSnapshot};
use crate::ports::sensor::SensorError;

/// Error type for rig-level operations.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RigError {
    /// No sensor of the requested kind is registered
    #[error("no {0} sensor registered")]
    NoSuchSensor(SensorKind),
    /// The underlying sensor failed
    #[error(transparent)]
    Sensor(#[from] SensorError),
    /// The scan itself could not run (e.g. bus device missing)
    #[error("scan failed: {0}")]
    Scan(String),
}

/// A multiplexer found during scanning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuxInfo {
    /// I2C bus number the mux sits on
    pub bus: u8,
    /// The mux's own I2C address (0x70..=0x77)
    pub address: u8,
}

/// Result of one full hardware scan.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Bus numbers that were successfully opened and walked
    pub buses_scanned: Vec<u8>,
    /// Multiplexers detected
    pub muxes_found: Vec<MuxInfo>,
    /// Sensors detected and registered
    pub sensors: Vec<SensorDescriptor>,
}

/// Port for the rig as a whole.
pub trait RigPort: Send + Sync {
    /// Re-enumerate the hardware, replacing the registry.
    fn scan(&self) -> Result<ScanSummary, RigError>;

    /// Currently registered sensors.
    ///
    /// I2C sensors appear only after a scan has registered them. Sensors
    /// served by a background poller (the UART particulate sensor) are
    /// listed as soon as the poller is attached; they are not discovered
    /// by scanning.
    fn sensors(&self) -> Vec<SensorDescriptor>;

    /// Read every registered sensor sequentially.
    ///
    /// A failing sensor appears with `status: error` and no measurement;
    /// it never aborts the rest of the pass.
    fn snapshot(&self) -> Vec<SensorSnapshot>;

    /// One fresh reading from the first registered sensor of `kind`.
    fn read_kind(&self, kind: SensorKind) -> Result<SensorSnapshot, RigError>;

    /// Forget all registered sensors and quiesce the buses.
    fn reset(&self);
}
