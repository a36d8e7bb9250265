//! Ports (interfaces) defining the boundaries of the application
//!
//! Ports are traits that define how the domain interacts with external
//! systems. They allow the serving layers to remain independent of
//! specific implementations.
//!
//! # Hexagonal Architecture
//!
//! - **SensorPort**: how one sensor is probed and read (I2C, SPI, UART)
//! - **RigPort**: how the web layer and the diagnostics CLI see the whole
//!   rig (hardware scanner or mock generator)

pub mod rig;
pub mod sensor;

pub use rig::{RigError, RigPort, ScanSummary};
pub use sensor::{RetryPolicy, SensorError, SensorPort};
