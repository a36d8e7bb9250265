//! Adapters - concrete implementations of ports
//!
//! Adapters connect the domain to real hardware (or to a mock of it) by
//! implementing the port traits.
//!
//! # Available Adapters
//!
//! - **tca9548a**: TCA9548A 8-channel I2C multiplexer and the shared-bus
//!   channel handle all I2C drivers run through
//! - **sht40**: SHT40 temperature/humidity sensor via I2C
//! - **sdp810**: SDP810 differential pressure sensor via I2C
//! - **bh1750**: BH1750 ambient light sensor via I2C
//! - **sps30**: SPS30 particulate matter sensor via UART (SHDLC)
//! - **lis3dh**: LIS3DH 3-axis accelerometer via SPI
//! - **mock**: random-value rig for UI development without hardware

pub mod bh1750;
pub mod lis3dh;
pub mod mock;
pub mod sdp810;
pub mod sht40;
pub mod sps30;
pub mod tca9548a;

pub use bh1750::Bh1750;
pub use lis3dh::Lis3dh;
pub use mock::MockRig;
pub use sdp810::Sdp810;
pub use sht40::Sht40;
pub use sps30::Sps30;
pub use tca9548a::{shared, MuxChannel, SharedBus, Tca9548a};
