//! Multiplexed Sensor Rig Dashboard Library
//!
//! This library provides a hexagonal architecture for a Linux sensor rig:
//! two I2C buses behind optional TCA9548A multiplexers, a UART particulate
//! sensor and an SPI accelerometer, served over REST and WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Domain Layer                                 │
//! │  - SensorDescriptor / Measurement / SensorSnapshot entities     │
//! │  - Sensirion CRC-8 service                                      │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Ports (Traits)                               │
//! │  - SensorPort: probe/read one sensor                            │
//! │  - RigPort: scan/snapshot the whole rig                         │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters                                     │
//! │  - Tca9548a / MuxChannel: shared-bus channel routing            │
//! │  - Sht40, Sdp810, Bh1750: I2C sensor drivers                    │
//! │  - Sps30: UART/SHDLC particulate driver                         │
//! │  - Lis3dh: SPI accelerometer driver                             │
//! │  - MockRig: hardware-free digital twin                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`scanner::HardwareRig`] ties the adapters together behind
//! [`ports::RigPort`]; the [`web`] module serves that port over HTTP.

// ============================================================================
// Protocol (shared between daemon and browser dashboards)
// ============================================================================

pub mod protocol;

pub use protocol::{ApiResponse, ClientMessage, WsMessage};

// ============================================================================
// Hexagonal Architecture
// ============================================================================

/// Domain layer - pure entities and conversions
pub mod domain;

/// Ports - trait boundaries between layers
pub mod ports;

/// Adapters - bus plumbing and sensor drivers
pub mod adapters;

// ============================================================================
// Services
// ============================================================================

/// Bus walking, sensor classification and the registry
pub mod scanner;

/// Background SPS30 polling into a shared cache
pub mod poller;

/// Daemon configuration
pub mod config;

/// HTTP + WebSocket serving layer
pub mod web;

pub use config::RigConfig;
pub use domain::{Measurement, SensorDescriptor, SensorKind, SensorSnapshot};
pub use ports::{RigError, RigPort, SensorError, SensorPort};
pub use scanner::HardwareRig;
