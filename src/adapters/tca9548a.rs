//! TCA9548A I2C multiplexer adapter
//!
//! The TCA9548A exposes 8 downstream I2C buses; writing a bitmask to its
//! control register connects the selected channels, reading returns the
//! current mask. All sensor drivers go through [`MuxChannel`], which locks
//! the shared bus for the whole select-then-transfer sequence, so channel
//! selection can never interleave with another thread's traffic.

use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::i2c::{ErrorType, I2c, Operation};

use crate::ports::sensor::SensorError;

/// An I2C bus shared between the scanner, the drivers and the sampler.
pub type SharedBus<B> = Arc<Mutex<B>>;

/// Wrap a bus for sharing.
pub fn shared<B>(bus: B) -> SharedBus<B> {
    Arc::new(Mutex::new(bus))
}

/// Lock a shared bus, recovering from a poisoned mutex.
///
/// A panic mid-transaction leaves the bus in an unknown state at worst;
/// the next transfer re-selects its channel anyway.
pub(crate) fn lock_bus<B>(bus: &SharedBus<B>) -> MutexGuard<'_, B> {
    match bus.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// TCA9548A control operations.
pub struct Tca9548a;

impl Tca9548a {
    /// The fixed address window selected by the A0..A2 strap pins.
    pub const ADDRESSES: core::ops::RangeInclusive<u8> = 0x70..=0x77;

    /// Detect a TCA9548A at `address`.
    ///
    /// Writes a channel mask and reads it back; the mux echoes its control
    /// register, which tells it apart from other parts parked in the
    /// 0x70 range. The mask is cleared again before returning.
    pub fn detect<B: I2c>(bus: &SharedBus<B>, address: u8) -> Result<bool, SensorError> {
        let mut guard = lock_bus(bus);
        if guard.write(address, &[0x01]).is_err() {
            // nothing ACKed the address
            return Ok(false);
        }
        let mut mask = [0u8; 1];
        guard.read(address, &mut mask).map_err(SensorError::bus)?;
        let is_mux = mask[0] == 0x01;
        guard.write(address, &[0x00]).map_err(SensorError::bus)?;
        Ok(is_mux)
    }

    /// Disconnect all 8 channels of the mux at `address`.
    pub fn deselect<B: I2c>(bus: &SharedBus<B>, address: u8) -> Result<(), SensorError> {
        lock_bus(bus)
            .write(address, &[0x00])
            .map_err(SensorError::bus)
    }
}

/// Handle to one downstream I2C slot, usable wherever an
/// [`embedded_hal::i2c::I2c`] is expected.
///
/// For a muxed slot, every transaction first writes the channel bitmask
/// while holding the bus lock; a direct slot just locks and delegates.
/// Drivers own one of these, exactly like owning a private bus.
pub struct MuxChannel<B> {
    bus: SharedBus<B>,
    /// `(mux address, channel bitmask)` when behind a TCA9548A
    select: Option<(u8, u8)>,
}

impl<B> MuxChannel<B> {
    /// Slot directly on the bus, no multiplexer in between.
    pub fn direct(bus: SharedBus<B>) -> Self {
        Self { bus, select: None }
    }

    /// Slot behind channel `channel` (0..=7) of the mux at `mux_address`.
    pub fn muxed(bus: SharedBus<B>, mux_address: u8, channel: u8) -> Self {
        debug_assert!(channel < 8);
        Self {
            bus,
            select: Some((mux_address, 1 << channel)),
        }
    }
}

impl<B> Clone for MuxChannel<B> {
    fn clone(&self) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
            select: self.select,
        }
    }
}

impl<B: I2c> ErrorType for MuxChannel<B> {
    type Error = B::Error;
}

impl<B: I2c> I2c for MuxChannel<B> {
    fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        let mut guard = lock_bus(&self.bus);
        if let Some((mux, mask)) = self.select {
            guard.write(mux, &[mask])?;
        }
        guard.read(address, read)
    }

    fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        let mut guard = lock_bus(&self.bus);
        if let Some((mux, mask)) = self.select {
            guard.write(mux, &[mask])?;
        }
        guard.write(address, write)
    }

    fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        let mut guard = lock_bus(&self.bus);
        if let Some((mux, mask)) = self.select {
            guard.write(mux, &[mask])?;
        }
        guard.write_read(address, write, read)
    }

    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut guard = lock_bus(&self.bus);
        if let Some((mux, mask)) = self.select {
            guard.write(mux, &[mask])?;
        }
        guard.transaction(address, operations)
    }
}
