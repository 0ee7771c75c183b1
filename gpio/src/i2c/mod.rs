//! Two-wire (I2C) bus model.
//!
//! [I2cBus] is the bus master's view: whole write or read transactions addressed to a 7-bit
//! peripheral address. [I2cPeripheral] is the device side, answering one byte at a time, in the
//! same shape as the callbacks a bus controller raises for an addressed device.

mod sim;

use crate::GpioResult;
use std::fmt::Debug;
pub use sim::*;

/// Master side of an I2C bus.
pub trait I2cBus: Debug + Send + Sync {
    /// Writes `bytes` to the peripheral at `address` in a single transaction.
    ///
    /// # Errors
    /// - `GpioError::Nack` if no peripheral answers the address, or one refuses a byte.
    fn write(&self, address: u8, bytes: &[u8]) -> GpioResult<()>;

    /// Fills `buffer` with bytes read from the peripheral at `address` in a single transaction.
    ///
    /// # Errors
    /// - `GpioError::Nack` if no peripheral answers the address.
    fn read(&self, address: u8, buffer: &mut [u8]) -> GpioResult<()>;

    /// Writes a single byte and reads a single byte back, as two transactions.
    fn write_read_byte(&self, address: u8, byte: u8) -> GpioResult<u8> {
        self.write(address, &[byte])?;
        let mut buffer = [0u8];
        self.read(address, &mut buffer)?;
        Ok(buffer[0])
    }
}

/// Device side of an I2C bus.
pub trait I2cPeripheral: Debug + Send {
    /// The 7-bit address the peripheral answers to.
    fn address(&self) -> u8;

    /// Called when the master addresses the peripheral. Returns whether to acknowledge.
    fn connect(&mut self, _read: bool) -> bool {
        true
    }

    /// Called for every byte the master reads.
    fn read(&mut self) -> u8;

    /// Called for every byte the master writes. Returns whether to acknowledge.
    fn write(&mut self, data: u8) -> bool;

    /// Called on the stop condition ending the transaction.
    fn disconnect(&mut self) {}
}
