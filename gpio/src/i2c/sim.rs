use crate::i2c::{I2cBus, I2cPeripheral};
use crate::{GpioError, GpioResult};
use log::trace;
use std::fmt::{Debug, Formatter};
use std::sync::{Mutex, MutexGuard};

/// An in-process I2C bus routing transactions to attached [I2cPeripheral]s.
///
/// Every transaction holds the bus for its whole duration, so transactions coming from
/// different threads never interleave.
pub struct SimI2cBus<'a> {
    peripherals: Mutex<Vec<Box<dyn I2cPeripheral + 'a>>>,
}

impl<'a> SimI2cBus<'a> {
    pub fn new() -> Self {
        Self {
            peripherals: Mutex::new(Vec::new()),
        }
    }

    /// Attaches a peripheral to the bus.
    ///
    /// # Errors
    /// - `GpioError::AlreadyInUse` if another peripheral already answers the same address.
    /// - `GpioError::InvalidArgument` if the address doesn't fit in 7 bits.
    pub fn attach(&self, peripheral: Box<dyn I2cPeripheral + 'a>) -> GpioResult<()> {
        let address = peripheral.address();
        if address > 0x7F {
            return Err(GpioError::InvalidArgument);
        }
        let mut peripherals = self.peripherals()?;
        if peripherals.iter().any(|p| p.address() == address) {
            return Err(GpioError::AlreadyInUse);
        }
        peripherals.push(peripheral);
        Ok(())
    }

    pub fn addresses(&self) -> GpioResult<Vec<u8>> {
        Ok(self.peripherals()?.iter().map(|p| p.address()).collect())
    }

    fn peripherals(&self) -> GpioResult<MutexGuard<'_, Vec<Box<dyn I2cPeripheral + 'a>>>> {
        self.peripherals
            .lock()
            .map_err(|_| GpioError::Other("simulated I2C bus poisoned".to_string()))
    }
}

impl Default for SimI2cBus<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for SimI2cBus<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.addresses() {
            Ok(addresses) => write!(f, "SimI2cBus({:02x?})", addresses),
            Err(_) => write!(f, "SimI2cBus(poisoned)"),
        }
    }
}

impl I2cBus for SimI2cBus<'_> {
    fn write(&self, address: u8, bytes: &[u8]) -> GpioResult<()> {
        let mut peripherals = self.peripherals()?;
        let peripheral = peripherals
            .iter_mut()
            .find(|p| p.address() == address)
            .ok_or(GpioError::Nack(address))?;

        if !peripheral.connect(false) {
            return Err(GpioError::Nack(address));
        }
        trace!("i2c {:#04x} <- {:02x?}", address, bytes);
        let mut result = Ok(());
        for &byte in bytes {
            if !peripheral.write(byte) {
                result = Err(GpioError::Nack(address));
                break;
            }
        }
        peripheral.disconnect();
        result
    }

    fn read(&self, address: u8, buffer: &mut [u8]) -> GpioResult<()> {
        let mut peripherals = self.peripherals()?;
        let peripheral = peripherals
            .iter_mut()
            .find(|p| p.address() == address)
            .ok_or(GpioError::Nack(address))?;

        if !peripheral.connect(true) {
            return Err(GpioError::Nack(address));
        }
        for byte in buffer.iter_mut() {
            *byte = peripheral.read();
        }
        peripheral.disconnect();
        trace!("i2c {:#04x} -> {:02x?}", address, buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stores the last written byte and answers reads with it; refuses 0x00.
    #[derive(Debug)]
    struct Latch {
        address: u8,
        value: u8,
        transactions: usize,
    }

    impl I2cPeripheral for Latch {
        fn address(&self) -> u8 {
            self.address
        }

        fn read(&mut self) -> u8 {
            self.value
        }

        fn write(&mut self, data: u8) -> bool {
            if data == 0 {
                return false;
            }
            self.value = data;
            true
        }

        fn disconnect(&mut self) {
            self.transactions += 1;
        }
    }

    fn latch(address: u8) -> Box<Latch> {
        Box::new(Latch { address, value: 0xFF, transactions: 0 })
    }

    #[test]
    fn routes_by_address() {
        let bus = SimI2cBus::new();
        bus.attach(latch(0x20)).unwrap();
        bus.attach(latch(0x27)).unwrap();

        bus.write(0x20, &[0x12]).unwrap();
        assert_eq!(bus.write_read_byte(0x27, 0x34), Ok(0x34));

        let mut buffer = [0u8; 2];
        bus.read(0x20, &mut buffer).unwrap();
        assert_eq!(buffer, [0x12, 0x12]);
    }

    #[test]
    fn nacks_unknown_address_and_refused_bytes() {
        let bus = SimI2cBus::new();
        bus.attach(latch(0x20)).unwrap();

        assert_eq!(bus.write(0x21, &[1]), Err(GpioError::Nack(0x21)));
        assert_eq!(bus.read(0x21, &mut [0u8]), Err(GpioError::Nack(0x21)));
        assert_eq!(bus.write(0x20, &[5, 0, 6]), Err(GpioError::Nack(0x20)));

        let mut buffer = [0u8];
        bus.read(0x20, &mut buffer).unwrap();
        assert_eq!(buffer, [5]);
    }

    #[test]
    fn rejects_duplicate_and_out_of_range_addresses() {
        let bus = SimI2cBus::new();
        bus.attach(latch(0x20)).unwrap();
        assert_eq!(bus.attach(latch(0x20)), Err(GpioError::AlreadyInUse));
        assert_eq!(bus.attach(latch(0x80)), Err(GpioError::InvalidArgument));
        assert_eq!(bus.addresses(), Ok(vec![0x20]));
    }
}
