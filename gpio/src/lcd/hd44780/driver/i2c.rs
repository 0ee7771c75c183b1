use crate::i2c::I2cBus;
use crate::lcd::hd44780::driver::{CursorDirection, HD44780Driver};
use crate::lcd::hd44780::{LCD_BACKPACK_ADDRESS, PORT_BACKLIGHT, PORT_E, PORT_RS};
use crate::GpioResult;
use log::trace;

/// HD44780 driven in 4-bit mode through a PCF8574 backpack.
///
/// Every nibble is one bus write of two port bytes: E high with the data, then E low, so the
/// controller latches on the falling edge. RW is held low; the display is never read back.
#[derive(Debug)]
pub struct I2cHD44780Driver<'a> {
    bus: &'a dyn I2cBus,
    address: u8,
    backlight: bool,
}

impl<'a> I2cHD44780Driver<'a> {
    pub fn new(bus: &'a dyn I2cBus) -> Self {
        Self {
            bus,
            address: LCD_BACKPACK_ADDRESS,
            backlight: false,
        }
    }

    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    fn port_bits(&self, nibble: u8, rs: bool) -> u8 {
        let mut bits = (nibble & 0x0F) << 4;
        if rs {
            bits |= PORT_RS;
        }
        if self.backlight {
            bits |= PORT_BACKLIGHT;
        }
        bits
    }

    fn write_nibble(&self, nibble: u8, rs: bool) -> GpioResult<()> {
        let bits = self.port_bits(nibble, rs);
        self.bus.write(self.address, &[bits | PORT_E, bits])
    }

    fn send(&mut self, data: u8, rs: bool) -> GpioResult<()> {
        trace!("Sending data: {:08b}, RS: {}", data, rs);
        self.write_nibble(data >> 4, rs)?;
        self.write_nibble(data & 0x0F, rs)
    }
}

impl HD44780Driver for I2cHD44780Driver<'_> {
    fn init(&mut self, multiline: bool, alt_font: bool) -> GpioResult<()> {
        // Synchronize from any state into 4-bit mode.
        for nibble in [0b0011, 0b0011, 0b0011, 0b0010] {
            self.write_nibble(nibble, false)?;
        }
        self.function_set(false, multiline, alt_font)?;
        self.set_display_control(true, false, false)?;
        self.clear_display()?;
        self.set_entry_mode(CursorDirection::Right, false)?;
        Ok(())
    }

    fn set_backlight(&mut self, on: bool) -> GpioResult<()> {
        self.backlight = on;
        let bits = self.port_bits(0, false);
        self.bus.write(self.address, &[bits])
    }

    fn send_command(&mut self, command: u8) -> GpioResult<()> {
        self.send(command, false)
    }

    fn send_data(&mut self, data: u8) -> GpioResult<()> {
        self.send(data, true)
    }
}
