//! HD44780 LCD module.
//!
//! The display is driven through a PCF8574 I/O expander ("backpack") on the I2C bus, which
//! exposes the controller's 4-bit interface as one port byte:
//!
//! | bit | 7..4    | 3         | 2 | 1  | 0  |
//! |-----|---------|-----------|---|----|----|
//! |     | D7..D4  | backlight | E | RW | RS |
//!
//! [driver::I2cHD44780Driver] is the master side, [SimHD44780] emulates the display behind it.

pub mod driver;
mod sim;

pub use sim::*;

pub(crate) const PORT_RS: u8 = 0b0000_0001;
pub(crate) const PORT_RW: u8 = 0b0000_0010;
pub(crate) const PORT_E: u8 = 0b0000_0100;
pub(crate) const PORT_BACKLIGHT: u8 = 0b0000_1000;

/// Address of the usual PCF8574 backpack with all address jumpers open.
pub const LCD_BACKPACK_ADDRESS: u8 = 0x27;

/// Number of visible columns of a 16x2 display.
pub const LCD_COLUMNS: usize = 16;
/// Number of visible rows of a 16x2 display.
pub const LCD_ROWS: usize = 2;
/// DDRAM address of the first character of every row.
pub const LCD_ROW_OFFSETS: [u8; LCD_ROWS] = [0x00, 0x40];
