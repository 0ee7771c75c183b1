//! Emulation of an I2C keypad-scanner chip.
//!
//! The chip owns the 4 column and 4 row lines of a keypad. On every bus read it rescans the whole
//! matrix and answers with one of two codes, picked by the last byte the master wrote:
//!
//! | selector | answer                            |
//! |----------|-----------------------------------|
//! | `0xF0`   | column code (`weight << 4`)       |
//! | other    | row code (`weight`)               |
//!
//! An idle matrix always answers `0xFF`, whatever the selector.

use crate::i2c::I2cPeripheral;
use crate::keypad::{ScanCode, ScanMatrix};
use crate::{GpioBusInput, GpioBusOutput};
use log::{trace, warn};
use std::fmt::{Debug, Formatter};

/// Address the chip answers to unless told otherwise.
pub const KEYPAD_CHIP_ADDRESS: u8 = 0x20;
/// Selector value that makes reads answer the column code.
pub const COLUMN_SELECT: u8 = 0xF0;
/// Answer to any read while no key is held.
pub const IDLE_RESPONSE: u8 = 0xFF;

/// Picks the byte a read answers for a given selector and scan result.
pub fn chip_response(selector: u8, code: ScanCode) -> u8 {
    if code.is_idle() {
        IDLE_RESPONSE
    } else if selector == COLUMN_SELECT {
        code.col
    } else {
        code.row
    }
}

pub struct KeypadChip<'a> {
    address: u8,
    cols: Box<dyn GpioBusOutput<4> + 'a>,
    rows: Box<dyn GpioBusInput<4> + 'a>,
    selector: u8,
}

impl<'a> KeypadChip<'a> {
    /// Creates the chip on top of the column outputs and row inputs it strobes.
    ///
    /// The selector starts at zero, which selects the row code.
    pub fn new(
        cols: Box<dyn GpioBusOutput<4> + 'a>,
        rows: Box<dyn GpioBusInput<4> + 'a>,
    ) -> Self {
        Self {
            address: KEYPAD_CHIP_ADDRESS,
            cols,
            rows,
            selector: 0,
        }
    }

    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn selector(&self) -> u8 {
        self.selector
    }

    /// Scans the matrix and computes the code of this very moment.
    pub fn scan(&self) -> Option<ScanCode> {
        match ScanMatrix::scan(&*self.cols, &*self.rows) {
            Ok(matrix) => Some(matrix.scan_code()),
            Err(e) => {
                warn!("Keypad chip scan failed: {}", e);
                None
            }
        }
    }
}

impl Debug for KeypadChip<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "KeypadChip({:#04x}, selector {:#04x}, {:?}, {:?})",
            self.address, self.selector, self.cols, self.rows
        )
    }
}

impl I2cPeripheral for KeypadChip<'_> {
    fn address(&self) -> u8 {
        self.address
    }

    fn read(&mut self) -> u8 {
        let response = match self.scan() {
            Some(code) => chip_response(self.selector, code),
            None => IDLE_RESPONSE,
        };
        trace!("Keypad chip answers {:#04x} (selector {:#04x})", response, self.selector);
        response
    }

    fn write(&mut self, data: u8) -> bool {
        self.selector = data;
        true
    }
}
