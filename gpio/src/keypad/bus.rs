use crate::i2c::I2cBus;
use crate::keypad::{
    KeyMap, Keypad, KeypadReading, COLUMN_SELECT, IDLE_RESPONSE, KEYPAD_CHIP_ADDRESS,
};
use crate::GpioResult;
use std::fmt::{Debug, Formatter};

/// Selector value that makes the chip answer the row code.
pub const ROW_SELECT: u8 = 0x0F;

/// Decodes keys from a keypad-scanner chip on an I2C bus.
///
/// Two transactions per poll: select and read the column code, then select and read the row
/// code. Each code must name exactly one line, anything else (including the chip's idle `0xFF`
/// answer) decodes as [KeypadReading::Fail].
pub struct BusKeypad<'a> {
    bus: &'a dyn I2cBus,
    address: u8,
    key_map: KeyMap,
}

impl<'a> BusKeypad<'a> {
    pub fn new(bus: &'a dyn I2cBus) -> Self {
        Self {
            bus,
            address: KEYPAD_CHIP_ADDRESS,
            key_map: KeyMap::default(),
        }
    }

    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn with_key_map(mut self, key_map: KeyMap) -> Self {
        self.key_map = key_map;
        self
    }

    /// Replaces the key map used for the following reads.
    pub fn load_key_map(&mut self, key_map: KeyMap) {
        self.key_map = key_map;
    }

    pub fn key_map(&self) -> &KeyMap {
        &self.key_map
    }

    /// Checks whether the chip reports any key at all, chords included.
    pub fn is_pressed(&self) -> GpioResult<bool> {
        let cols = self.bus.write_read_byte(self.address, COLUMN_SELECT)?;
        Ok(!is_idle_code(cols))
    }
}

/// Whether a column code says nothing is held: the chip's idle answer, or no column pulled low.
fn is_idle_code(cols: u8) -> bool {
    cols == IDLE_RESPONSE || cols == COLUMN_SELECT
}

/// Maps a code to the single line it names.
///
/// `idle` is the value of a code with no line pulled low.
fn decode_line(code: u8, idle: u8, shift: u8) -> Result<usize, KeypadReading> {
    if code == idle {
        return Err(KeypadReading::NoKey);
    }
    [0x0Eu8, 0x0D, 0x0B, 0x07]
        .iter()
        .position(|&nibble| nibble << shift == code)
        .ok_or(KeypadReading::Fail)
}

impl Debug for BusKeypad<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "BusKeypad({:?} @ {:#04x})", self.bus, self.address)
    }
}

impl Keypad for BusKeypad<'_> {
    fn read_key(&self) -> GpioResult<KeypadReading> {
        let cols = self.bus.write_read_byte(self.address, COLUMN_SELECT)?;
        let col = match decode_line(cols, COLUMN_SELECT, 4) {
            Ok(col) => col,
            Err(reading) => return Ok(reading),
        };

        let rows = self.bus.write_read_byte(self.address, ROW_SELECT)?;
        let row = match decode_line(rows, ROW_SELECT, 0) {
            Ok(row) => row,
            Err(reading) => return Ok(reading),
        };

        Ok(self
            .key_map
            .symbol_at(row, col)
            .map_or(KeypadReading::Fail, KeypadReading::Key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_lines() {
        assert_eq!(decode_line(0xE0, COLUMN_SELECT, 4), Ok(0));
        assert_eq!(decode_line(0x70, COLUMN_SELECT, 4), Ok(3));
        assert_eq!(decode_line(0x0B, ROW_SELECT, 0), Ok(2));
    }

    #[test]
    fn idle_codes() {
        assert!(is_idle_code(IDLE_RESPONSE));
        assert!(is_idle_code(COLUMN_SELECT));
        assert!(!is_idle_code(0xE0));
        assert!(!is_idle_code(0x50));
    }

    #[test]
    fn idle_and_garbage_codes() {
        assert_eq!(decode_line(0xF0, COLUMN_SELECT, 4), Err(KeypadReading::NoKey));
        assert_eq!(decode_line(0x0F, ROW_SELECT, 0), Err(KeypadReading::NoKey));
        assert_eq!(decode_line(0xFF, COLUMN_SELECT, 4), Err(KeypadReading::Fail));
        assert_eq!(decode_line(0x1B, ROW_SELECT, 0), Err(KeypadReading::Fail));
        assert_eq!(decode_line(0x00, COLUMN_SELECT, 4), Err(KeypadReading::Fail));
    }
}
