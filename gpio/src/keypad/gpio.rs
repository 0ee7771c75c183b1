use std::fmt::{Debug, Formatter};
use crate::{GpioBusInput, GpioBusOutput, GpioResult};
use crate::keypad::{KeyMap, Keypad, KeypadReading, ScanMatrix};

/// Represents the keys on a 4x4 keypad, named after their default symbols.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeypadKey {
    /// The `1` key.
    Key1,
    /// The `2` key.
    Key2,
    /// The `3` key.
    Key3,
    /// The `4` key.
    Key4,
    /// The `5` key.
    Key5,
    /// The `6` key.
    Key6,
    /// The `7` key.
    Key7,
    /// The `8` key.
    Key8,
    /// The `9` key.
    Key9,
    /// The `0` key.
    Key0,
    /// The `*` key.
    KeyAsterisk,
    /// The `#` key.
    KeyHash,
    /// The `A` key.
    KeyA,
    /// The `B` key.
    KeyB,
    /// The `C` key.
    KeyC,
    /// The `D` key.
    KeyD,
}

impl KeypadKey {
    /// Every key, laid out by (row, column).
    pub const KEYS: [[KeypadKey; 4]; 4] = {
        use KeypadKey::*;
        [
            [ Key1, Key2, Key3, KeyA, ],
            [ Key4, Key5, Key6, KeyB, ],
            [ Key7, Key8, Key9, KeyC, ],
            [ KeyAsterisk, Key0, KeyHash, KeyD, ],
        ]
    };

    /// Converts a position tuple (row, column) to a [KeypadKey].
    pub fn from_position(pos: (u8, u8)) -> Option<KeypadKey> {
        if pos.0 < 4 && pos.1 < 4 {
            Some(Self::KEYS[pos.0 as usize][pos.1 as usize])
        } else {
            None
        }
    }

    /// Gets the (row, column) position of the key.
    pub fn position(self) -> (u8, u8) {
        for (row, keys) in Self::KEYS.iter().enumerate() {
            if let Some(col) = keys.iter().position(|&k| k == self) {
                return (row as u8, col as u8);
            }
        }
        unreachable!("every key is in the layout")
    }

    /// Parses the default symbol of a key.
    pub fn from_char(c: char) -> Option<KeypadKey> {
        Self::KEYS
            .iter()
            .flatten()
            .copied()
            .find(|key| key.to_char() == c.to_ascii_uppercase())
    }

    /// Converts the [KeypadKey] to its corresponding character.
    pub fn to_char(self) -> char {
        use KeypadKey::*;

        match self {
            Key1 => '1',
            Key2 => '2',
            Key3 => '3',
            Key4 => '4',
            Key5 => '5',
            Key6 => '6',
            Key7 => '7',
            Key8 => '8',
            Key9 => '9',
            Key0 => '0',
            KeyAsterisk => '*',
            KeyHash => '#',
            KeyA => 'A',
            KeyB => 'B',
            KeyC => 'C',
            KeyD => 'D',
        }
    }
}

/// A keypad wired straight to GPIO pins: 4 column outputs and 4 row inputs.
///
/// The columns should be open-drain and active-low, the rows pulled up and active-low, so a key
/// reads as active exactly when its column is being strobed.
pub struct GpioKeypad<'a> {
    cols: Box<dyn GpioBusOutput<4> + 'a>,
    rows: Box<dyn GpioBusInput<4> + 'a>,
    key_map: KeyMap,
}

impl Debug for GpioKeypad<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpioKeypad({:?}, {:?})", self.cols, self.rows)
    }
}

impl <'a> GpioKeypad<'a> {
    /// Creates a new `GpioKeypad` instance with the specified GPIO bus outputs for columns and inputs for rows.
    ///
    /// The columns are used to write the active state, and the rows are used to read the pressed keys
    /// in the active column.
    pub fn new(
        cols: Box<dyn GpioBusOutput<4> + 'a>,
        rows: Box<dyn GpioBusInput<4> + 'a>,
    ) -> Self {
        GpioKeypad { cols, rows, key_map: KeyMap::default() }
    }

    pub fn with_key_map(mut self, key_map: KeyMap) -> Self {
        self.key_map = key_map;
        self
    }
}

impl Keypad for GpioKeypad<'_> {
    fn read_key(&self) -> GpioResult<KeypadReading> {
        let matrix = ScanMatrix::scan(&*self.cols, &*self.rows)?;

        let mut pressed = matrix.pressed();
        let reading = match (pressed.next(), pressed.next()) {
            (None, _) => KeypadReading::NoKey,
            (Some((row, col)), None) => self
                .key_map
                .symbol_at(row, col)
                .map_or(KeypadReading::Fail, KeypadReading::Key),
            (Some(_), Some(_)) => KeypadReading::Fail,
        };
        Ok(reading)
    }
}
