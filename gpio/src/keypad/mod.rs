//! 4x4 matrix keypads: the matrix scan, the bus peripheral that exposes it as scan codes, and the
//! host-side decoders turning either into a single character per poll.

mod gpio;
mod matrix;
mod chip;
mod bus;

use log::warn;
use std::fmt::{Debug, Display, Formatter};
use thiserror::Error;
use crate::GpioResult;
pub use gpio::*;
pub use matrix::*;
pub use chip::*;
pub use bus::*;

/// What a single poll of a keypad saw.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeypadReading {
    /// Exactly one key is held; carries its symbol from the [KeyMap].
    Key(char),
    /// Nothing is held.
    NoKey,
    /// The scan couldn't be resolved to a single key (several keys, bus trouble, floating lines).
    Fail,
}

impl KeypadReading {
    /// The key symbol, or `None` for both sentinels.
    pub fn key(self) -> Option<char> {
        match self {
            KeypadReading::Key(c) => Some(c),
            _ => None,
        }
    }
}

/// The `Keypad` trait defines the interface for polled keypad decoders.
///
/// Decoders never block and never debounce: a key held across several polls is reported on
/// every one of them.
pub trait Keypad: Debug {
    fn read_key(&self) -> GpioResult<KeypadReading>;

    /// Reads the keypad, reporting any error as [KeypadReading::Fail].
    fn poll(&self) -> KeypadReading {
        match self.read_key() {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Keypad read failed: {}", e);
                KeypadReading::Fail
            }
        }
    }
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum KeyMapError {
    #[error("key map must have exactly {expected} symbols, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("symbol {0:?} is used both as a key and as a sentinel")]
    AmbiguousSentinel(char),
}

/// Maps key indices (`row * 4 + column`) to symbols.
///
/// Written as one string of 18 symbols: the 16 keys row by row, then the symbols reported for
/// "no key" and for "fail".
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct KeyMap {
    symbols: [char; KeyMap::LEN],
}

impl KeyMap {
    pub const LEN: usize = 18;
    pub const DEFAULT_LAYOUT: &'static str = "123A456B789C*0#DNF";

    pub fn parse(layout: &str) -> Result<Self, KeyMapError> {
        let chars: Vec<char> = layout.chars().collect();
        let symbols: [char; Self::LEN] = chars.as_slice().try_into().map_err(|_| {
            KeyMapError::WrongLength { expected: Self::LEN, actual: chars.len() }
        })?;

        for sentinel in [symbols[16], symbols[17]] {
            if symbols[..16].contains(&sentinel) {
                return Err(KeyMapError::AmbiguousSentinel(sentinel));
            }
        }

        Ok(Self { symbols })
    }

    /// Gets the symbol of the key at `index` (`row * 4 + column`).
    pub fn symbol(&self, index: usize) -> Option<char> {
        self.symbols[..16].get(index).copied()
    }

    pub fn symbol_at(&self, row: usize, col: usize) -> Option<char> {
        if row < 4 && col < 4 {
            self.symbol(row * 4 + col)
        } else {
            None
        }
    }

    /// Finds the (row, column) position of a key symbol.
    pub fn position_of(&self, symbol: char) -> Option<(usize, usize)> {
        self.symbols[..16]
            .iter()
            .position(|&s| s == symbol)
            .map(|index| (index / 4, index % 4))
    }

    pub fn no_key_symbol(&self) -> char {
        self.symbols[16]
    }

    pub fn fail_symbol(&self) -> char {
        self.symbols[17]
    }

    /// Renders a reading as one character, using the sentinel symbols for "no key" and "fail".
    pub fn char_of(&self, reading: KeypadReading) -> char {
        match reading {
            KeypadReading::Key(c) => c,
            KeypadReading::NoKey => self.no_key_symbol(),
            KeypadReading::Fail => self.fail_symbol(),
        }
    }
}

impl Default for KeyMap {
    fn default() -> Self {
        let mut symbols = ['\0'; Self::LEN];
        for (slot, c) in symbols.iter_mut().zip(Self::DEFAULT_LAYOUT.chars()) {
            *slot = c;
        }
        Self { symbols }
    }
}

impl Debug for KeyMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyMap({:?})", self.to_string())
    }
}

impl Display for KeyMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for c in self.symbols {
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_round_trips() {
        let map = KeyMap::default();
        assert_eq!(map.to_string(), KeyMap::DEFAULT_LAYOUT);
        assert_eq!(KeyMap::parse(KeyMap::DEFAULT_LAYOUT), Ok(map));
        assert_eq!(map.symbol_at(0, 3), Some('A'));
        assert_eq!(map.symbol_at(3, 0), Some('*'));
        assert_eq!(map.symbol_at(3, 2), Some('#'));
        assert_eq!(map.symbol(16), None);
        assert_eq!(map.position_of('0'), Some((3, 1)));
        assert_eq!(map.position_of('N'), None);
    }

    #[test]
    fn sentinels_render_as_chars() {
        let map = KeyMap::default();
        assert_eq!(map.char_of(KeypadReading::NoKey), 'N');
        assert_eq!(map.char_of(KeypadReading::Fail), 'F');
        assert_eq!(map.char_of(KeypadReading::Key('7')), '7');
    }

    #[test]
    fn only_keys_carry_a_symbol() {
        assert_eq!(KeypadReading::Key('#').key(), Some('#'));
        assert_eq!(KeypadReading::NoKey.key(), None);
        assert_eq!(KeypadReading::Fail.key(), None);
    }

    #[test]
    fn rejects_bad_layouts() {
        assert_eq!(
            KeyMap::parse("123"),
            Err(KeyMapError::WrongLength { expected: 18, actual: 3 })
        );
        assert_eq!(
            KeyMap::parse("123A456B789C*0#D1F"),
            Err(KeyMapError::AmbiguousSentinel('1'))
        );
    }
}
