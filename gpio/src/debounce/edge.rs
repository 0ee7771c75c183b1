use crate::keypad::{Keypad, KeypadReading};
use log::trace;

/// Turns polled keypad readings into key-press events.
///
/// A key fires once when it first shows up and stays silent while it's held. Any "no key" or
/// "fail" reading counts as a release, after which the same key fires again. Switching straight
/// from one key to another fires the new key without waiting for a release.
#[derive(Copy, Clone, Debug, Default)]
pub struct EdgeDebounce {
    last_reported: Option<char>,
}

impl EdgeDebounce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one reading, returning the key if this reading is a new press.
    pub fn feed(&mut self, reading: KeypadReading) -> Option<char> {
        match reading.key() {
            None => {
                self.last_reported = None;
                None
            }
            Some(key) if self.last_reported == Some(key) => None,
            Some(key) => {
                trace!("Key {:?} pressed", key);
                self.last_reported = Some(key);
                Some(key)
            }
        }
    }

    /// Polls `keypad` once and feeds the reading.
    pub fn poll(&mut self, keypad: &dyn Keypad) -> Option<char> {
        self.feed(keypad.poll())
    }

    /// The key reported last, if it hasn't been released since.
    pub fn held(&self) -> Option<char> {
        self.last_reported
    }
}
