//! Character LCDs.

pub mod hd44780;
