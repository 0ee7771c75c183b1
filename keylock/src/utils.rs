use keylock_gpio::lcd::hd44780::driver::HD44780Driver;
use keylock_gpio::lcd::hd44780::{LCD_COLUMNS, LCD_ROWS, LCD_ROW_OFFSETS};
use keylock_gpio::{GpioError, GpioResult};
use log::warn;
use std::ops::RangeBounds;

pub trait WithinExt {
    fn within(&self, range: impl RangeBounds<Self>) -> bool;
}

impl <T: PartialOrd<T>> WithinExt for T {
    fn within(&self, range: impl RangeBounds<Self>) -> bool {
        range.contains(&self)
    }
}

pub trait DisplayExt {
    fn print(&mut self, s: &str) -> GpioResult<()>;
    fn set_cursor(&mut self, row: usize, col: usize) -> GpioResult<()>;

    /// Prints `s` from the start of `row`, cut to the width of the display.
    fn print_line(&mut self, row: usize, s: &str) -> GpioResult<()> {
        self.set_cursor(row, 0)?;
        let end = s
            .char_indices()
            .nth(LCD_COLUMNS)
            .map_or(s.len(), |(i, _)| i);
        self.print(&s[..end])
    }
}

impl <T: ?Sized + HD44780Driver> DisplayExt for T {
    fn print(&mut self, s: &str) -> GpioResult<()> {
        for c in s.chars() {
            if c.is_ascii() {
                self.send_data(c as u8)?;
            } else {
                warn!("Non-ASCII character: {}", c);
                self.send_data(b'?')?
            }
        }
        Ok(())
    }

    fn set_cursor(&mut self, row: usize, col: usize) -> GpioResult<()> {
        if !row.within(0..LCD_ROWS) || !col.within(0..LCD_COLUMNS) {
            return Err(GpioError::InvalidArgument);
        }
        self.set_ddram_address(LCD_ROW_OFFSETS[row] + col as u8)
    }
}

/// Pads `s` with `(16 - len) / 2` spaces on both sides.
pub fn centered(s: &str) -> String {
    let padding = " ".repeat(LCD_COLUMNS.saturating_sub(s.chars().count()) / 2);
    format!("{padding}{s}{padding}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centers_like_the_display_expects() {
        assert_eq!(centered(""), " ".repeat(16));
        assert_eq!(centered("12"), "       12       ");
        assert_eq!(centered("123"), "      123      ");
        assert_eq!(centered("0123456789ABCDEFG"), "0123456789ABCDEFG");
    }

    #[test]
    fn within_ranges() {
        assert!(3usize.within(0..4));
        assert!(!4usize.within(0..4));
    }
}
