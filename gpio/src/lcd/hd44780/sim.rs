use crate::i2c::I2cPeripheral;
use crate::lcd::hd44780::{
    LCD_BACKPACK_ADDRESS, LCD_COLUMNS, LCD_ROWS, LCD_ROW_OFFSETS, PORT_BACKLIGHT, PORT_E, PORT_RS,
    PORT_RW,
};
use log::trace;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex};

const DDRAM_SIZE: usize = 0x80;

#[derive(Clone, Debug)]
struct LcdState {
    ddram: [u8; DDRAM_SIZE],
    address: u8,
    increment: bool,
    display_on: bool,
    two_lines: bool,
    backlight: bool,
}

impl Default for LcdState {
    fn default() -> Self {
        Self {
            ddram: [b' '; DDRAM_SIZE],
            address: 0,
            increment: true,
            display_on: false,
            two_lines: false,
            backlight: false,
        }
    }
}

impl LcdState {
    fn step_address(&mut self, forward: bool) {
        self.address = if forward {
            self.address.wrapping_add(1)
        } else {
            self.address.wrapping_sub(1)
        } & 0x7F;
    }
}

/// An HD44780 display behind a PCF8574 backpack, as seen from the I2C bus.
///
/// Decodes the port writes into controller instructions and keeps the display RAM. The visible
/// text is read through a [SimLcdHandle].
pub struct SimHD44780 {
    address: u8,
    port: u8,
    four_bit: bool,
    high_nibble: Option<u8>,
    state: Arc<Mutex<LcdState>>,
}

impl SimHD44780 {
    /// Creates a powered-up display: 8-bit interface, display off, RAM full of spaces.
    pub fn new() -> Self {
        Self {
            address: LCD_BACKPACK_ADDRESS,
            port: 0,
            four_bit: false,
            high_nibble: None,
            state: Arc::new(Mutex::new(LcdState::default())),
        }
    }

    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Gets a handle to read the display contents after the display has been attached to a bus.
    pub fn handle(&self) -> SimLcdHandle {
        SimLcdHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn latch(&mut self, port: u8) {
        if port & PORT_RW != 0 {
            // Read cycles have nothing to latch.
            return;
        }
        let nibble = port >> 4;
        let rs = port & PORT_RS != 0;

        if !self.four_bit {
            self.execute(nibble << 4, rs);
        } else if let Some(high) = self.high_nibble.take() {
            self.execute(high << 4 | nibble, rs);
        } else {
            self.high_nibble = Some(nibble);
        }
    }

    fn execute(&mut self, byte: u8, rs: bool) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        if rs {
            trace!("LCD data {:#04x} @ {:#04x}", byte, state.address);
            let address = state.address as usize;
            state.ddram[address] = byte;
            let increment = state.increment;
            state.step_address(increment);
            return;
        }

        trace!("LCD command {:08b}", byte);
        match byte.leading_zeros() {
            0 => state.address = byte & 0x7F,
            1 => {
                // CGRAM isn't modelled.
            }
            2 => {
                self.four_bit = byte & 0b0001_0000 == 0;
                self.high_nibble = None;
                state.two_lines = byte & 0b0000_1000 != 0;
            }
            3 => {
                let display_shift = byte & 0b0000_1000 != 0;
                if !display_shift {
                    state.step_address(byte & 0b0000_0100 != 0);
                }
            }
            4 => state.display_on = byte & 0b0000_0100 != 0,
            5 => state.increment = byte & 0b0000_0010 != 0,
            6 => state.address = 0,
            7 => {
                state.ddram = [b' '; DDRAM_SIZE];
                state.address = 0;
                state.increment = true;
            }
            _ => {}
        }
    }
}

impl Default for SimHD44780 {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for SimHD44780 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimHD44780({:#04x})", self.address)
    }
}

impl I2cPeripheral for SimHD44780 {
    fn address(&self) -> u8 {
        self.address
    }

    fn read(&mut self) -> u8 {
        self.port
    }

    fn write(&mut self, data: u8) -> bool {
        if let Ok(mut state) = self.state.lock() {
            state.backlight = data & PORT_BACKLIGHT != 0;
        }
        let falling_edge = self.port & PORT_E != 0 && data & PORT_E == 0;
        let latched = self.port;
        self.port = data;
        if falling_edge {
            self.latch(latched);
        }
        true
    }
}

/// Read access to what a [SimHD44780] currently shows.
#[derive(Clone, Debug)]
pub struct SimLcdHandle {
    state: Arc<Mutex<LcdState>>,
}

impl SimLcdHandle {
    /// Gets the visible text of a row, always [LCD_COLUMNS] characters long.
    ///
    /// Returns an empty string for rows past the bottom of the display or while the display is
    /// switched off.
    pub fn line(&self, row: usize) -> String {
        let Ok(state) = self.state.lock() else {
            return String::new();
        };
        if row >= LCD_ROWS || !state.display_on {
            return String::new();
        }
        let start = LCD_ROW_OFFSETS[row] as usize;
        state.ddram[start..start + LCD_COLUMNS]
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
            .collect()
    }

    pub fn lines(&self) -> [String; LCD_ROWS] {
        [self.line(0), self.line(1)]
    }

    pub fn backlight(&self) -> bool {
        self.state.lock().map(|s| s.backlight).unwrap_or(false)
    }

    pub fn display_on(&self) -> bool {
        self.state.lock().map(|s| s.display_on).unwrap_or(false)
    }

    pub fn two_lines(&self) -> bool {
        self.state.lock().map(|s| s.two_lines).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2c::SimI2cBus;
    use crate::lcd::hd44780::driver::{HD44780Driver, I2cHD44780Driver};

    fn setup() -> (SimI2cBus<'static>, SimLcdHandle) {
        let bus = SimI2cBus::new();
        let lcd = SimHD44780::new();
        let handle = lcd.handle();
        bus.attach(Box::new(lcd)).unwrap();
        (bus, handle)
    }

    fn print(driver: &mut dyn HD44780Driver, text: &str) {
        for b in text.bytes() {
            driver.send_data(b).unwrap();
        }
    }

    #[test]
    fn init_switches_to_four_bit_and_clears() {
        let (bus, handle) = setup();
        let mut driver = I2cHD44780Driver::new(&bus);
        driver.init(true, false).unwrap();
        driver.set_backlight(true).unwrap();

        assert!(handle.display_on());
        assert!(handle.two_lines());
        assert!(handle.backlight());
        assert_eq!(handle.line(0), " ".repeat(16));
    }

    #[test]
    fn writes_text_on_both_rows() {
        let (bus, handle) = setup();
        let mut driver = I2cHD44780Driver::new(&bus);
        driver.init(true, false).unwrap();

        print(&mut driver, "Enter password:");
        driver.set_ddram_address(0x40 + 6).unwrap();
        print(&mut driver, "12");

        assert_eq!(handle.line(0), "Enter password: ");
        assert_eq!(handle.line(1), "      12        ");
        assert_eq!(handle.line(2), "");

        driver.clear_display().unwrap();
        assert_eq!(handle.lines(), [" ".repeat(16), " ".repeat(16)]);
    }

    #[test]
    fn reinit_resynchronizes_from_four_bit_mode() {
        let (bus, handle) = setup();
        let mut driver = I2cHD44780Driver::new(&bus);
        driver.init(true, false).unwrap();
        print(&mut driver, "x");
        driver.init(true, false).unwrap();
        print(&mut driver, "ok");
        assert_eq!(handle.line(0), "ok              ");
    }

    #[test]
    fn backlight_follows_every_port_write() {
        let (bus, handle) = setup();
        let mut driver = I2cHD44780Driver::new(&bus);
        driver.init(true, false).unwrap();
        assert!(!handle.backlight());
        driver.set_backlight(true).unwrap();
        print(&mut driver, "a");
        assert!(handle.backlight());
        driver.set_backlight(false).unwrap();
        assert!(!handle.backlight());
    }
}
