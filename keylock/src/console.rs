//! Line-based stand-in for the keypad and the wireless client.
//!
//! Plain characters are typed on the simulated keypad; lines starting with `:` are commands.
//! `:wait <ms>` pauses the script, so a piped session can give the lock time to react.

use crate::app::App;
use crate::mirror::Characteristic;
use keylock_gpio::keypad::KeyMap;
use keylock_gpio::lcd::hd44780::SimLcdHandle;
use keylock_gpio::sim::SimKeyMatrix;
use log::{info, warn};
use std::io::{BufRead, Write};
use std::time::Duration;

pub struct Console<'a, 'b> {
    app: &'a App<'b>,
    matrix: &'a SimKeyMatrix,
    key_map: KeyMap,
    lcd: SimLcdHandle,
}

impl<'a, 'b> Console<'a, 'b> {
    pub fn new(app: &'a App<'b>, matrix: &'a SimKeyMatrix, key_map: KeyMap, lcd: SimLcdHandle) -> Self {
        Self {
            app,
            matrix,
            key_map,
            lcd,
        }
    }

    /// Handles lines until `:quit` or the end of `input`, then shuts the app down.
    pub fn run(&self, input: impl BufRead, mut out: impl Write) {
        info!("Console ready.");
        for line in input.lines() {
            let keep_going = line.and_then(|line| self.handle_line(line.trim(), &mut out));
            match keep_going {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!("Console I/O failed: {}", e);
                    break;
                }
            }
        }
        info!("Console closed, shutting down.");
        self.app.shutdown();
    }

    /// Handles a single line. Returns whether to keep reading.
    pub fn handle_line(&self, line: &str, out: &mut impl Write) -> std::io::Result<bool> {
        let Some(command) = line.strip_prefix(':') else {
            self.type_keys(line);
            return Ok(true);
        };

        let (name, arg) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(name, arg)| (name, arg.trim()));
        match name {
            "password" => self.write(Characteristic::Password, arg, out)?,
            "username" => self.write(Characteristic::Username, arg, out)?,
            "connect" => self.app.mirror().on_connect(),
            "disconnect" => self.app.mirror().on_disconnect(),
            "status" => self.print_status(out)?,
            "wait" => match arg.parse() {
                Ok(millis) => self.app.wait(Duration::from_millis(millis)),
                Err(_) => writeln!(out, "usage: :wait <milliseconds>")?,
            },
            "quit" => return Ok(false),
            _ => writeln!(
                out,
                "unknown command :{} (try :password, :username, :connect, :disconnect, :status, :wait, :quit)",
                name
            )?,
        }
        Ok(true)
    }

    fn write(&self, characteristic: Characteristic, value: &str, out: &mut impl Write) -> std::io::Result<()> {
        if let Err(e) = self.app.mirror().write(characteristic, value) {
            writeln!(out, "{}", e)?;
        }
        Ok(())
    }

    fn type_keys(&self, keys: &str) {
        let press = self.app.timing().key_press();
        for symbol in keys.chars().filter(|c| !c.is_whitespace()) {
            let Some((row, col)) = self.key_map.position_of(symbol) else {
                warn!("No key for {:?}.", symbol);
                continue;
            };
            if let Err(e) = self.matrix.press(row, col) {
                warn!("Couldn't press {:?}: {}", symbol, e);
                continue;
            }
            self.app.wait(press);
            if let Err(e) = self.matrix.release(row, col) {
                warn!("Couldn't release {:?}: {}", symbol, e);
            }
            self.app.wait(press);
        }
    }

    fn print_status(&self, out: &mut impl Write) -> std::io::Result<()> {
        let mirror = self.app.mirror();
        writeln!(out, "state:       {} (pending: {:?})", self.app.state(), self.app.pending())?;
        for (row, line) in self.lcd.lines().iter().enumerate() {
            writeln!(out, "lcd[{}]:      |{}|", row, line)?;
        }
        for characteristic in Characteristic::ALL {
            let value = mirror
                .read(characteristic)
                .unwrap_or_else(|e| e.to_string());
            writeln!(
                out,
                "{:<12} {:?} ({})",
                format!("{}:", characteristic),
                value,
                characteristic.uuid(mirror.service())
            )?;
        }
        writeln!(out, "advertising: {} start(s)", mirror.advertising_starts())?;
        for entry in mirror.audit_log() {
            writeln!(out, "audit:       {}", entry)?;
        }
        Ok(())
    }
}
