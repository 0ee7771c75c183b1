//! Simulated GPIO board.
//!
//! Every pin of the board is either an input or an output, optionally with a pull resistor.
//! Pins can be joined by switches; the level of a pin is resolved over the whole net of pins
//! connected to it through closed switches:
//!
//! 1. any pin driving the net low pulls it low,
//! 2. otherwise any pin driving it high pulls it high,
//! 3. otherwise a pull-down with no pull-up in the net pulls it low,
//! 4. otherwise the net reads high (pull-up or floating).
//!
//! Mechanical keypads are modelled with [SimKeyMatrix], which puts one switch on every
//! row/column crossing.

use crate::keypad::KeypadKey;
use crate::{
    GpioActiveLevel, GpioBias, GpioBus, GpioBusInput, GpioBusOutput, GpioDriveMode, GpioDriver,
    GpioError, GpioInput, GpioOutput, GpioPin, GpioResult,
};
use bitvec::vec::BitVec;
use log::trace;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

/// What a pin is currently doing with the net it's attached to.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
enum PinDrive {
    #[default]
    Input,
    /// Output stage; `None` when the drive mode leaves the pin floating.
    Output(Option<bool>),
}

#[derive(Copy, Clone, Debug, Default)]
struct PinState {
    drive: PinDrive,
    bias: GpioBias,
}

#[derive(Copy, Clone, Debug)]
struct Switch {
    a: usize,
    b: usize,
    closed: bool,
}

#[derive(Debug)]
struct Wiring {
    pins: Vec<PinState>,
    used: BitVec,
    switches: Vec<Switch>,
}

impl Wiring {
    fn net_of(&self, pin: usize) -> Vec<usize> {
        let mut net = vec![pin];
        let mut i = 0;
        while i < net.len() {
            let current = net[i];
            for switch in self.switches.iter().filter(|s| s.closed) {
                let other = if switch.a == current {
                    switch.b
                } else if switch.b == current {
                    switch.a
                } else {
                    continue;
                };
                if !net.contains(&other) {
                    net.push(other);
                }
            }
            i += 1;
        }
        net
    }

    fn level(&self, pin: usize) -> bool {
        let mut driven_high = false;
        let mut pull_up = false;
        let mut pull_down = false;

        for index in self.net_of(pin) {
            let state = self.pins[index];
            match state.drive {
                PinDrive::Output(Some(false)) => return false,
                PinDrive::Output(Some(true)) => driven_high = true,
                _ => {}
            }
            match state.bias {
                GpioBias::PullUp => pull_up = true,
                GpioBias::PullDown => pull_down = true,
                GpioBias::None => {}
            }
        }

        driven_high || !(pull_down && !pull_up)
    }

    fn check_index(&self, index: usize) -> GpioResult<()> {
        if index >= self.pins.len() {
            return Err(GpioError::InvalidArgument);
        }
        Ok(())
    }
}

/// Identifies a switch added with [SimGpioDriver::add_switch].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SwitchId(usize);

/// A simulated bank of GPIO pins. Cloning the driver gives another handle to the same board.
#[derive(Clone)]
pub struct SimGpioDriver {
    wiring: Arc<Mutex<Wiring>>,
}

impl SimGpioDriver {
    pub fn new(count: usize) -> Self {
        Self {
            wiring: Arc::new(Mutex::new(Wiring {
                pins: vec![PinState::default(); count],
                used: BitVec::repeat(false, count),
                switches: Vec::new(),
            })),
        }
    }

    fn wiring(&self) -> GpioResult<MutexGuard<'_, Wiring>> {
        self.wiring
            .lock()
            .map_err(|_| GpioError::Other("simulated board poisoned".to_string()))
    }

    /// Adds an open switch between two pins.
    pub fn add_switch(&self, a: usize, b: usize) -> GpioResult<SwitchId> {
        let mut wiring = self.wiring()?;
        wiring.check_index(a)?;
        wiring.check_index(b)?;
        wiring.switches.push(Switch { a, b, closed: false });
        Ok(SwitchId(wiring.switches.len() - 1))
    }

    /// Opens or closes a switch.
    pub fn set_switch(&self, id: SwitchId, closed: bool) -> GpioResult<()> {
        let mut wiring = self.wiring()?;
        let switch = wiring.switches.get_mut(id.0).ok_or(GpioError::InvalidArgument)?;
        switch.closed = closed;
        Ok(())
    }

    pub fn is_switch_closed(&self, id: SwitchId) -> GpioResult<bool> {
        let wiring = self.wiring()?;
        wiring
            .switches
            .get(id.0)
            .map(|s| s.closed)
            .ok_or(GpioError::InvalidArgument)
    }

    /// Gets the physical level of a pin, regardless of who owns it.
    pub fn level(&self, index: usize) -> GpioResult<bool> {
        let wiring = self.wiring()?;
        wiring.check_index(index)?;
        Ok(wiring.level(index))
    }

    /// Wires a 4x4 keypad matrix between the given row and column pins.
    pub fn add_key_matrix(&self, rows: [usize; 4], cols: [usize; 4]) -> GpioResult<SimKeyMatrix> {
        let mut switches = [[SwitchId(0); 4]; 4];
        for (row, &row_pin) in rows.iter().enumerate() {
            for (col, &col_pin) in cols.iter().enumerate() {
                switches[row][col] = self.add_switch(row_pin, col_pin)?;
            }
        }
        Ok(SimKeyMatrix {
            driver: self.clone(),
            switches,
        })
    }

    fn claim(&self, indices: &[usize]) -> GpioResult<()> {
        let mut wiring = self.wiring()?;
        for &index in indices {
            wiring.check_index(index)?;
            if wiring.used[index] {
                return Err(GpioError::AlreadyInUse);
            }
        }
        for &index in indices {
            wiring.used.set(index, true);
        }
        Ok(())
    }

    fn unclaim(&self, indices: &[usize]) {
        if let Ok(mut wiring) = self.wiring() {
            for &index in indices {
                wiring.used.set(index, false);
                wiring.pins[index] = PinState::default();
            }
        }
    }

    fn configure(&self, index: usize, drive: PinDrive, bias: GpioBias) -> GpioResult<()> {
        let mut wiring = self.wiring()?;
        wiring.pins[index] = PinState { drive, bias };
        Ok(())
    }

    fn drive(&self, index: usize, drive: Option<bool>) -> GpioResult<()> {
        let mut wiring = self.wiring()?;
        wiring.pins[index].drive = PinDrive::Output(drive);
        Ok(())
    }
}

impl Debug for SimGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.wiring.lock() {
            Ok(wiring) => write!(f, "SimGpioDriver({} pins)", wiring.pins.len()),
            Err(_) => write!(f, "SimGpioDriver(poisoned)"),
        }
    }
}

impl GpioDriver for SimGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.wiring()?.pins.len())
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        self.claim(&[index])?;
        Ok(Box::new(SimPin {
            driver: self,
            index,
            config: PinConfig::default(),
        }))
    }

    fn get_pin_bus<const N: usize>(
        &self,
        indices: [usize; N],
    ) -> GpioResult<Box<dyn GpioBus<N> + '_>> {
        self.claim(&indices)?;
        Ok(Box::new(SimBus {
            driver: self,
            indices,
            config: PinConfig::default(),
        }))
    }
}

/// Per-pin settings shared by single pins and buses.
#[derive(Copy, Clone, Debug, Default)]
struct PinConfig {
    active_level: GpioActiveLevel,
    bias: GpioBias,
    drive_mode: GpioDriveMode,
}

impl PinConfig {
    fn physical_drive(&self, value: bool) -> Option<bool> {
        self.drive_mode.get_state(self.active_level.get_state(value))
    }
}

struct SimPin<'a> {
    driver: &'a SimGpioDriver,
    index: usize,
    config: PinConfig,
}

impl Debug for SimPin<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.index)
    }
}

impl GpioPin for SimPin<'_> {
    fn as_input(&mut self) -> GpioResult<Box<dyn GpioInput + '_>> {
        self.driver.configure(self.index, PinDrive::Input, self.config.bias)?;
        Ok(Box::new(SimInput { pin: self }))
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>> {
        let drive = PinDrive::Output(self.config.physical_drive(false));
        self.driver.configure(self.index, drive, self.config.bias)?;
        Ok(Box::new(SimOutput { pin: self }))
    }

    fn active_level(&self) -> GpioActiveLevel {
        self.config.active_level
    }

    fn set_active_level(&mut self, level: GpioActiveLevel) -> GpioResult<()> {
        self.config.active_level = level;
        Ok(())
    }

    fn bias(&self) -> GpioBias {
        self.config.bias
    }

    fn set_bias(&mut self, bias: GpioBias) -> GpioResult<()> {
        self.config.bias = bias;
        Ok(())
    }

    fn drive_mode(&self) -> GpioDriveMode {
        self.config.drive_mode
    }

    fn set_drive_mode(&mut self, mode: GpioDriveMode) -> GpioResult<()> {
        self.config.drive_mode = mode;
        Ok(())
    }
}

impl Drop for SimPin<'_> {
    fn drop(&mut self) {
        self.driver.unclaim(&[self.index]);
    }
}

struct SimInput<'a> {
    pin: &'a SimPin<'a>,
}

impl Debug for SimInput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[input]", self.pin)
    }
}

impl GpioInput for SimInput<'_> {
    fn read(&self) -> GpioResult<bool> {
        let level = self.pin.driver.level(self.pin.index)?;
        Ok(self.pin.config.active_level.get_state(level))
    }
}

struct SimOutput<'a> {
    pin: &'a SimPin<'a>,
}

impl Debug for SimOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.pin)
    }
}

impl GpioOutput for SimOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        trace!("{:?} <- {}", self.pin, value);
        self.pin
            .driver
            .drive(self.pin.index, self.pin.config.physical_drive(value))
    }
}

struct SimBus<'a, const N: usize> {
    driver: &'a SimGpioDriver,
    indices: [usize; N],
    config: PinConfig,
}

impl<const N: usize> Debug for SimBus<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}", self.driver, self.indices)
    }
}

impl<const N: usize> GpioBus<N> for SimBus<'_, N> {
    fn as_input(&mut self) -> GpioResult<Box<dyn GpioBusInput<N> + '_>> {
        for &index in &self.indices {
            self.driver.configure(index, PinDrive::Input, self.config.bias)?;
        }
        Ok(Box::new(SimBusInput { bus: self }))
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioBusOutput<N> + '_>> {
        let drive = PinDrive::Output(self.config.physical_drive(false));
        for &index in &self.indices {
            self.driver.configure(index, drive, self.config.bias)?;
        }
        Ok(Box::new(SimBusOutput { bus: self }))
    }

    fn active_level(&self) -> GpioActiveLevel {
        self.config.active_level
    }

    fn set_active_level(&mut self, level: GpioActiveLevel) -> GpioResult<()> {
        self.config.active_level = level;
        Ok(())
    }

    fn bias(&self) -> GpioBias {
        self.config.bias
    }

    fn set_bias(&mut self, bias: GpioBias) -> GpioResult<()> {
        self.config.bias = bias;
        Ok(())
    }

    fn drive_mode(&self) -> GpioDriveMode {
        self.config.drive_mode
    }

    fn set_drive_mode(&mut self, mode: GpioDriveMode) -> GpioResult<()> {
        self.config.drive_mode = mode;
        Ok(())
    }
}

impl<const N: usize> Drop for SimBus<'_, N> {
    fn drop(&mut self) {
        self.driver.unclaim(&self.indices);
    }
}

struct SimBusInput<'a, const N: usize> {
    bus: &'a SimBus<'a, N>,
}

impl<const N: usize> Debug for SimBusInput<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[input]", self.bus)
    }
}

impl<const N: usize> GpioBusInput<N> for SimBusInput<'_, N> {
    fn read(&self) -> GpioResult<[bool; N]> {
        let wiring = self.bus.driver.wiring()?;
        let mut values = [false; N];
        for (value, &index) in values.iter_mut().zip(&self.bus.indices) {
            *value = self.bus.config.active_level.get_state(wiring.level(index));
        }
        Ok(values)
    }
}

struct SimBusOutput<'a, const N: usize> {
    bus: &'a SimBus<'a, N>,
}

impl<const N: usize> Debug for SimBusOutput<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.bus)
    }
}

impl<const N: usize> GpioBusOutput<N> for SimBusOutput<'_, N> {
    fn write(&self, values: &[bool; N]) -> GpioResult<()> {
        trace!("{:?} <- {:?}", self.bus, values);
        let mut wiring = self.bus.driver.wiring()?;
        for (&value, &index) in values.iter().zip(&self.bus.indices) {
            wiring.pins[index].drive = PinDrive::Output(self.bus.config.physical_drive(value));
        }
        Ok(())
    }
}

/// The mechanical side of a 4x4 keypad: one switch per row/column crossing.
///
/// Created with [SimGpioDriver::add_key_matrix]. Cloning gives another handle to the same keys.
#[derive(Clone, Debug)]
pub struct SimKeyMatrix {
    driver: SimGpioDriver,
    switches: [[SwitchId; 4]; 4],
}

impl SimKeyMatrix {
    /// Presses or releases the key at the given position.
    pub fn set(&self, row: usize, col: usize, pressed: bool) -> GpioResult<()> {
        if row >= 4 || col >= 4 {
            return Err(GpioError::InvalidArgument);
        }
        self.driver.set_switch(self.switches[row][col], pressed)
    }

    pub fn press(&self, row: usize, col: usize) -> GpioResult<()> {
        self.set(row, col, true)
    }

    pub fn release(&self, row: usize, col: usize) -> GpioResult<()> {
        self.set(row, col, false)
    }

    pub fn press_key(&self, key: KeypadKey) -> GpioResult<()> {
        let (row, col) = key.position();
        self.press(row as usize, col as usize)
    }

    pub fn release_key(&self, key: KeypadKey) -> GpioResult<()> {
        let (row, col) = key.position();
        self.release(row as usize, col as usize)
    }

    pub fn release_all(&self) -> GpioResult<()> {
        for row in 0..4 {
            for col in 0..4 {
                self.release(row, col)?;
            }
        }
        Ok(())
    }

    pub fn is_pressed(&self, row: usize, col: usize) -> GpioResult<bool> {
        if row >= 4 || col >= 4 {
            return Err(GpioError::InvalidArgument);
        }
        self.driver.is_switch_closed(self.switches[row][col])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpioBias::{PullDown, PullUp};

    #[test]
    fn floating_net_reads_high() {
        let driver = SimGpioDriver::new(2);
        assert_eq!(driver.level(0), Ok(true));
    }

    #[test]
    fn pull_down_wins_only_without_pull_up() {
        let driver = SimGpioDriver::new(2);
        let switch = driver.add_switch(0, 1).unwrap();
        let mut a = driver.get_pin(0).unwrap();
        a.set_bias(PullDown).unwrap();
        let _a_in = a.as_input().unwrap();
        assert_eq!(driver.level(0), Ok(false));
        assert_eq!(driver.level(1), Ok(true));

        driver.set_switch(switch, true).unwrap();
        assert_eq!(driver.level(1), Ok(false));

        let mut b = driver.get_pin(1).unwrap();
        b.set_bias(PullUp).unwrap();
        let _b_in = b.as_input().unwrap();
        assert_eq!(driver.level(0), Ok(true));
    }

    #[test]
    fn open_drain_output_floats_when_inactive() {
        let driver = SimGpioDriver::new(2);
        let switch = driver.add_switch(0, 1).unwrap();
        driver.set_switch(switch, true).unwrap();

        let mut out_pin = driver.get_pin(0).unwrap();
        out_pin.set_drive_mode(GpioDriveMode::OpenDrain).unwrap();
        let out = out_pin.as_output().unwrap();

        let mut in_pin = driver.get_pin(1).unwrap();
        in_pin.set_bias(PullDown).unwrap();
        let input = in_pin.as_input().unwrap();

        out.write(true).unwrap();
        assert_eq!(input.read(), Ok(false));
        out.write(false).unwrap();
        assert_eq!(input.read(), Ok(false));
        assert_eq!(driver.level(0), Ok(false));
    }

    #[test]
    fn active_low_output_inverts_level() {
        let driver = SimGpioDriver::new(1);
        let mut pin = driver.get_pin(0).unwrap();
        pin.set_active_level(GpioActiveLevel::Low).unwrap();
        let out = pin.as_output().unwrap();
        assert_eq!(driver.level(0), Ok(true));
        out.write(true).unwrap();
        assert_eq!(driver.level(0), Ok(false));
    }

    #[test]
    fn pins_are_exclusive_until_dropped() {
        let driver = SimGpioDriver::new(4);
        let pin = driver.get_pin(1).unwrap();
        assert_eq!(driver.get_pin(1).err(), Some(GpioError::AlreadyInUse));
        assert_eq!(driver.get_pin_bus([0, 1]).err(), Some(GpioError::AlreadyInUse));
        drop(pin);
        assert!(driver.get_pin_bus([0, 1]).is_ok());
        assert_eq!(driver.get_pin(9).err(), Some(GpioError::InvalidArgument));
    }

    #[test]
    fn ghosting_joins_nets_across_three_keys() {
        let driver = SimGpioDriver::new(8);
        let matrix = driver.add_key_matrix([0, 1, 2, 3], [4, 5, 6, 7]).unwrap();

        let mut col_pin = driver.get_pin(4).unwrap();
        let col = col_pin.as_output().unwrap();
        col.write(false).unwrap();

        matrix.press(0, 0).unwrap();
        matrix.press(0, 1).unwrap();
        matrix.press(1, 1).unwrap();

        // Row 1 reaches column 0 through (1,1) -> col 1 -> (0,1) -> row 0 -> (0,0).
        assert_eq!(driver.level(1), Ok(false));
        assert_eq!(driver.level(2), Ok(true));
    }
}
