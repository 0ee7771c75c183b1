mod app;
mod config;
mod console;
mod controller;
mod heartbeat;
mod mirror;
mod tone;
mod utils;

use crate::app::{App, Indicators};
use crate::config::{Config, KeypadSource};
use crate::console::Console;
use crate::mirror::StatusMirror;
use dotenv::dotenv;
use keylock_gpio::i2c::SimI2cBus;
use keylock_gpio::keypad::{BusKeypad, GpioKeypad, Keypad, KeypadChip};
use keylock_gpio::lcd::hd44780::driver::{HD44780Driver, I2cHD44780Driver};
use keylock_gpio::lcd::hd44780::SimHD44780;
use keylock_gpio::pwm::SimPwmPin;
use keylock_gpio::sim::SimGpioDriver;
use keylock_gpio::GpioActiveLevel::Low;
use keylock_gpio::GpioBias::PullUp;
use keylock_gpio::GpioDriveMode::OpenDrain;
use keylock_gpio::GpioDriver;
use log::{debug, info};
use std::io::{BufRead, BufReader, Write};
use std::thread;
use sysinfo::System;

fn log_host() {
    const UNKNOWN_STR: &str = "???";

    info!(
        "Running on {} ({}), kernel {}, {}",
        System::name().as_deref().unwrap_or(UNKNOWN_STR),
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::cpu_arch(),
    );
}

fn load_config() -> eyre::Result<Config> {
    debug!("Trying to load config from {}...", Config::path().display());
    let config = if let Some(config) = Config::try_load()? {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Using default");
        let config = Config::default();
        config.save()?;
        info!("Default config saved.");
        config
    };
    Ok(config)
}

/// Builds the simulated lock from `config` and runs it until the console closes.
fn run(config: &Config, input: impl BufRead + Send, out: impl Write + Send) -> eyre::Result<()> {
    config.validate()?;
    let key_map = config.key_map()?;

    debug!("Initializing GPIO board...");
    let gpio = SimGpioDriver::new(config.pins.board_size());
    let matrix = gpio.add_key_matrix(config.pins.keypad_rows, config.pins.keypad_cols)?;
    debug!("{:?} initialized.", gpio);

    let mut keypad_col_bus = gpio.get_pin_bus(config.pins.keypad_cols)?;
    let mut keypad_row_bus = gpio.get_pin_bus(config.pins.keypad_rows)?;
    keypad_col_bus.set_drive_mode(OpenDrain)?;
    keypad_col_bus.set_active_level(Low)?;
    keypad_row_bus.set_bias(PullUp)?;
    keypad_row_bus.set_active_level(Low)?;
    let mut failure_pin = gpio.get_pin(config.pins.failure_led)?;
    let mut success_pin = gpio.get_pin(config.pins.success_led)?;

    let bus = SimI2cBus::new();

    debug!("Initializing LCD driver...");
    let lcd = SimHD44780::new().with_address(config.bus.display_address);
    let lcd_view = lcd.handle();
    bus.attach(Box::new(lcd))?;
    let mut lcd = I2cHD44780Driver::new(&bus).with_address(config.bus.display_address);
    lcd.init(true, false)?;
    lcd.set_backlight(true)?;
    debug!("{:?} initialized.", lcd);

    debug!("Initializing keypad driver...");
    let keypad_col_out = keypad_col_bus.as_output()?;
    let keypad_row_in = keypad_row_bus.as_input()?;
    let keypad: Box<dyn Keypad + '_> = match config.keypad_source {
        KeypadSource::Bus => {
            let chip = KeypadChip::new(keypad_col_out, keypad_row_in)
                .with_address(config.bus.keypad_address);
            bus.attach(Box::new(chip))?;
            Box::new(
                BusKeypad::new(&bus)
                    .with_address(config.bus.keypad_address)
                    .with_key_map(key_map),
            )
        }
        KeypadSource::Direct => {
            Box::new(GpioKeypad::new(keypad_col_out, keypad_row_in).with_key_map(key_map))
        }
    };
    debug!("{:?} initialized.", keypad);

    let mirror = StatusMirror::new(config.service.clone(), &config.username, &config.password);
    debug!("Password is {:?}.", config.password);

    let app = App::new(
        config.timing.clone(),
        config.tones.clone(),
        Box::new(lcd),
        Indicators::new(
            failure_pin.as_output()?,
            success_pin.as_output()?,
            Box::new(SimPwmPin::new()),
        ),
        mirror,
    );
    let console = Console::new(&app, &matrix, key_map, lcd_view);

    info!("KeyLock initialized.");

    // Boot into ACTIVE before anything can be typed.
    app.execute_pending();

    thread::scope(|s| {
        s.spawn(|| app.run_executor());
        s.spawn(|| heartbeat::run(&app));
        s.spawn(|| console.run(input, out));
        app.run_poll_loop(&*keypad);
    });

    info!("KeyLock stopped.");
    Ok(())
}

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    info!("KeyLock starting...");
    log_host();

    let config = load_config()?;
    run(&config, BufReader::new(std::io::stdin()), std::io::stdout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::{fast_timing, fast_tones};

    fn session(source: KeypadSource, script: &str) -> String {
        let mut config = Config::default();
        config.keypad_source = source;
        config.username = "alice".to_string();
        config.timing = fast_timing();
        config.timing.defused_hold_ms = 2_000;
        config.timing.wrong_password_cooldown_ms = 2_000;
        config.tones = fast_tones();

        let mut out = Vec::new();
        run(&config, script.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn right_code_through_the_bus() {
        let text = session(KeypadSource::Bus, "1234\n:wait 100\n:status\n");
        assert!(text.contains("state:       DEFUSED"), "{}", text);
        assert!(text.contains("|Congratulations |"), "{}", text);
        assert!(text.contains("|alice           |"), "{}", text);
    }

    #[test]
    fn wrong_code_through_direct_wiring() {
        let text = session(KeypadSource::Direct, "1235\n:wait 100\n:status\n");
        assert!(text.contains("state:       WRONG_PASSWORD"), "{}", text);
        assert!(text.contains("|Wrong pass !    |"), "{}", text);
    }

    #[test]
    fn partial_input_is_mirrored() {
        let text = session(KeypadSource::Bus, "12\n:wait 50\n:status\n");
        assert!(text.contains("state:       ACTIVE"), "{}", text);
        assert!(text.contains("|       12       |"), "{}", text);
        assert!(text.contains("state:       \"ACTIVE : '12'\""), "{}", text);
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = Config::default();
        config.password.clear();
        assert!(run(&config, "".as_bytes(), Vec::new()).is_err());
    }
}
