//! The module for the main app state and logic.

use crate::config::{Timing, Tones};
use crate::controller::{LockState, TransitionCell, TransitionRequest};
use crate::mirror::StatusMirror;
use crate::tone::Tone;
use crate::utils::{centered, DisplayExt};
use keylock_gpio::debounce::EdgeDebounce;
use keylock_gpio::keypad::Keypad;
use keylock_gpio::lcd::hd44780::driver::HD44780Driver;
use keylock_gpio::pwm::{PwmExtension, PwmPin};
use keylock_gpio::{GpioError, GpioOutput, GpioResult};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// The lights and the buzzer, shared by the executor and the heartbeat.
#[derive(Debug)]
pub struct Indicators<'a> {
    failure: Box<dyn GpioOutput + 'a>,
    success: Box<dyn GpioOutput + 'a>,
    buzzer: Box<dyn PwmPin + 'a>,
}

impl<'a> Indicators<'a> {
    pub fn new(
        failure: Box<dyn GpioOutput + 'a>,
        success: Box<dyn GpioOutput + 'a>,
        buzzer: Box<dyn PwmPin + 'a>,
    ) -> Self {
        Self {
            failure,
            success,
            buzzer,
        }
    }

    pub fn set_failure(&mut self, on: bool) -> GpioResult<()> {
        self.failure.write(on)
    }

    pub fn set_success(&mut self, on: bool) -> GpioResult<()> {
        self.success.write(on)
    }

    pub fn start_tone(&mut self, tone: &Tone) -> GpioResult<()> {
        self.buzzer.play_frequency(tone.frequency_hz())
    }

    pub fn silence(&mut self) -> GpioResult<()> {
        self.buzzer.silence()
    }
}

/// Everything the poll loop, the executor and the heartbeat share.
pub struct App<'a> {
    timing: Timing,
    tones: Tones,
    transitions: TransitionCell,
    /// Characters typed since the lock last entered [LockState::Active].
    candidate: Mutex<String>,
    display: Mutex<Box<dyn HD44780Driver + 'a>>,
    indicators: Mutex<Indicators<'a>>,
    mirror: StatusMirror,
    shutdown: AtomicBool,
}

impl<'a> App<'a> {
    pub fn new(
        timing: Timing,
        tones: Tones,
        display: Box<dyn HD44780Driver + 'a>,
        indicators: Indicators<'a>,
        mirror: StatusMirror,
    ) -> Self {
        Self {
            timing,
            tones,
            transitions: TransitionCell::new(),
            candidate: Mutex::new(String::new()),
            display: Mutex::new(display),
            indicators: Mutex::new(indicators),
            mirror,
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn tones(&self) -> &Tones {
        &self.tones
    }

    pub fn mirror(&self) -> &StatusMirror {
        &self.mirror
    }

    pub fn state(&self) -> LockState {
        self.transitions.state()
    }

    pub fn pending(&self) -> Option<LockState> {
        self.transitions.pending()
    }

    pub fn candidate(&self) -> String {
        self.candidate_buffer().clone()
    }

    fn candidate_buffer(&self) -> MutexGuard<'_, String> {
        self.candidate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Asks every loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Sleeps for `duration`, returning early only on shutdown.
    pub fn wait(&self, duration: Duration) {
        const SLICE: Duration = Duration::from_millis(50);

        let deadline = Instant::now() + duration;
        while !self.is_shutting_down() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(SLICE.min(deadline - now));
        }
    }

    fn with_display(&self, what: &str, f: impl FnOnce(&mut dyn HD44780Driver) -> GpioResult<()>) {
        let result = match self.display.lock() {
            Ok(mut display) => f(&mut **display),
            Err(_) => Err(GpioError::Other("display poisoned".to_string())),
        };
        if let Err(e) = result {
            warn!("Failed to {}: {}", what, e);
        }
    }

    fn with_indicators(&self, what: &str, f: impl FnOnce(&mut Indicators<'a>) -> GpioResult<()>) {
        let result = match self.indicators.lock() {
            Ok(mut indicators) => f(&mut indicators),
            Err(_) => Err(GpioError::Other("indicators poisoned".to_string())),
        };
        if let Err(e) = result {
            warn!("Failed to {}: {}", what, e);
        }
    }

    fn request(&self, target: LockState) {
        match self.transitions.request(target) {
            TransitionRequest::Accepted => debug!("Transition to {} requested.", target),
            TransitionRequest::AlreadyPending => debug!("Transition to {} already pending.", target),
            TransitionRequest::Refused { pending } => {
                warn!("Refused transition to {}: {} is pending.", target, pending)
            }
        }
    }

    /// Feeds one key press to the lock.
    pub fn handle_key(&self, key: char) {
        let state = self.state();
        let pending = self.pending();
        if state != LockState::Active || pending.is_some() {
            debug!("Dropped key {:?} in {} (pending: {:?}).", key, state, pending);
            return;
        }

        let password = match self.mirror.password() {
            Ok(password) => password,
            Err(e) => {
                warn!("Couldn't read the password: {}", e);
                return;
            }
        };

        let mut candidate = self.candidate_buffer();
        candidate.push(key);
        if candidate.chars().count() < password.chars().count() {
            let line = centered(&candidate);
            drop(candidate);
            self.with_display("show input", |lcd| lcd.print_line(1, &line));
            return;
        }

        let target = if *candidate == password {
            LockState::Defused
        } else {
            LockState::WrongPassword
        };
        drop(candidate);
        self.request(target);
    }

    /// Copies the state and the typed characters to the status mirror.
    pub fn publish_status(&self) {
        let candidate = self.candidate();
        self.mirror.publish(self.state(), &candidate);
    }

    /// Applies the pending transition, if any: entry actions, then the dwell of the new state.
    ///
    /// Returns whether there was anything to do.
    pub fn execute_pending(&self) -> bool {
        let Some(state) = self.transitions.begin() else {
            return false;
        };
        info!("Transitioning to: {}", state);
        self.enter(state);
        self.transitions.finish(state);

        if let Some(next) = self.dwell(state) {
            self.request(next);
        }
        true
    }

    fn enter(&self, state: LockState) {
        match state {
            LockState::Active => {
                self.with_indicators("switch lights off", |ind| {
                    ind.set_failure(false)?;
                    ind.set_success(false)
                });
                self.with_display("show prompt", |lcd| {
                    lcd.clear_display()?;
                    lcd.print_line(0, "Enter password:")
                });
                self.candidate_buffer().clear();
            }
            LockState::WrongPassword => {
                self.with_indicators("switch success light off", |ind| ind.set_success(false));
                self.with_display("show failure", |lcd| {
                    lcd.clear_display()?;
                    lcd.print_line(0, "Wrong pass !")
                });
                self.candidate_buffer().clear();
            }
            LockState::Defused => {
                let username = self.mirror.username().unwrap_or_else(|e| {
                    warn!("Couldn't read the username: {}", e);
                    String::new()
                });
                self.with_display("show success", |lcd| {
                    lcd.clear_display()?;
                    lcd.print_line(0, "Congratulations")?;
                    lcd.print_line(1, &username)
                });
                self.with_indicators("switch success light on", |ind| ind.set_success(true));
            }
        }
    }

    fn dwell(&self, state: LockState) -> Option<LockState> {
        match state {
            LockState::Active => None,
            LockState::WrongPassword => {
                let tone = self.tones.failure;
                for _ in 0..self.timing.failure_pulses {
                    self.with_indicators("start failure pulse", |ind| {
                        ind.set_failure(true)?;
                        ind.start_tone(&tone)
                    });
                    self.wait(tone.duration);
                    self.with_indicators("stop failure tone", |ind| ind.silence());
                    self.wait(self.timing.failure_pause());
                    self.with_indicators("end failure pulse", |ind| ind.set_failure(false));
                    self.wait(self.timing.failure_pause());
                }
                self.wait(self.timing.wrong_password_cooldown());
                self.candidate_buffer().clear();
                Some(LockState::Active)
            }
            LockState::Defused => {
                self.wait(self.timing.defused_hold());
                Some(LockState::Active)
            }
        }
    }

    /// Plays `tone` while flashing the failure light.
    ///
    /// If the lock leaves [LockState::Active] during the pulse, the outputs are left to the new
    /// state's actions.
    pub fn pulse(&self, tone: &Tone) {
        self.with_indicators("start pulse", |ind| {
            ind.set_failure(true)?;
            ind.start_tone(tone)
        });
        self.wait(tone.duration);
        self.with_indicators("end pulse", |ind| {
            if self.state() != LockState::Active {
                return Ok(());
            }
            ind.silence()?;
            ind.set_failure(false)
        });
    }

    /// Runs transitions until shutdown.
    pub fn run_executor(&self) {
        info!("Executor started.");
        while !self.is_shutting_down() {
            if !self.execute_pending() {
                self.wait(self.timing.idle());
            }
        }
        info!("Executor stopped.");
    }

    /// Polls `keypad` until shutdown, feeding new key presses to the lock.
    pub fn run_poll_loop(&self, keypad: &dyn Keypad) {
        info!("Polling {:?}.", keypad);
        let mut debounce = EdgeDebounce::new();
        while !self.is_shutting_down() {
            if let Some(key) = debounce.poll(keypad) {
                info!("Key pressed: {}", key);
                self.handle_key(key);
            }
            self.publish_status();
            thread::sleep(self.timing.poll());
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::mirror::Characteristic;
    use keylock_gpio::i2c::SimI2cBus;
    use keylock_gpio::lcd::hd44780::driver::I2cHD44780Driver;
    use keylock_gpio::lcd::hd44780::{SimHD44780, SimLcdHandle};
    use keylock_gpio::pwm::{SimPwmHandle, SimPwmPin};
    use keylock_gpio::sim::SimGpioDriver;
    use keylock_gpio::GpioDriver;
    use proptest::prelude::*;

    pub const FAILURE_LED: usize = 8;
    pub const SUCCESS_LED: usize = 9;

    pub fn fast_timing() -> Timing {
        Timing {
            poll_ms: 1,
            heartbeat_interval_ms: 20,
            idle_ms: 2,
            failure_pulses: 4,
            failure_pause_ms: 1,
            wrong_password_cooldown_ms: 5,
            defused_hold_ms: 5,
            key_press_ms: 10,
        }
    }

    pub fn fast_tones() -> Tones {
        let mut tones = Tones::default();
        tones.heartbeat.duration = Duration::from_millis(2);
        tones.failure.duration = Duration::from_millis(1);
        tones
    }

    /// Builds an [App] on simulated hardware and hands it to `f` with views of the outputs.
    pub fn with_app<R>(f: impl FnOnce(&App, &Outputs) -> R) -> R {
        let gpio = SimGpioDriver::new(10);
        let mut failure_pin = gpio.get_pin(FAILURE_LED).unwrap();
        let mut success_pin = gpio.get_pin(SUCCESS_LED).unwrap();

        let bus = SimI2cBus::new();
        let lcd = SimHD44780::new();
        let lcd_view = lcd.handle();
        bus.attach(Box::new(lcd)).unwrap();
        let mut driver = I2cHD44780Driver::new(&bus);
        driver.init(true, false).unwrap();

        let buzzer = SimPwmPin::new();
        let outputs = Outputs {
            gpio: gpio.clone(),
            lcd: lcd_view,
            buzzer: buzzer.handle(),
        };

        let app = App::new(
            fast_timing(),
            fast_tones(),
            Box::new(driver),
            Indicators::new(
                failure_pin.as_output().unwrap(),
                success_pin.as_output().unwrap(),
                Box::new(buzzer),
            ),
            StatusMirror::new(ServiceConfig::default(), "alice", "1234"),
        );
        f(&app, &outputs)
    }

    pub struct Outputs {
        pub gpio: SimGpioDriver,
        pub lcd: SimLcdHandle,
        pub buzzer: SimPwmHandle,
    }

    impl Outputs {
        pub fn failure_led(&self) -> bool {
            self.gpio.level(FAILURE_LED).unwrap()
        }

        pub fn success_led(&self) -> bool {
            self.gpio.level(SUCCESS_LED).unwrap()
        }
    }

    fn boot(app: &App) {
        assert!(app.execute_pending());
        assert_eq!(app.state(), LockState::Active);
        assert_eq!(app.pending(), None);
    }

    fn type_keys(app: &App, keys: &str) {
        for key in keys.chars() {
            app.handle_key(key);
        }
    }

    #[test]
    fn boot_shows_prompt() {
        with_app(|app, out| {
            boot(app);
            assert_eq!(out.lcd.line(0), "Enter password: ");
            assert_eq!(out.lcd.line(1), " ".repeat(16));
            assert!(!out.failure_led());
            assert!(!out.success_led());
            assert!(!app.execute_pending());
        });
    }

    #[test]
    fn partial_input_is_centered() {
        with_app(|app, out| {
            boot(app);
            type_keys(app, "12");
            assert_eq!(out.lcd.line(1), "       12       ");
            type_keys(app, "3");
            assert_eq!(out.lcd.line(1), "      123       ");
            assert_eq!(app.candidate(), "123");
            assert_eq!(app.pending(), None);

            app.publish_status();
            assert_eq!(app.mirror().read(Characteristic::State).unwrap(), "ACTIVE : '123'");
        });
    }

    #[test]
    fn right_code_defuses_then_rearms() {
        with_app(|app, out| {
            boot(app);
            type_keys(app, "1234");
            assert_eq!(app.pending(), Some(LockState::Defused));

            // Keys are ignored while the transition is pending.
            app.handle_key('5');
            assert_eq!(app.candidate(), "1234");

            assert!(app.execute_pending());
            assert_eq!(app.state(), LockState::Defused);
            assert_eq!(out.lcd.line(0), "Congratulations ");
            assert_eq!(out.lcd.line(1), "alice           ");
            assert!(out.success_led());
            app.publish_status();
            assert_eq!(app.mirror().read(Characteristic::State).unwrap(), "DEFUSED");

            assert_eq!(app.pending(), Some(LockState::Active));
            assert!(app.execute_pending());
            assert_eq!(app.state(), LockState::Active);
            assert_eq!(app.candidate(), "");
            assert!(!out.success_led());
            assert_eq!(out.lcd.line(0), "Enter password: ");
        });
    }

    #[test]
    fn wrong_code_alarms_then_rearms() {
        with_app(|app, out| {
            boot(app);
            type_keys(app, "1235");
            assert_eq!(app.pending(), Some(LockState::WrongPassword));

            assert!(app.execute_pending());
            assert_eq!(app.state(), LockState::WrongPassword);
            assert_eq!(out.lcd.line(0), "Wrong pass !    ");
            assert_eq!(out.buzzer.count_of(349), 4);
            assert!(!out.buzzer.is_enabled());
            assert!(!out.failure_led());
            assert_eq!(app.candidate(), "");

            // Typing during the alarm does nothing.
            app.handle_key('1');
            assert_eq!(app.candidate(), "");

            assert_eq!(app.pending(), Some(LockState::Active));
            assert!(app.execute_pending());
            assert_eq!(app.state(), LockState::Active);
            assert_eq!(app.candidate(), "");
        });
    }

    #[test]
    fn password_change_applies_to_next_comparison() {
        with_app(|app, _| {
            boot(app);
            type_keys(app, "12");
            app.mirror().write(Characteristic::Password, "12AB").unwrap();
            type_keys(app, "AB");
            assert_eq!(app.pending(), Some(LockState::Defused));
        });
    }

    #[test]
    fn shorter_password_compares_immediately() {
        with_app(|app, _| {
            boot(app);
            type_keys(app, "12");
            app.mirror().write(Characteristic::Password, "1").unwrap();
            app.handle_key('3');
            assert_eq!(app.pending(), Some(LockState::WrongPassword));
        });
    }

    #[test]
    fn wait_stops_on_shutdown() {
        with_app(|app, _| {
            app.shutdown();
            let start = Instant::now();
            app.wait(Duration::from_secs(10));
            assert!(start.elapsed() < Duration::from_secs(1));
        });
    }

    #[test]
    fn pulse_leaves_outputs_to_a_new_state() {
        with_app(|app, out| {
            boot(app);
            let mut beat = app.tones().heartbeat;
            beat.duration = Duration::from_millis(100);

            thread::scope(|s| {
                let beating = s.spawn(|| app.pulse(&beat));
                thread::sleep(Duration::from_millis(30));

                app.request(LockState::WrongPassword);
                assert_eq!(app.transitions.begin(), Some(LockState::WrongPassword));
                let failure = app.tones().failure;
                app.with_indicators("start failure pulse", |ind| {
                    ind.set_failure(true)?;
                    ind.start_tone(&failure)
                });
                beating.join().unwrap();
            });

            assert!(out.failure_led());
            assert!(out.buzzer.is_enabled());
            assert_eq!(out.buzzer.frequencies().last(), Some(&349));
        });
    }

    #[test]
    fn pulse_while_active_ends_silent() {
        with_app(|app, out| {
            boot(app);
            app.pulse(&app.tones().heartbeat);
            assert!(!out.failure_led());
            assert!(!out.buzzer.is_enabled());
            assert_eq!(out.buzzer.frequencies(), vec![2489]);
        });
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn any_other_full_length_code_is_wrong(code in "[0-9A-D*#]{4}") {
            prop_assume!(code != "1234");
            with_app(|app, _| {
                boot(app);
                type_keys(app, &code);
                assert_eq!(app.pending(), Some(LockState::WrongPassword));
            });
        }
    }
}
