use crate::pwm::PwmPin;
use crate::{GpioError, GpioResult};
use log::trace;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// One stretch of sound played on a [SimPwmPin].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ToneRecord {
    pub frequency_hz: f64,
    pub started: Instant,
}

#[derive(Debug, Default)]
struct PwmState {
    period_ns: u32,
    duty_ns: u32,
    enabled: bool,
    history: Vec<ToneRecord>,
}

/// A PWM output that keeps a log of every tone started on it.
#[derive(Debug, Default)]
pub struct SimPwmPin {
    state: Arc<Mutex<PwmState>>,
}

impl SimPwmPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> SimPwmHandle {
        SimPwmHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut PwmState) -> GpioResult<T>) -> GpioResult<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| GpioError::Other("PWM state poisoned".to_string()))?;
        f(&mut state)
    }
}

impl PwmPin for SimPwmPin {
    fn period_ns(&self) -> GpioResult<u32> {
        self.with_state(|s| Ok(s.period_ns))
    }

    fn set_period_ns(&mut self, period_ns: u32) -> GpioResult<()> {
        self.with_state(|s| {
            if period_ns < s.duty_ns {
                return Err(GpioError::InvalidArgument);
            }
            s.period_ns = period_ns;
            Ok(())
        })
    }

    fn duty_ns(&self) -> GpioResult<u32> {
        self.with_state(|s| Ok(s.duty_ns))
    }

    fn set_duty_ns(&mut self, duty_ns: u32) -> GpioResult<()> {
        self.with_state(|s| {
            if duty_ns > s.period_ns {
                return Err(GpioError::InvalidArgument);
            }
            s.duty_ns = duty_ns;
            Ok(())
        })
    }

    fn is_enabled(&self) -> GpioResult<bool> {
        self.with_state(|s| Ok(s.enabled))
    }

    fn enable(&mut self) -> GpioResult<()> {
        self.with_state(|s| {
            if s.period_ns == 0 {
                return Err(GpioError::InvalidArgument);
            }
            s.enabled = true;
            let frequency_hz = 1e9 / s.period_ns as f64;
            trace!("PWM on at {:.1} Hz", frequency_hz);
            s.history.push(ToneRecord {
                frequency_hz,
                started: Instant::now(),
            });
            Ok(())
        })
    }

    fn disable(&mut self) -> GpioResult<()> {
        self.with_state(|s| {
            s.enabled = false;
            Ok(())
        })
    }
}

/// Observes a [SimPwmPin] after it has been handed off.
#[derive(Clone, Debug)]
pub struct SimPwmHandle {
    state: Arc<Mutex<PwmState>>,
}

impl SimPwmHandle {
    pub fn is_enabled(&self) -> bool {
        self.state.lock().map(|s| s.enabled).unwrap_or(false)
    }

    /// Every tone started so far, oldest first.
    pub fn history(&self) -> Vec<ToneRecord> {
        self.state
            .lock()
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    /// Frequencies of every tone started so far, rounded to whole hertz.
    pub fn frequencies(&self) -> Vec<u32> {
        self.history()
            .iter()
            .map(|t| t.frequency_hz.round() as u32)
            .collect()
    }

    pub fn count_of(&self, frequency_hz: u32) -> usize {
        self.frequencies().iter().filter(|&&f| f == frequency_hz).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pwm::PwmExtension;

    #[test]
    fn play_frequency_sets_square_wave() {
        let mut pin = SimPwmPin::new();
        let handle = pin.handle();
        let pin: &mut dyn PwmPin = &mut pin;

        pin.play_frequency(1000.0).unwrap();
        assert_eq!(pin.period_ns().unwrap(), 1_000_000);
        assert_eq!(pin.duty_ns().unwrap(), 500_000);
        assert!(handle.is_enabled());

        // Going up in pitch shrinks the period below the old duty.
        pin.play_frequency(2489.0).unwrap();
        assert_eq!(handle.frequencies(), vec![1000, 2489]);

        pin.silence().unwrap();
        assert!(!handle.is_enabled());
    }

    #[test]
    fn rejects_unplayable_frequencies() {
        let mut pin = SimPwmPin::new();
        let pin: &mut dyn PwmPin = &mut pin;
        assert!(matches!(pin.play_frequency(0.0), Err(GpioError::InvalidArgument)));
        assert!(matches!(pin.play_frequency(f64::NAN), Err(GpioError::InvalidArgument)));
        assert!(matches!(pin.play_frequency(0.1), Err(GpioError::InvalidArgument)));
        assert!(matches!(pin.enable(), Err(GpioError::InvalidArgument)));
    }
}
