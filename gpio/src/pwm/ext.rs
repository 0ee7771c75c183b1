//! Extension traits for PWM pins.

use crate::pwm::PwmPin;
use crate::{GpioError, GpioResult};
use std::time::Duration;

/// Extension trait for PWM pins, providing methods to work with durations and tones instead of
/// raw nanoseconds.
pub trait PwmExtension {
    /// Gets the period of the PWM pin as a [Duration].
    fn period(&self) -> GpioResult<Duration>;
    /// Sets the period of the PWM pin using a [Duration].
    fn set_period(&mut self, period: Duration) -> GpioResult<()>;

    /// Gets the duty cycle of the PWM pin as a [Duration].
    fn duty(&self) -> GpioResult<Duration>;
    /// Sets the duty cycle of the PWM pin using a [Duration].
    fn set_duty(&mut self, duty: Duration) -> GpioResult<()>;

    /// Starts a square wave at `frequency_hz` with a 50% duty cycle.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the frequency is not positive or too low for a `u32`
    ///   period in nanoseconds.
    fn play_frequency(&mut self, frequency_hz: f64) -> GpioResult<()>;

    /// Stops the output.
    fn silence(&mut self) -> GpioResult<()>;
}

impl PwmExtension for dyn PwmPin + '_ {
    fn period(&self) -> GpioResult<Duration> {
        let period_ns = self.period_ns()?;
        Ok(Duration::from_nanos(period_ns.into()))
    }

    fn set_period(&mut self, period: Duration) -> GpioResult<()> {
        let period_ns = u32::try_from(period.as_nanos()).map_err(|_| GpioError::InvalidArgument)?;
        self.set_period_ns(period_ns)
    }

    fn duty(&self) -> GpioResult<Duration> {
        let duty_ns = self.duty_ns()?;
        Ok(Duration::from_nanos(duty_ns.into()))
    }

    fn set_duty(&mut self, duty: Duration) -> GpioResult<()> {
        let duty_ns = u32::try_from(duty.as_nanos()).map_err(|_| GpioError::InvalidArgument)?;
        self.set_duty_ns(duty_ns)
    }

    fn play_frequency(&mut self, frequency_hz: f64) -> GpioResult<()> {
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            return Err(GpioError::InvalidArgument);
        }
        let period_ns = (1e9 / frequency_hz).round();
        if period_ns < 2.0 || period_ns > u32::MAX as f64 {
            return Err(GpioError::InvalidArgument);
        }
        let period_ns = period_ns as u32;

        // Shrink the duty first so it never exceeds the new period.
        self.set_duty_ns(0)?;
        self.set_period_ns(period_ns)?;
        self.set_duty_ns(period_ns / 2)?;
        self.enable()
    }

    fn silence(&mut self) -> GpioResult<()> {
        self.disable()
    }
}
