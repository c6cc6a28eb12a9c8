//! Recording doubles for the pin traits.
//!
//! Used by the daemon's tests to observe actuator commands and to script
//! probe readings without a board attached.

use parking_lot::Mutex;

use crate::{AdcInput, DigitalOutput, IoError, Level, PwmOutput};

/// A digital output that records every level written to it.
#[derive(Default)]
pub struct MockGpio {
    state: Mutex<GpioState>,
}

#[derive(Default)]
struct GpioState {
    level: Option<Level>,
    history: Vec<Level>,
}

impl MockGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently written level, if any write has happened.
    pub fn level(&self) -> Option<Level> {
        self.state.lock().level
    }

    /// Every level written, in order.
    pub fn history(&self) -> Vec<Level> {
        self.state.lock().history.clone()
    }
}

impl DigitalOutput for MockGpio {
    fn write(&self, level: Level) -> Result<(), IoError> {
        let mut state = self.state.lock();
        state.level = Some(level);
        state.history.push(level);
        Ok(())
    }
}

/// A PWM channel that records duty-cycle commands.
#[derive(Default)]
pub struct MockPwm {
    state: Mutex<PwmState>,
}

#[derive(Default)]
struct PwmState {
    duty: Option<f64>,
    frequency: Option<f64>,
    history: Vec<f64>,
}

impl MockPwm {
    pub fn new() -> Self {
        Self::default()
    }

    /// The duty cycle currently driven, or `None` while stopped.
    pub fn duty(&self) -> Option<f64> {
        self.state.lock().duty
    }

    /// The frequency of the most recent `start`.
    pub fn frequency(&self) -> Option<f64> {
        self.state.lock().frequency
    }

    /// Every duty cycle passed to `start`, in order.
    pub fn history(&self) -> Vec<f64> {
        self.state.lock().history.clone()
    }
}

impl PwmOutput for MockPwm {
    fn start(&self, duty_percent: f64, freq_hz: f64) -> Result<(), IoError> {
        let mut state = self.state.lock();
        state.duty = Some(duty_percent);
        state.frequency = Some(freq_hz);
        state.history.push(duty_percent);
        Ok(())
    }

    fn stop(&self) -> Result<(), IoError> {
        self.state.lock().duty = None;
        Ok(())
    }
}

/// An ADC channel that returns a scripted ratio.
pub struct MockAdc {
    value: Mutex<Option<f64>>,
}

impl MockAdc {
    /// Creates a channel that reads `value` until told otherwise.
    pub fn new(value: f64) -> Self {
        Self {
            value: Mutex::new(Some(value)),
        }
    }

    /// Changes the ratio returned by subsequent reads.
    pub fn set(&self, value: f64) {
        *self.value.lock() = Some(value);
    }

    /// Makes subsequent reads fail, as a disconnected converter would.
    pub fn fail(&self) {
        *self.value.lock() = None;
    }
}

impl AdcInput for MockAdc {
    fn read(&self) -> Result<f64, IoError> {
        (*self.value.lock()).ok_or_else(|| IoError::BadSample("mock failure".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpio_records_writes() {
        let gpio = MockGpio::new();
        assert_eq!(gpio.level(), None);
        gpio.write(Level::High).unwrap();
        gpio.write(Level::Low).unwrap();
        assert_eq!(gpio.level(), Some(Level::Low));
        assert_eq!(gpio.history(), vec![Level::High, Level::Low]);
    }

    #[test]
    fn pwm_tracks_running_state() {
        let pwm = MockPwm::new();
        pwm.start(75.0, 18_000.0).unwrap();
        assert_eq!(pwm.duty(), Some(75.0));
        assert_eq!(pwm.frequency(), Some(18_000.0));
        pwm.stop().unwrap();
        assert_eq!(pwm.duty(), None);
        assert_eq!(pwm.history(), vec![75.0]);
    }

    #[test]
    fn adc_scripted_reads() {
        let adc = MockAdc::new(0.5);
        assert_eq!(adc.read().unwrap(), 0.5);
        adc.set(0.25);
        assert_eq!(adc.read().unwrap(), 0.25);
        adc.fail();
        assert!(adc.read().is_err());
    }
}
