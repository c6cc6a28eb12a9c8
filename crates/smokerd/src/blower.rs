//! The forced-air blower.
//!
//! Speeds above [`LOW_SPEED`] run as native PWM duty. At or below it the
//! motor stalls on real duty cycles, so the blower instead toggles between
//! full power and off on a seconds-scale square wave whose duty matches the
//! commanded speed. Starting from rest always begins with a short
//! full-power kick to get the impeller turning.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use sbc_io::PwmOutput;

use crate::error::{Error, Result};
use crate::scheduler::{self, TimerHandle};

/// PWM carrier frequency for the blower motor driver.
pub const PWM_FREQUENCY: f64 = 18_000.0;

/// Highest speed the motor cannot hold on native PWM duty.
pub const LOW_SPEED: u8 = 15;

/// Length of the full-power burst applied when starting from rest.
const KICK: Duration = Duration::from_secs(1);

/// On-phase of the low-speed square wave: nominally 1 s of airflow, doubled
/// because spin-up eats about a second of it.
const LOW_SPEED_ON: Duration = Duration::from_secs(2);

struct BlowerState {
    speed: u8,
    /// The kick timer or the next low-speed toggle, whichever is in flight.
    pending: Option<TimerHandle>,
}

/// The blower actuator. Owns one PWM channel.
pub struct Blower {
    pwm: Arc<dyn PwmOutput>,
    state: Mutex<BlowerState>,
}

impl Blower {
    /// Claims the PWM channel and parks the blower at rest.
    pub fn new(pwm: Arc<dyn PwmOutput>) -> Result<Arc<Self>> {
        pwm.start(0.0, PWM_FREQUENCY)?;
        pwm.stop()?;
        Ok(Arc::new(Self {
            pwm,
            state: Mutex::new(BlowerState {
                speed: 0,
                pending: None,
            }),
        }))
    }

    /// The last accepted speed command, 0-100.
    ///
    /// During low-speed mode this is the commanded speed, not the
    /// instantaneous duty of the square wave.
    pub fn speed(&self) -> u8 {
        self.state.lock().speed
    }

    /// Commands a new speed, 0-100.
    ///
    /// Cancels any in-flight kick or low-speed toggle. Moving off rest (a
    /// previous speed below [`LOW_SPEED`]) drives full power for one second
    /// before the target applies.
    pub fn set_speed(self: &Arc<Self>, speed: u8) -> Result<()> {
        if speed > 100 {
            return Err(Error::Range(format!(
                "blower speed must be between 0-100, got {speed}"
            )));
        }

        let mut state = self.state.lock();
        state.pending = None;

        if state.speed < LOW_SPEED && speed > 0 {
            self.pwm.start(100.0, PWM_FREQUENCY)?;
            let blower = Arc::clone(self);
            state.pending = Some(scheduler::after(KICK, move || {
                let mut state = blower.state.lock();
                if let Err(err) = blower.apply(&mut state, speed) {
                    warn!(%err, speed, "failed to apply blower speed after kick");
                }
            }));
        } else {
            self.apply(&mut state, speed)?;
        }

        state.speed = speed;
        debug!(speed, "blower speed set");
        Ok(())
    }

    /// Drives `speed` without the spin-up burst.
    fn apply(self: &Arc<Self>, state: &mut BlowerState, speed: u8) -> Result<()> {
        if speed > LOW_SPEED {
            self.pwm.start(f64::from(speed), PWM_FREQUENCY)?;
        } else if speed > 0 {
            self.low_speed_phase(state, speed, true);
        } else {
            self.pwm.start(0.0, PWM_FREQUENCY)?;
        }
        Ok(())
    }

    /// One phase of the low-speed square wave.
    ///
    /// The wave has period `100 / speed` seconds; full power for the
    /// on-phase, off for the remainder. Each phase schedules the next until
    /// a new `set_speed` cancels the chain.
    fn low_speed_phase(self: &Arc<Self>, state: &mut BlowerState, speed: u8, on: bool) {
        let period = 100.0 / f64::from(speed);
        let duty = if on { 100.0 } else { 0.0 };
        let wait = if on {
            LOW_SPEED_ON
        } else {
            Duration::from_secs_f64(period - 1.0)
        };

        if let Err(err) = self.pwm.start(duty, PWM_FREQUENCY) {
            warn!(%err, "PWM write failed during low-speed cycle");
        }

        let blower = Arc::clone(self);
        state.pending = Some(scheduler::after(wait, move || {
            let mut state = blower.state.lock();
            blower.low_speed_phase(&mut state, speed, !on);
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbc_io::mock::MockPwm;

    fn rig() -> (Arc<Blower>, Arc<MockPwm>) {
        let pwm = Arc::new(MockPwm::new());
        let blower = Blower::new(Arc::clone(&pwm) as Arc<dyn PwmOutput>).unwrap();
        (blower, pwm)
    }

    #[test]
    fn rejects_out_of_range_speed() {
        let (blower, _pwm) = rig();
        assert!(matches!(blower.set_speed(101), Err(Error::Range(_))));
        assert_eq!(blower.speed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn kick_applies_full_power_then_the_target() {
        let (blower, pwm) = rig();

        blower.set_speed(30).unwrap();
        assert_eq!(blower.speed(), 30);

        // t = 0.5 s: still in the kick burst
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(pwm.duty(), Some(100.0));

        // t = 1.5 s: kick over, native duty applied
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(pwm.duty(), Some(30.0));
        assert_eq!(blower.speed(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn no_kick_when_already_running() {
        let (blower, pwm) = rig();
        blower.set_speed(30).unwrap();
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        blower.set_speed(60).unwrap();
        assert_eq!(pwm.duty(), Some(60.0));
    }

    #[tokio::test(start_paused = true)]
    async fn low_speed_mode_cycles_the_motor() {
        let (blower, pwm) = rig();
        blower.set_speed(30).unwrap();
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        // speed 10 -> period 10 s: on 2 s, off 9 s... the on-phase overlap
        // comes out of spin-up, not airflow.
        blower.set_speed(10).unwrap();
        assert_eq!(blower.speed(), 10);
        assert_eq!(pwm.duty(), Some(100.0));

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(pwm.duty(), Some(0.0));

        tokio::time::sleep(Duration::from_millis(9_000)).await;
        assert_eq!(pwm.duty(), Some(100.0));
    }

    #[tokio::test(start_paused = true)]
    async fn set_speed_cancels_the_low_speed_cycle() {
        let (blower, pwm) = rig();
        blower.set_speed(30).unwrap();
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        blower.set_speed(10).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        // From a crawl the kick fires again, then the native duty holds.
        blower.set_speed(50).unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(pwm.duty(), Some(50.0));
        assert_eq!(blower.speed(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn speed_reports_the_last_accepted_command() {
        let (blower, _pwm) = rig();
        for speed in [20, 80, 100, 40] {
            blower.set_speed(speed).unwrap();
        }
        assert_eq!(blower.speed(), 40);

        assert!(blower.set_speed(150).is_err());
        assert_eq!(blower.speed(), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_speed_stops_the_motor() {
        let (blower, pwm) = rig();
        blower.set_speed(30).unwrap();
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        blower.set_speed(0).unwrap();
        assert_eq!(pwm.duty(), Some(0.0));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(pwm.duty(), Some(0.0));
        assert_eq!(blower.speed(), 0);
    }
}
