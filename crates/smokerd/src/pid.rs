//! The closed-loop blower driver.
//!
//! Wraps the pure [`thermal::Pid`] math with the daemon's state machine:
//! coefficients and setpoint arrive independently over the API, and the loop
//! only runs while both are present. When enabled, exactly one periodic tick
//! is armed at [`PID_INTERVAL`]; disabling cancels it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use thermal::pid::{Gains, Pid};

use crate::blower::Blower;
use crate::error::{Error, Result};
use crate::probe::Probe;
use crate::scheduler::{self, TimerHandle};

/// Time between PID evaluations. The pit is a slow plant; one adjustment a
/// minute is plenty.
pub const PID_INTERVAL: Duration = Duration::from_secs(60);

struct LoopState {
    gains: Option<Gains>,
    setpoint: Option<f64>,
    core: Option<Pid>,
    tick: Option<TimerHandle>,
}

/// Drives the blower from the pit probe.
pub struct PidLoop {
    blower: Arc<Blower>,
    pit: Arc<Probe>,
    state: Mutex<LoopState>,
}

impl PidLoop {
    pub fn new(blower: Arc<Blower>, pit: Arc<Probe>) -> Arc<Self> {
        Arc::new(Self {
            blower,
            pit,
            state: Mutex::new(LoopState {
                gains: None,
                setpoint: None,
                core: None,
                tick: None,
            }),
        })
    }

    pub fn coefficients(&self) -> Option<Gains> {
        self.state.lock().gains
    }

    /// Installs new coefficients; takes effect from the next tick.
    pub fn set_coefficients(&self, gains: Gains) {
        let mut state = self.state.lock();
        state.gains = Some(gains);
        if let Some(core) = state.core.as_mut() {
            core.gains = gains;
        }
    }

    pub fn setpoint(&self) -> Option<f64> {
        self.state.lock().setpoint
    }

    /// Retargets the loop and enables it with fresh integral and derivative
    /// state.
    pub fn set_setpoint(self: &Arc<Self>, setpoint: f64) -> Result<()> {
        if !setpoint.is_finite() || setpoint <= 32.0 {
            return Err(Error::Range(
                "setpoint temperature must be above freezing".to_string(),
            ));
        }

        let mut state = self.state.lock();
        state.setpoint = Some(setpoint);
        if let Some(core) = state.core.as_mut() {
            core.set_setpoint(setpoint);
        }
        self.enable_locked(&mut state)
    }

    /// Arms the periodic tick. Idempotent while enabled.
    pub fn enable(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state.lock();
        self.enable_locked(&mut state)
    }

    fn enable_locked(self: &Arc<Self>, state: &mut LoopState) -> Result<()> {
        if state.tick.is_some() {
            return Ok(());
        }

        let gains = state
            .gains
            .filter(Gains::is_complete)
            .ok_or_else(|| Error::Config("PID coefficients must be set before enabling".into()))?;
        let setpoint = state
            .setpoint
            .ok_or_else(|| Error::Config("temperature setpoint must be set before enabling".into()))?;

        let core = state.core.get_or_insert_with(|| Pid::new(gains, setpoint));
        core.reset();

        let pid = Arc::clone(self);
        state.tick = Some(scheduler::every(PID_INTERVAL, move || pid.tick()));
        Ok(())
    }

    /// Cancels the periodic tick. Idempotent.
    pub fn disable(&self) {
        self.state.lock().tick = None;
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().tick.is_some()
    }

    /// Overrides the loop with a fixed blower speed.
    pub fn set_manual_speed(&self, speed: u8) -> Result<()> {
        self.disable();
        self.blower.set_speed(speed)
    }

    fn tick(&self) {
        let mut state = self.state.lock();
        let Some(core) = state.core.as_mut() else {
            return;
        };

        let temp = match self.pit.get_temp() {
            Ok(temp) => temp,
            Err(err) => {
                warn!(%err, "skipping PID tick, pit probe not readable");
                return;
            }
        };
        let speed = self.blower.speed();

        let out = core.update(temp, f64::from(speed), PID_INTERVAL.as_secs_f64());
        let command = out.output as u8;
        debug!(
            pit_temp = temp,
            setpoint = core.setpoint(),
            p = out.p,
            i = out.i,
            d = out.d,
            speed = command,
            "PID tick"
        );
        drop(state);

        if let Err(err) = self.blower.set_speed(command) {
            warn!(%err, "failed to apply the PID output to the blower");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbc_io::mock::{MockAdc, MockPwm};
    use sbc_io::{AdcInput, PwmOutput};
    use thermal::SteinhartHart;

    const PRO_SERIES: SteinhartHart = SteinhartHart {
        a: 6.6853001e-04,
        b: 2.2231022e-04,
        c: 9.9680632e-08,
    };

    const GAINS: Gains = Gains {
        kp: 3.0,
        ki: 0.005,
        kd: 20.0,
    };

    fn rig(adc_ratio: f64) -> (Arc<PidLoop>, Arc<Blower>, Arc<MockAdc>) {
        let pwm = Arc::new(MockPwm::new());
        let blower = Blower::new(pwm as Arc<dyn PwmOutput>).unwrap();
        let adc = Arc::new(MockAdc::new(adc_ratio));
        let pit = Probe::new(Arc::clone(&adc) as Arc<dyn AdcInput>, PRO_SERIES).unwrap();
        let pid = PidLoop::new(Arc::clone(&blower), pit);
        (pid, blower, adc)
    }

    #[tokio::test(start_paused = true)]
    async fn enable_requires_coefficients_and_setpoint() {
        let (pid, _blower, _adc) = rig(0.5);

        assert!(matches!(pid.enable(), Err(Error::Config(_))));

        pid.set_coefficients(GAINS);
        assert!(matches!(pid.enable(), Err(Error::Config(_))));

        pid.set_setpoint(225.0).unwrap();
        assert!(pid.is_enabled());

        pid.disable();
        assert!(!pid.is_enabled());
        pid.disable();

        pid.enable().unwrap();
        assert!(pid.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_coefficients_are_incomplete() {
        let (pid, _blower, _adc) = rig(0.5);
        pid.set_coefficients(Gains::new(3.0, 0.0, 20.0));
        assert!(matches!(pid.set_setpoint(225.0), Err(Error::Config(_))));
        assert!(!pid.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn setpoint_must_be_above_freezing() {
        let (pid, _blower, _adc) = rig(0.5);
        pid.set_coefficients(GAINS);
        assert!(matches!(pid.set_setpoint(32.0), Err(Error::Range(_))));
        assert!(matches!(pid.set_setpoint(-10.0), Err(Error::Range(_))));
        assert!(!pid.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_drives_the_blower() {
        // 0.5 converts to ~184.6 F; 40 degrees under a 225 F setpoint, the
        // proportional term alone saturates the blower.
        let (pid, blower, _adc) = rig(0.5);
        pid.set_coefficients(GAINS);
        pid.set_setpoint(225.0).unwrap();
        assert_eq!(blower.speed(), 0);

        tokio::time::sleep(Duration::from_millis(60_500)).await;
        assert_eq!(blower.speed(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_loop_leaves_the_blower_alone() {
        let (pid, blower, _adc) = rig(0.5);
        pid.set_coefficients(GAINS);
        pid.set_setpoint(225.0).unwrap();
        pid.disable();

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(blower.speed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_skips_while_the_probe_is_not_ready() {
        let (pid, blower, _adc) = rig(1.0);
        pid.set_coefficients(GAINS);
        pid.set_setpoint(225.0).unwrap();

        tokio::time::sleep(Duration::from_millis(61_000)).await;
        assert_eq!(blower.speed(), 0);
        assert!(pid.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_speed_disables_the_loop() {
        let (pid, blower, _adc) = rig(0.5);
        pid.set_coefficients(GAINS);
        pid.set_setpoint(225.0).unwrap();

        pid.set_manual_speed(42).unwrap();
        assert!(!pid.is_enabled());
        assert_eq!(blower.speed(), 42);
    }
}
