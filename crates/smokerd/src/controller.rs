//! The top-level cook controller.
//!
//! Owns the PID loop, the time-varying cook profile that feeds its setpoint,
//! the manual-override state machine, and the minute-by-minute stat history
//! that warm-starts remote clients.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use thermal::pid::Gains;

use crate::blower::Blower;
use crate::error::{Error, Result};
use crate::pid::PidLoop;
use crate::probe::Probe;
use crate::scheduler::{self, TimerHandle};

/// Cadence of profile re-evaluation and stat recording.
const MINUTE: Duration = Duration::from_secs(60);

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookState {
    /// No profile has ever been set.
    Uninitialized,
    /// The cook profile drives the setpoint.
    ProfileRunning,
    /// An operator-chosen setpoint holds; the profile clock keeps running
    /// underneath so a resume lands on the right minute.
    Override,
}

/// One minute's snapshot of the cook.
#[derive(Debug, Clone, PartialEq)]
pub struct StatPoint {
    pub pit_temp: f64,
    pub setpoint: f64,
    pub blower_speed: u8,
    pub food_temps: Vec<f64>,
}

struct ControllerState {
    profile: BTreeMap<u32, f64>,
    profile_start: Option<Instant>,
    cook_state: CookState,
    stats: BTreeMap<u32, StatPoint>,
    profile_tick: Option<TimerHandle>,
    stats_tick: Option<TimerHandle>,
}

/// Top-level controller. One per cooker.
pub struct Controller {
    pid: Arc<PidLoop>,
    blower: Arc<Blower>,
    pit: Arc<Probe>,
    food: Vec<Arc<Probe>>,
    state: Mutex<ControllerState>,
}

impl Controller {
    pub fn new(blower: Arc<Blower>, pit: Arc<Probe>, food: Vec<Arc<Probe>>) -> Arc<Self> {
        let pid = PidLoop::new(Arc::clone(&blower), Arc::clone(&pit));
        Arc::new(Self {
            pid,
            blower,
            pit,
            food,
            state: Mutex::new(ControllerState {
                profile: BTreeMap::new(),
                profile_start: None,
                cook_state: CookState::Uninitialized,
                stats: BTreeMap::new(),
                profile_tick: None,
                stats_tick: None,
            }),
        })
    }

    pub fn get_state(&self) -> CookState {
        self.state.lock().cook_state
    }

    pub fn get_setpoint(&self) -> Option<f64> {
        self.pid.setpoint()
    }

    pub fn get_pid_coefficients(&self) -> Option<Gains> {
        self.pid.coefficients()
    }

    pub fn set_pid_coefficients(&self, gains: Gains) {
        self.pid.set_coefficients(gains);
    }

    /// Starts a cook on `profile`, a map of minute offsets to setpoints.
    ///
    /// The profile must define minute 0 and every temperature must be above
    /// freezing. The profile clock restarts, the stat history is cleared and
    /// re-seeded with a minute-0 point, and the setpoint applies immediately.
    pub fn set_profile(self: &Arc<Self>, profile: BTreeMap<u32, f64>) -> Result<()> {
        if !profile.contains_key(&0) {
            return Err(Error::Config(
                "cook profile must define a setpoint for minute 0".to_string(),
            ));
        }
        if let Some((minute, temp)) = profile.iter().find(|(_, temp)| **temp <= 32.0) {
            return Err(Error::Range(format!(
                "profile temperature {temp} at minute {minute} must be above freezing"
            )));
        }

        let mut state = self.state.lock();
        state.profile_tick = None;
        state.stats_tick = None;
        state.profile = profile;
        state.profile_start = Some(Instant::now());

        self.apply_profile_setpoint(&mut state)?;
        self.arm_profile_tick(&mut state);
        self.arm_stats_tick(&mut state);

        state.stats.clear();
        self.record_stat(&mut state);
        state.cook_state = CookState::ProfileRunning;
        info!("cook profile set");
        Ok(())
    }

    /// Holds the setpoint at `temperature` and pauses profile updates.
    ///
    /// Stats keep recording during an override.
    pub fn override_temp(&self, temperature: f64) -> Result<()> {
        let mut state = self.state.lock();
        // Validate through the PID first so a rejected override leaves the
        // profile schedule running.
        self.pid.set_setpoint(temperature)?;
        state.profile_tick = None;
        state.cook_state = CookState::Override;
        info!(temperature, "manual override engaged");
        Ok(())
    }

    /// Hands the setpoint back to the cook profile at its current minute.
    pub fn resume_profile(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state.lock();
        state.profile_tick = None;
        self.apply_profile_setpoint(&mut state)?;
        self.arm_profile_tick(&mut state);
        state.cook_state = CookState::ProfileRunning;
        info!("cook profile resumed");
        Ok(())
    }

    /// The stat history, thinned to every `sample_rate_min` minutes.
    pub fn get_stat_history(&self, sample_rate_min: u32) -> BTreeMap<u32, StatPoint> {
        let rate = sample_rate_min.max(1);
        self.state
            .lock()
            .stats
            .iter()
            .filter(|(minute, _)| *minute % rate == 0)
            .map(|(minute, point)| (*minute, point.clone()))
            .collect()
    }

    /// Applies the profile step for the current minute, if it differs from
    /// the live setpoint. Retargeting resets the PID integral, so this is
    /// deliberately a no-op while the setpoint already matches.
    fn apply_profile_setpoint(&self, state: &mut ControllerState) -> Result<()> {
        let start = state
            .profile_start
            .ok_or_else(|| Error::Config("no cook profile has been set".to_string()))?;
        let offset_min = start.elapsed().as_secs_f64() / 60.0;
        let cutoff = offset_min.floor() as u32;

        // Minute 0 is always present, so a step always matches.
        let Some((_, target)) = state.profile.range(..=cutoff).next_back() else {
            return Ok(());
        };
        let target = *target;

        if self.pid.setpoint() != Some(target) {
            self.pid.set_setpoint(target)?;
            info!(setpoint = target, "setpoint updated from cook profile");
        }
        Ok(())
    }

    fn arm_profile_tick(self: &Arc<Self>, state: &mut ControllerState) {
        let controller = Arc::clone(self);
        state.profile_tick = Some(scheduler::every(MINUTE, move || {
            let mut state = controller.state.lock();
            if let Err(err) = controller.apply_profile_setpoint(&mut state) {
                warn!(%err, "profile update failed");
            }
        }));
    }

    fn arm_stats_tick(self: &Arc<Self>, state: &mut ControllerState) {
        let controller = Arc::clone(self);
        state.stats_tick = Some(scheduler::every(MINUTE, move || {
            let mut state = controller.state.lock();
            controller.record_stat(&mut state);
        }));
    }

    /// Appends one stat point at the next minute index.
    fn record_stat(&self, state: &mut ControllerState) {
        let pit_temp = match self.pit.get_temp() {
            Ok(temp) => temp,
            Err(err) => {
                warn!(%err, "skipping stat point, pit probe not readable");
                return;
            }
        };
        let Some(setpoint) = self.pid.setpoint() else {
            warn!("skipping stat point, no setpoint configured");
            return;
        };
        let mut food_temps = Vec::with_capacity(self.food.len());
        for probe in &self.food {
            match probe.get_temp() {
                Ok(temp) => food_temps.push(temp),
                Err(err) => {
                    warn!(%err, "skipping stat point, food probe not readable");
                    return;
                }
            }
        }

        let minute = state
            .stats
            .last_key_value()
            .map(|(minute, _)| minute + 1)
            .unwrap_or(0);
        state.stats.insert(
            minute,
            StatPoint {
                pit_temp,
                setpoint,
                blower_speed: self.blower.speed(),
                food_temps,
            },
        );
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

    fn rig() -> Arc<Controller> {
        let pwm = Arc::new(MockPwm::new());
        let blower = Blower::new(pwm as Arc<dyn PwmOutput>).unwrap();
        let pit_adc = Arc::new(MockAdc::new(0.5)) as Arc<dyn AdcInput>;
        let pit = Probe::new(pit_adc, PRO_SERIES).unwrap();
        let food_adc = Arc::new(MockAdc::new(0.55)) as Arc<dyn AdcInput>;
        let food = vec![Probe::new(food_adc, PRO_SERIES).unwrap()];

        let controller = Controller::new(blower, pit, food);
        controller.set_pid_coefficients(Gains::new(3.0, 0.005, 20.0));
        controller
    }

    fn profile(steps: &[(u32, f64)]) -> BTreeMap<u32, f64> {
        steps.iter().copied().collect()
    }

    #[tokio::test(start_paused = true)]
    async fn profile_must_define_minute_zero() {
        let controller = rig();
        let err = controller.set_profile(profile(&[(60, 225.0)]));
        assert!(matches!(err, Err(Error::Config(_))));
        assert_eq!(controller.get_state(), CookState::Uninitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn profile_temperatures_must_be_above_freezing() {
        let controller = rig();
        let err = controller.set_profile(profile(&[(0, 225.0), (60, 20.0)]));
        assert!(matches!(err, Err(Error::Range(_))));
        assert_eq!(controller.get_state(), CookState::Uninitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn set_profile_applies_the_minute_zero_setpoint() {
        let controller = rig();
        controller
            .set_profile(profile(&[(0, 225.0), (60, 250.0)]))
            .unwrap();

        assert_eq!(controller.get_state(), CookState::ProfileRunning);
        assert_eq!(controller.get_setpoint(), Some(225.0));

        // The initial stat point is recorded at minute 0.
        let history = controller.get_stat_history(1);
        assert_eq!(history.len(), 1);
        let point = &history[&0];
        assert_eq!(point.setpoint, 225.0);
        assert_eq!(point.blower_speed, 0);
        assert_eq!(point.food_temps.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn profile_advances_with_the_clock() {
        let controller = rig();
        controller
            .set_profile(profile(&[(0, 225.0), (1, 250.0), (3, 275.0)]))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(60_500)).await;
        assert_eq!(controller.get_setpoint(), Some(250.0));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(controller.get_setpoint(), Some(250.0));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(controller.get_setpoint(), Some(275.0));
    }

    #[tokio::test(start_paused = true)]
    async fn override_round_trip() {
        let controller = rig();
        controller
            .set_profile(profile(&[(0, 225.0), (1, 250.0)]))
            .unwrap();

        controller.override_temp(275.0).unwrap();
        assert_eq!(controller.get_state(), CookState::Override);
        assert_eq!(controller.get_setpoint(), Some(275.0));

        // The profile tick is paused: a minute later the override still
        // holds, while stats kept recording.
        tokio::time::sleep(Duration::from_millis(61_000)).await;
        assert_eq!(controller.get_setpoint(), Some(275.0));
        assert_eq!(controller.get_stat_history(1).len(), 2);

        controller.resume_profile().unwrap();
        assert_eq!(controller.get_state(), CookState::ProfileRunning);
        assert_eq!(controller.get_setpoint(), Some(250.0));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_override_keeps_the_profile_running() {
        let controller = rig();
        controller.set_profile(profile(&[(0, 225.0), (1, 250.0)])).unwrap();

        assert!(matches!(
            controller.override_temp(30.0),
            Err(Error::Range(_))
        ));
        assert_eq!(controller.get_state(), CookState::ProfileRunning);

        tokio::time::sleep(Duration::from_millis(60_500)).await;
        assert_eq!(controller.get_setpoint(), Some(250.0));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_without_a_profile_is_rejected() {
        let controller = rig();
        assert!(matches!(
            controller.resume_profile(),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stats_accumulate_contiguously() {
        let controller = rig();
        controller.set_profile(profile(&[(0, 225.0)])).unwrap();

        tokio::time::sleep(Duration::from_millis(185_000)).await;
        let history = controller.get_stat_history(1);
        assert_eq!(history.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);

        let thinned = controller.get_stat_history(2);
        assert_eq!(thinned.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn new_profile_clears_the_stat_history() {
        let controller = rig();
        controller.set_profile(profile(&[(0, 225.0)])).unwrap();
        tokio::time::sleep(Duration::from_millis(125_000)).await;
        assert_eq!(controller.get_stat_history(1).len(), 3);

        controller.set_profile(profile(&[(0, 250.0)])).unwrap();
        let history = controller.get_stat_history(1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[&0].setpoint, 250.0);
    }
}
