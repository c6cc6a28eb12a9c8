//! The baste solenoid.
//!
//! Opens a solenoid valve for a configured burst at a configured cadence to
//! mop the food. The solenoid must never latch open: every path that raises
//! the pin also schedules the close.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use sbc_io::{DigitalOutput, Level};

use crate::error::{Error, Result};
use crate::scheduler::{self, TimerHandle};

struct BasterState {
    frequency_min: f64,
    duration_s: f64,
    periodic: Option<TimerHandle>,
    off_timer: Option<TimerHandle>,
}

/// The baster actuator. Owns one GPIO pin.
pub struct Baster {
    gpio: Arc<dyn DigitalOutput>,
    state: Mutex<BasterState>,
}

impl Baster {
    /// Claims the solenoid pin and drives it closed.
    pub fn new(gpio: Arc<dyn DigitalOutput>) -> Result<Arc<Self>> {
        gpio.write(Level::Low)?;
        Ok(Arc::new(Self {
            gpio,
            state: Mutex::new(BasterState {
                frequency_min: 0.0,
                duration_s: 0.0,
                periodic: None,
                off_timer: None,
            }),
        }))
    }

    /// Current `(frequency_min, duration_s)` settings.
    pub fn settings(&self) -> (f64, f64) {
        let state = self.state.lock();
        (state.frequency_min, state.duration_s)
    }

    /// Bastes for `duration_s` seconds every `frequency_min` minutes.
    ///
    /// A zero frequency disables basting. Any running cycle is cancelled and
    /// the solenoid driven closed before the new schedule takes over; a
    /// non-zero frequency bastes once immediately.
    pub fn config(self: &Arc<Self>, frequency_min: f64, duration_s: f64) -> Result<()> {
        if !frequency_min.is_finite() || frequency_min < 0.0 {
            return Err(Error::Range(format!(
                "baste frequency must be >= 0 minutes, got {frequency_min}"
            )));
        }
        if !duration_s.is_finite() || duration_s <= 0.0 {
            return Err(Error::Range(format!(
                "baste duration must be > 0 seconds, got {duration_s}"
            )));
        }

        let mut state = self.state.lock();
        state.periodic = None;
        state.off_timer = None;
        state.frequency_min = frequency_min;
        state.duration_s = duration_s;
        self.gpio.write(Level::Low)?;

        if frequency_min > 0.0 {
            let baster = Arc::clone(self);
            state.periodic = Some(scheduler::every(
                Duration::from_secs_f64(frequency_min * 60.0),
                move || {
                    let mut state = baster.state.lock();
                    baster.baste(&mut state);
                },
            ));
            self.baste(&mut state);
        }

        info!(frequency_min, duration_s, "baster configured");
        Ok(())
    }

    /// Opens the solenoid and schedules it closed after the configured burst.
    fn baste(self: &Arc<Self>, state: &mut BasterState) {
        state.off_timer = None;
        if let Err(err) = self.gpio.write(Level::High) {
            warn!(%err, "failed to open the baste solenoid");
            return;
        }
        debug!("baste on");

        let baster = Arc::clone(self);
        state.off_timer = Some(scheduler::after(
            Duration::from_secs_f64(state.duration_s),
            move || {
                if let Err(err) = baster.gpio.write(Level::Low) {
                    warn!(%err, "failed to close the baste solenoid");
                }
                debug!("baste off");
                baster.state.lock().off_timer = None;
            },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbc_io::mock::MockGpio;

    fn rig() -> (Arc<Baster>, Arc<MockGpio>) {
        let gpio = Arc::new(MockGpio::new());
        let baster = Baster::new(Arc::clone(&gpio) as Arc<dyn DigitalOutput>).unwrap();
        (baster, gpio)
    }

    #[test]
    fn construction_closes_the_solenoid() {
        let (baster, gpio) = rig();
        assert_eq!(gpio.level(), Some(Level::Low));
        assert_eq!(baster.settings(), (0.0, 0.0));
    }

    #[test]
    fn rejects_invalid_settings() {
        let (baster, gpio) = rig();
        assert!(matches!(baster.config(-1.0, 10.0), Err(Error::Range(_))));
        assert!(matches!(baster.config(2.0, 0.0), Err(Error::Range(_))));
        assert!(matches!(baster.config(2.0, -3.0), Err(Error::Range(_))));
        assert_eq!(baster.settings(), (0.0, 0.0));
        assert_eq!(gpio.level(), Some(Level::Low));
    }

    #[tokio::test(start_paused = true)]
    async fn baste_cycle_runs_on_schedule() {
        let (baster, gpio) = rig();

        // Every 2 minutes, 10 s per baste; the first baste is immediate.
        baster.config(2.0, 10.0).unwrap();
        assert_eq!(baster.settings(), (2.0, 10.0));
        assert_eq!(gpio.level(), Some(Level::High));

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(gpio.level(), Some(Level::Low));

        tokio::time::sleep(Duration::from_millis(110_000)).await;
        assert_eq!(gpio.level(), Some(Level::High));

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(gpio.level(), Some(Level::Low));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_frequency_disables_basting() {
        let (baster, gpio) = rig();
        baster.config(2.0, 10.0).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        baster.config(0.0, 5.0).unwrap();
        assert_eq!(gpio.level(), Some(Level::Low));
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(gpio.level(), Some(Level::Low));
        assert_eq!(baster.settings(), (0.0, 5.0));
    }

    #[tokio::test(start_paused = true)]
    async fn reconfigure_replaces_the_running_cycle() {
        let (baster, gpio) = rig();
        baster.config(2.0, 10.0).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        // Mid-baste reconfigure: closed, then immediately basting on the new
        // duration.
        baster.config(5.0, 3.0).unwrap();
        assert_eq!(gpio.level(), Some(Level::High));
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(gpio.level(), Some(Level::Low));

        // The old 2-minute cadence is gone (it would fire at t = 120 s)...
        tokio::time::sleep(Duration::from_millis(121_500)).await;
        assert_eq!(gpio.level(), Some(Level::Low));

        // ...and the new 5-minute cadence fires at t = 305 s.
        tokio::time::sleep(Duration::from_millis(176_000)).await;
        assert_eq!(gpio.level(), Some(Level::High));
    }
}
