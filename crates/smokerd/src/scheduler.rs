//! One-shot and periodic timers on the tokio runtime.
//!
//! Every background cadence in the daemon (probe sampling, PID ticks,
//! profile updates, baste cycles) goes through these two functions, so each
//! is held as a [`TimerHandle`] and dies with its owner.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// A cancellable handle to a scheduled callback.
///
/// Dropping the handle cancels the timer. A fire that has been delivered but
/// whose callback has not started yet is suppressed by cancellation; a
/// callback already running completes.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Runs `f` once, `delay` from now.
pub fn after<F>(delay: Duration, f: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    let task = tokio::spawn(async move {
        time::sleep(delay).await;
        f();
    });
    TimerHandle { task }
}

/// Runs `f` every `period`, first firing one period from now.
///
/// Cadence is best-effort: a late tick delays the following ones rather than
/// bunching them up.
pub fn every<F>(period: Duration, mut f: F) -> TimerHandle
where
    F: FnMut() + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticks = time::interval_at(time::Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            f();
        }
    });
    TimerHandle { task }
}
