//! Temperature probes.
//!
//! Each probe owns one ADC channel and samples it every [`SAMPLE_PERIOD`],
//! feeding an EMA so the PID loop and the UI see a smoothed temperature
//! instead of raw divider noise.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use sbc_io::AdcInput;
use thermal::{Ema, SteinhartHart};

use crate::error::{Error, Result};
use crate::scheduler::{self, TimerHandle};

/// Time between ADC samples.
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(3);

/// Effective smoothing window fed to the EMA, in seconds.
const EMA_WINDOW_S: f64 = 60.0;

struct ProbeState {
    ema: Ema,
    last_raw: Option<f64>,
}

/// A thermistor probe, sampled continuously for the life of the process.
pub struct Probe {
    state: Arc<Mutex<ProbeState>>,
    _sampler: TimerHandle,
}

impl Probe {
    /// Claims the ADC channel and starts sampling.
    ///
    /// One sample is taken inline so a dead converter fails startup rather
    /// than the first cook minute. A rail reading on that first sample is
    /// tolerated; `get_temp` reports `NotReady` until a good one lands.
    pub fn new(adc: Arc<dyn AdcInput>, model: SteinhartHart) -> Result<Arc<Self>> {
        let alpha = Ema::alpha_for_window(SAMPLE_PERIOD.as_secs_f64(), EMA_WINDOW_S);
        let state = Arc::new(Mutex::new(ProbeState {
            ema: Ema::new(alpha),
            last_raw: None,
        }));

        let first = adc.read()?;
        sample(&model, &state, first);

        let sampler = {
            let state = Arc::clone(&state);
            scheduler::every(SAMPLE_PERIOD, move || match adc.read() {
                Ok(ratio) => sample(&model, &state, ratio),
                Err(err) => warn!(%err, "ADC read failed, skipping sample"),
            })
        };

        Ok(Arc::new(Self {
            state,
            _sampler: sampler,
        }))
    }

    /// The smoothed probe temperature in degrees Fahrenheit.
    pub fn get_temp(&self) -> Result<f64> {
        self.state.lock().ema.value().ok_or(Error::NotReady)
    }

    /// The most recent raw divider ratio, good or not.
    pub fn last_raw(&self) -> Option<f64> {
        self.state.lock().last_raw
    }
}

fn sample(model: &SteinhartHart, state: &Mutex<ProbeState>, ratio: f64) {
    let mut state = state.lock();
    state.last_raw = Some(ratio);
    match model.ratio_to_fahrenheit(ratio) {
        Some(temp) => {
            state.ema.update(temp);
        }
        None => warn!(ratio, "probe reading outside the divider range, skipping sample"),
    }
}
