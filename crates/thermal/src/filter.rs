//! Probe signal smoothing.
//!
//! Raw thermistor samples bounce around with airflow and electrical noise, so
//! the probes feed an exponential moving average to the rest of the system.

/// An exponential moving average.
///
/// `output = output + alpha * (sample - output)`. The filter starts unset and
/// snaps to the first sample, so there is no warm-up transient from an
/// arbitrary initial value.
#[derive(Debug, Clone, Copy)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    /// Creates a new `Ema`.
    ///
    /// `alpha` is the smoothing factor in `(0, 1]`: smaller means smoother
    /// but slower to follow the pit.
    pub fn new(alpha: f64) -> Self {
        debug_assert!(alpha > 0.0 && alpha <= 1.0);
        Self { alpha, value: None }
    }

    /// The weight that gives an EMA roughly a `window_s`-second memory when
    /// fed one sample every `period_s` seconds.
    pub fn alpha_for_window(period_s: f64, window_s: f64) -> f64 {
        2.0 / (window_s / period_s + 1.0)
    }

    /// Folds a new sample into the average and returns the updated value.
    pub fn update(&mut self, sample: f64) -> f64 {
        let next = match self.value {
            Some(value) => value + self.alpha * (sample - value),
            None => sample,
        };
        self.value = Some(next);
        next
    }

    /// The current smoothed value, or `None` before the first sample.
    pub fn value(&self) -> Option<f64> {
        self.value
    }
}
