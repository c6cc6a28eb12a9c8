//! The pit PID controller.
//!
//! Maps the error between the pit setpoint and the smoothed pit temperature
//! to a blower speed in 0-100. The caller owns the cadence: it reads the
//! probe, asks for an [`Pid::update`], and writes the result to the blower.

/// Factor applied to the accumulated integral on every step taken at or
/// above the setpoint. The blower can only push the pit hotter, so overshoot
/// has to be corrected by draining the integral instead of reversing it.
const HOT_INTEGRAL_LEAK: f64 = 0.10;

/// The three PID coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Gains {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain.
    pub ki: f64,
    /// Derivative gain.
    pub kd: f64,
}

impl Gains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }

    /// Whether every coefficient has been given a non-zero value.
    pub fn is_complete(&self) -> bool {
        self.kp != 0.0 && self.ki != 0.0 && self.kd != 0.0
    }
}

/// The three terms of one PID step plus the blower command they produced.
#[derive(Debug, Clone, Copy)]
pub struct PidOutput {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    /// Blower speed, already clamped to `[0, 100]` and truncated toward zero.
    pub output: f64,
}

/// PID state for the pit loop.
#[derive(Debug, Clone, Copy)]
pub struct Pid {
    pub gains: Gains,
    setpoint: f64,
    integral: f64,
    previous_error: Option<f64>,
}

impl Pid {
    /// Creates a controller with fresh integral and derivative state.
    pub fn new(gains: Gains, setpoint: f64) -> Self {
        Self {
            gains,
            setpoint,
            integral: 0.0,
            previous_error: None,
        }
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Retargets the controller and resets its accumulated state.
    ///
    /// A setpoint change invalidates both the integral (accumulated against
    /// the old target) and the previous error (the next derivative would
    /// otherwise spike on the setpoint step).
    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
        self.reset();
    }

    /// Clears the integral and the previous error.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = None;
    }

    /// The accumulated integral, in degree-seconds.
    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Advances the controller by one step of `dt` seconds.
    ///
    /// `measured` is the current pit temperature and `actuator` the blower
    /// speed currently in effect (0-100). The integral only accumulates while
    /// the blower can still act on the error: not upward at 100, not downward
    /// at 0.
    pub fn update(&mut self, measured: f64, actuator: f64, dt: f64) -> PidOutput {
        let error = self.setpoint - measured;

        if measured >= self.setpoint {
            self.integral *= HOT_INTEGRAL_LEAK;
        }

        let p = self.gains.kp * error;

        if (error > 0.0 && actuator < 100.0) || (error < 0.0 && actuator > 0.0) {
            self.integral += error * dt;
        }
        let i = self.gains.ki * self.integral;

        let d = match self.previous_error {
            Some(previous) => self.gains.kd * (error - previous) / dt,
            None => 0.0,
        };

        self.previous_error = Some(error);

        let output = (p + i + d).clamp(0.0, 100.0).trunc();
        PidOutput { p, i, d, output }
    }
}
