//! # SBC pin access
//!
//! The narrow hardware contract the smoker daemon runs against: one trait per
//! pin kind, with each pin claimed by exactly one component at construction.
//! The [`sysfs`] module implements the contract on the Linux sysfs GPIO, PWM,
//! and IIO interfaces; the [`mock`] module provides recording doubles so the
//! control stack can be exercised without a board.

use std::fmt;

pub mod mock;
pub mod sysfs;

/// A digital output level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => write!(f, "low"),
            Level::High => write!(f, "high"),
        }
    }
}

/// Errors raised by pin backends.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("{path}: {source}")]
    Sysfs {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid pin spec `{0}`: {1}")]
    PinSpec(String, &'static str),
    #[error("unreadable ADC sample `{0}`")]
    BadSample(String),
}

/// A single digital output pin, e.g. a solenoid driver.
pub trait DigitalOutput: Send + Sync {
    fn write(&self, level: Level) -> Result<(), IoError>;
}

/// A single PWM output channel.
pub trait PwmOutput: Send + Sync {
    /// Drives the channel at `duty_percent` (0-100) and `freq_hz`.
    fn start(&self, duty_percent: f64, freq_hz: f64) -> Result<(), IoError>;
    /// Stops the channel, leaving the line low.
    fn stop(&self) -> Result<(), IoError>;
}

/// A single ADC input channel.
pub trait AdcInput: Send + Sync {
    /// Reads the channel as a ratio of full scale, in `[0, 1)`.
    fn read(&self) -> Result<f64, IoError>;
}
