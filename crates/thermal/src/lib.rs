//! # Thermal Control Math
//!
//! `thermal` holds the pure math behind the smoker daemon: converting raw ADC
//! readings into pit temperatures, smoothing those readings, and turning the
//! smoothed temperature into a blower command.
//!
//! Nothing in this crate touches hardware or timers; every type is a plain
//! value that the daemon steps from its own scheduler. That keeps the control
//! behavior testable without a pit, a probe, or a clock.
//!
//! - **Thermistor model**: Steinhart–Hart conversion from a voltage-divider
//!   ratio to degrees Fahrenheit.
//! - **Signal filtering**: exponential moving average over probe samples.
//! - **PID controller**: the pit controller with saturation-aware anti-windup
//!   and an asymmetric integral drain while overshooting.

pub mod filter;
pub mod pid;
pub mod thermistor;

// Re-export key types
pub use filter::Ema;
pub use pid::{Gains, Pid, PidOutput};
pub use thermistor::SteinhartHart;
