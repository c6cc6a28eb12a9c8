//! Linux sysfs backends for the pin traits.
//!
//! Pin specs are the opaque strings from the daemon configuration:
//!
//! - GPIO: the kernel GPIO number, e.g. `"60"`
//! - PWM: `"<chip>:<channel>"` against `/sys/class/pwm`, e.g. `"0:0"`
//! - ADC: the IIO voltage channel number on device 0, e.g. `"0"`

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{AdcInput, DigitalOutput, IoError, Level, PwmOutput};

/// Full-scale counts of the on-board 12-bit ADC.
const ADC_COUNTS: f64 = 4096.0;

fn write_attr(path: &Path, value: &str) -> Result<(), IoError> {
    fs::write(path, value).map_err(|source| IoError::Sysfs {
        path: path.display().to_string(),
        source,
    })
}

fn read_attr(path: &Path) -> Result<String, IoError> {
    fs::read_to_string(path).map_err(|source| IoError::Sysfs {
        path: path.display().to_string(),
        source,
    })
}

/// A GPIO pin exported through `/sys/class/gpio` and configured as an output.
pub struct SysfsGpio {
    value_path: PathBuf,
}

impl SysfsGpio {
    /// Claims `spec` (a kernel GPIO number) as an output pin.
    pub fn open_output(spec: &str) -> Result<Self, IoError> {
        let pin: u32 = spec
            .trim()
            .parse()
            .map_err(|_| IoError::PinSpec(spec.to_string(), "expected a GPIO number"))?;

        let base = PathBuf::from("/sys/class/gpio");
        let dir = base.join(format!("gpio{pin}"));
        if !dir.exists() {
            write_attr(&base.join("export"), &pin.to_string())?;
        }
        write_attr(&dir.join("direction"), "out")?;

        debug!(pin, "claimed GPIO output");
        Ok(Self {
            value_path: dir.join("value"),
        })
    }
}

impl DigitalOutput for SysfsGpio {
    fn write(&self, level: Level) -> Result<(), IoError> {
        let value = match level {
            Level::Low => "0",
            Level::High => "1",
        };
        write_attr(&self.value_path, value)
    }
}

fn parse_pwm_spec(spec: &str) -> Result<(u32, u32), IoError> {
    let (chip, channel) = spec
        .split_once(':')
        .ok_or_else(|| IoError::PinSpec(spec.to_string(), "expected `<chip>:<channel>`"))?;
    let chip = chip
        .trim()
        .parse()
        .map_err(|_| IoError::PinSpec(spec.to_string(), "chip is not a number"))?;
    let channel = channel
        .trim()
        .parse()
        .map_err(|_| IoError::PinSpec(spec.to_string(), "channel is not a number"))?;
    Ok((chip, channel))
}

/// A PWM channel exported through `/sys/class/pwm`.
pub struct SysfsPwm {
    dir: PathBuf,
}

impl SysfsPwm {
    /// Claims `spec` (`"<chip>:<channel>"`) as a PWM output.
    pub fn open(spec: &str) -> Result<Self, IoError> {
        let (chip, channel) = parse_pwm_spec(spec)?;

        let chip_dir = PathBuf::from(format!("/sys/class/pwm/pwmchip{chip}"));
        let dir = chip_dir.join(format!("pwm{channel}"));
        if !dir.exists() {
            write_attr(&chip_dir.join("export"), &channel.to_string())?;
        }

        debug!(chip, channel, "claimed PWM channel");
        Ok(Self { dir })
    }
}

impl PwmOutput for SysfsPwm {
    fn start(&self, duty_percent: f64, freq_hz: f64) -> Result<(), IoError> {
        let period_ns = (1e9 / freq_hz).round() as u64;
        let duty = duty_percent.clamp(0.0, 100.0);
        let duty_ns = (period_ns as f64 * duty / 100.0).round() as u64;

        // The kernel rejects duty_cycle > period, so the duty must be cleared
        // before the period moves.
        write_attr(&self.dir.join("duty_cycle"), "0")?;
        write_attr(&self.dir.join("period"), &period_ns.to_string())?;
        write_attr(&self.dir.join("duty_cycle"), &duty_ns.to_string())?;
        write_attr(&self.dir.join("enable"), "1")
    }

    fn stop(&self) -> Result<(), IoError> {
        write_attr(&self.dir.join("enable"), "0")
    }
}

/// An IIO ADC voltage channel.
pub struct IioAdc {
    raw_path: PathBuf,
}

impl IioAdc {
    /// Claims `spec` (a voltage channel number) on IIO device 0.
    pub fn open(spec: &str) -> Result<Self, IoError> {
        let channel: u32 = spec
            .trim()
            .parse()
            .map_err(|_| IoError::PinSpec(spec.to_string(), "expected an ADC channel number"))?;

        let raw_path = PathBuf::from(format!(
            "/sys/bus/iio/devices/iio:device0/in_voltage{channel}_raw"
        ));
        // Probe the channel once so a bad pin fails at startup, not mid-cook.
        read_attr(&raw_path)?;

        debug!(channel, "claimed ADC channel");
        Ok(Self { raw_path })
    }
}

impl AdcInput for IioAdc {
    fn read(&self) -> Result<f64, IoError> {
        let text = read_attr(&self.raw_path)?;
        let raw: f64 = text
            .trim()
            .parse()
            .map_err(|_| IoError::BadSample(text.trim().to_string()))?;
        Ok(raw / ADC_COUNTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pwm_spec_parses_chip_and_channel() {
        assert_eq!(parse_pwm_spec("0:0").unwrap(), (0, 0));
        assert_eq!(parse_pwm_spec("2:1").unwrap(), (2, 1));
        assert_eq!(parse_pwm_spec(" 1 : 3 ").unwrap(), (1, 3));
    }

    #[test]
    fn pwm_spec_rejects_garbage() {
        assert!(parse_pwm_spec("P9_14").is_err());
        assert!(parse_pwm_spec("1").is_err());
        assert!(parse_pwm_spec("a:b").is_err());
    }
}
