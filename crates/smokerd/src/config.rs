//! Daemon configuration.
//!
//! Loaded once at startup from a JSON file; a default configuration is
//! bundled into the binary for running without arguments. Pin specs are
//! opaque strings interpreted by the `sbc-io` backend (see its `sysfs`
//! module for the formats).

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::Level;

/// The configuration bundled into the binary.
const DEFAULT_CONFIG: &str = include_str!("../skel/config.json");

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl LoggingConfig {
    /// Maps the configured level name onto a tracing level.
    ///
    /// The names follow the original stdlib-logging scheme; tracing has no
    /// CRITICAL, so it logs as ERROR.
    pub fn tracing_level(&self) -> Result<Level> {
        Ok(match self.level.as_str() {
            "DEBUG" => Level::DEBUG,
            "INFO" => Level::INFO,
            "WARNING" => Level::WARN,
            "ERROR" => Level::ERROR,
            "CRITICAL" => Level::ERROR,
            other => bail!("unknown logging level {other:?}"),
        })
    }
}

/// A bare actuator pin.
#[derive(Debug, Clone, Deserialize)]
pub struct PinConfig {
    pub pin: String,
}

/// A probe pin plus its Steinhart-Hart coefficients.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    pub pin: String,
    pub sh_a: f64,
    pub sh_b: f64,
    pub sh_c: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PidConfig {
    pub k_p: f64,
    pub k_i: f64,
    pub k_d: f64,
}

/// The whole startup configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub blower: PinConfig,
    pub baster: PinConfig,
    pub pit_probe: ProbeConfig,
    pub food_probes: Vec<ProbeConfig>,
    pub pid_coefficients: PidConfig,
    pub initial_setpoint: f64,
}

impl Config {
    /// Loads and parses a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse configuration file {}", path.display()))
    }

    /// The configuration bundled into the binary, used when no path is given.
    pub fn bundled() -> Result<Self> {
        serde_json::from_str(DEFAULT_CONFIG).context("bundled default configuration is invalid")
    }
}
