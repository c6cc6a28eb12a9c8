//! # smokerd
//!
//! The daemon entry point: loads the JSON configuration, claims the hardware
//! pins, wires the control stack together, seeds the initial cook profile,
//! and serves the HTTP/WebSocket API until shutdown.

// Use mimalloc for better performance on the small SBC cores.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use tracing::info;

use sbc_io::sysfs::{IioAdc, SysfsGpio, SysfsPwm};
use sbc_io::{AdcInput, DigitalOutput, PwmOutput};
use thermal::pid::Gains;
use thermal::SteinhartHart;

use smokerd::api::{self, AppState};
use smokerd::baster::Baster;
use smokerd::blower::Blower;
use smokerd::config::{Config, ProbeConfig};
use smokerd::controller::Controller;
use smokerd::probe::Probe;

/// Pit temperature automation for a charcoal smoker.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration JSON; the bundled default is used if absent.
    config_path: Option<PathBuf>,
}

fn open_probe(config: &ProbeConfig) -> Result<Arc<Probe>> {
    let adc = Arc::new(IioAdc::open(&config.pin)?) as Arc<dyn AdcInput>;
    let model = SteinhartHart::new(config.sh_a, config.sh_b, config.sh_c);
    Probe::new(adc, model).with_context(|| format!("failed to start probe on pin {}", config.pin))
}

#[actix_rt::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config_path {
        Some(path) => Config::load(path)?,
        None => Config::bundled()?,
    };

    tracing_subscriber::fmt()
        .with_max_level(config.logging.tracing_level()?)
        .init();

    info!("starting smokerd");

    // --- Hardware ---

    let blower = Blower::new(Arc::new(SysfsPwm::open(&config.blower.pin)?) as Arc<dyn PwmOutput>)
        .context("failed to start the blower")?;
    let baster =
        Baster::new(Arc::new(SysfsGpio::open_output(&config.baster.pin)?) as Arc<dyn DigitalOutput>)
            .context("failed to start the baster")?;

    let pit = open_probe(&config.pit_probe)?;
    let mut food = Vec::with_capacity(config.food_probes.len());
    for probe_config in &config.food_probes {
        food.push(open_probe(probe_config)?);
    }
    let food_alarms = Arc::new(Mutex::new(vec![None; food.len()]));

    // --- Control stack ---

    let controller = Controller::new(Arc::clone(&blower), Arc::clone(&pit), food.clone());
    controller.set_pid_coefficients(Gains::new(
        config.pid_coefficients.k_p,
        config.pid_coefficients.k_i,
        config.pid_coefficients.k_d,
    ));
    controller.set_profile(BTreeMap::from([(0, config.initial_setpoint)]))?;

    // --- API server ---

    let app_state = AppState {
        controller,
        blower,
        baster,
        pit,
        food,
        food_alarms,
    };
    let server = api::start_api_server(config.server.port, app_state)?;
    info!(port = config.server.port, "API server started");

    tokio::select! {
        _ = server => {
            info!("API server shut down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, exiting");
        }
    }

    Ok(())
}
