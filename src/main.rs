use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use wind_charge_controller::config::Config;
#[cfg(feature = "sim")]
use wind_charge_controller::domain::LoadState;
use wind_charge_controller::hardware::{
    DeviceFactory, DeviceSet, PwmRegister, SystemClock, ThreadDelay,
};
use wind_charge_controller::station::{ChargeStation, Drivers, StationStatus};
use wind_charge_controller::storage::{FileStore, MemoryStore, PersistentStore};
use wind_charge_controller::telemetry::{init_tracing, shutdown_signal};

#[cfg(feature = "sim")]
use wind_charge_controller::hardware::factory::SimulatedRig;
#[cfg(feature = "sim")]
use wind_charge_controller::simulation::{WindSimulator, WindSimulatorConfig};

/// Handles for steering simulated devices, when there are any
#[cfg(feature = "sim")]
type Rig = Option<SimulatedRig>;
#[cfg(not(feature = "sim"))]
type Rig = ();

/// Ticks between status reports
const STATUS_EVERY: u64 = 40;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load().context("loading configuration")?;
    info!(hardware = ?cfg.station.hardware, tick_ms = cfg.station.tick_ms, "starting wind charge controller");

    let factory = DeviceFactory::new(cfg.station.hardware);
    #[allow(unused_mut)]
    let mut devices = factory.create_devices();
    #[cfg(feature = "sim")]
    let rig: Rig = devices.rig.take();
    #[cfg(not(feature = "sim"))]
    let rig: Rig = ();

    let drivers = Drivers::new(
        SystemClock::new(),
        Box::new(ThreadDelay),
        Box::new(PwmRegister::default()),
    );

    match cfg.station.store_dir.as_deref() {
        Some(dir) => {
            let store = FileStore::open(dir)
                .with_context(|| format!("opening store directory {dir}"))?;
            run(
                &cfg,
                devices,
                store,
                drivers,
                rig,
            )
            .await
        }
        None => {
            warn!("no store_dir configured, settings and counters will not survive a restart");
            run(
                &cfg,
                devices,
                MemoryStore::new(),
                drivers,
                rig,
            )
            .await
        }
    }
}

async fn run<S: PersistentStore>(
    cfg: &Config,
    devices: DeviceSet,
    store: S,
    drivers: Drivers,
    rig: Rig,
) -> Result<()> {
    let period = Duration::from_millis(cfg.station.tick_ms);
    let mut station = ChargeStation::new(cfg, devices, store, drivers);

    #[cfg(not(feature = "sim"))]
    let _ = rig;
    #[cfg(feature = "sim")]
    let mut plant = rig.map(|rig| {
        let sim = WindSimulator::new(WindSimulatorConfig {
            nominal_voltage: station.settings().sensor.nominal_voltage,
            bank_size: station.settings().charge.bank_size,
            ..Default::default()
        });
        (sim, rig)
    });

    station
        .run(period, shutdown_signal(), |station| {
            let status = station.status();
            #[cfg(feature = "sim")]
            {
                if let Some((sim, rig)) = plant.as_mut() {
                    sim.step(period, rig, status.load != LoadState::Off, status.dump * 10);
                }
            }
            if station.ticks() % STATUS_EVERY == 1 {
                report(&status);
            }
        })
        .await;

    info!(events = station.events().len(), "shutdown complete");
    Ok(())
}

fn report(status: &StationStatus) {
    match serde_json::to_string(status) {
        Ok(json) => info!(status = %json, "station status"),
        Err(e) => warn!(error = %e, "failed to encode station status"),
    }
}
