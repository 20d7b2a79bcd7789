//! # Charge Station
//!
//! Composes the estimator, charge controller and rotor speed tracker with the
//! persistent store and event journal, and runs them from one tick loop.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::Config;
use crate::controller::{ChargeController, Relay};
use crate::domain::{
    BatteryState, ChargeMode, EventJournal, InverterControl, LoadCommand, LoadState,
};
use crate::estimator::{Estimator, SyncError};
use crate::hardware::{Clock, Delay, DeviceError, DeviceSet, DumpLoadOutput, PulseCounter};
use crate::rotor::RotorSpeed;
use crate::settings::Settings;
use crate::storage::PersistentStore;

/// Everything the UI and telemetry collaborators read after a tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StationStatus {
    /// `None` until the battery monitor has produced a good read
    pub battery: Option<BatteryState>,
    pub charge_mode: ChargeMode,
    /// `B`, `A` or `F`
    pub mode_char: char,
    /// Dump load, 0-100
    pub dump: u16,
    pub load: LoadState,
    pub inverter: InverterControl,
    pub target_charge: i16,
    pub discharge_cycles: i16,
    pub rpm: i16,
    pub max_rpm: i16,
}

/// Actuator plumbing that is not discovered on the bus
pub struct Drivers {
    pub clock: Box<dyn Clock>,
    /// Second handle on the same clock, for the station's own bookkeeping
    pub station_clock: Box<dyn Clock>,
    pub delay: Box<dyn Delay>,
    pub output: Box<dyn DumpLoadOutput>,
}

impl Drivers {
    pub fn new<C>(clock: C, delay: Box<dyn Delay>, output: Box<dyn DumpLoadOutput>) -> Self
    where
        C: Clock + Clone + 'static,
    {
        Self {
            clock: Box::new(clock.clone()),
            station_clock: Box::new(clock),
            delay,
            output,
        }
    }
}

pub struct ChargeStation<S: PersistentStore> {
    settings: Settings,
    estimator: Estimator,
    controller: ChargeController,
    rotor: RotorSpeed,
    pulses: Option<Box<dyn PulseCounter>>,
    clock: Box<dyn Clock>,
    store: S,
    events: EventJournal,
    ticks: u64,
}

impl<S: PersistentStore> ChargeStation<S> {
    pub fn new(config: &Config, devices: DeviceSet, mut store: S, drivers: Drivers) -> Self {
        let settings = Settings::load(&mut store, config);

        let estimator = Estimator::new(
            settings.sensor.clone(),
            settings.charge.bank_size,
            devices.monitor,
            devices.probe,
            drivers.clock,
            &mut store,
        );
        let relay = Relay::new(devices.switch, drivers.delay);
        let controller =
            ChargeController::new(settings.charge.clone(), relay, drivers.output, &store);
        let rotor = RotorSpeed::new(
            settings.sensor.poles,
            settings.sensor.rpm_window,
            drivers.station_clock.uptime(),
        );

        info!(
            monitor = estimator.has_monitor(),
            pulses = devices.pulses.is_some(),
            "charge station assembled"
        );

        Self {
            settings,
            estimator,
            controller,
            rotor,
            pulses: devices.pulses,
            clock: drivers.station_clock,
            store,
            events: EventJournal::with_capacity(config.station.event_history),
            ticks: 0,
        }
    }

    /// One pass of the pipeline: estimator, then controller, then rotor.
    ///
    /// The controller only runs once the estimator has a snapshot to act on.
    pub fn tick(&mut self) {
        self.ticks += 1;
        self.estimator.tick(&mut self.store, &mut self.events);
        if let Some(state) = self.estimator.state().copied() {
            self.controller
                .tick(&state, &mut self.store, &mut self.events);
        }
        if let Some(pulses) = self.pulses.as_ref() {
            self.rotor.update(pulses.period(), self.clock.uptime());
        }
    }

    /// Queue a manual override for the next tick
    pub fn command(&mut self, command: LoadCommand) {
        info!(%command, "load command queued");
        self.controller.command(command);
    }

    /// Off turns on, anything else turns off
    pub fn toggle_load(&mut self) -> LoadCommand {
        let command = match self.controller.load() {
            LoadState::Off => LoadCommand::ManualOn,
            LoadState::On | LoadState::Auto => LoadCommand::ManualOff,
        };
        self.command(command);
        command
    }

    pub fn sync_charge(&mut self, value: i16) -> Result<(), SyncError> {
        self.estimator.sync_charge(value, &mut self.store)
    }

    pub fn calibrate(&mut self) -> Result<(), DeviceError> {
        self.estimator.calibrate()
    }

    pub fn clear_counters(&mut self) -> Result<(), DeviceError> {
        self.estimator.clear_counters()
    }

    pub fn status(&self) -> StationStatus {
        let mode = self.controller.mode();
        StationStatus {
            battery: self.estimator.state().copied(),
            charge_mode: mode,
            mode_char: mode.as_char(),
            dump: self.controller.dump(),
            load: self.controller.load(),
            inverter: self.controller.inverter(),
            target_charge: self.controller.target_charge(),
            discharge_cycles: self.controller.discharge_cycles(),
            rpm: self.rotor.rpm(),
            max_rpm: self.rotor.max_rpm(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn events(&self) -> &EventJournal {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventJournal {
        &mut self.events
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Tick every `period` until `shutdown` resolves. `after_tick` runs after
    /// each tick, for simulation drivers and status reporting.
    pub async fn run<F, H>(&mut self, period: Duration, shutdown: F, mut after_tick: H)
    where
        F: Future<Output = ()>,
        H: FnMut(&mut Self),
    {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(period_ms = period.as_millis() as u64, "charge station running");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.tick();
                    after_tick(self);
                }
            }
        }
        debug!(ticks = self.ticks, "charge station stopped");
    }
}
