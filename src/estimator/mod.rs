//! # State Estimator
//!
//! Turns one raw battery monitor read per tick into a filtered
//! [`BatteryState`]. Voltage and current go through rolling windows (median
//! for the instantaneous value, mean for the smoothed one), charge comes from
//! the monitor's hardware coulomb counter and is corrected over time for
//! self-discharge and for the controller's own idle draw.
//!
//! Extremum buckets run on uptime. The self-discharge period and the
//! idle-draw day run on wall time, since the self-discharge timestamp is
//! persisted across restarts.

mod extrema;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SensorConfig;
use crate::domain::{BatteryState, Event, EventKind, EventLog};
use crate::filter::RollingWindow;
use crate::hardware::{BatteryMonitor, Clock, DeviceError, MonitorReading, TemperatureProbe};
use crate::storage::{PersistentStore, StoreExt, StoreKey};

pub use extrema::{Extrema, PowerExtrema};

/// Reference voltage the monitor input divider is sized for
const DIVIDER_REFERENCE_VOLTS: i32 = 7;
/// Persist the charge once it has moved this far from the stored value
const CHARGE_WRITE_THRESHOLD: i32 = 20;
/// Fold the idle total into the discharge counter above this many Ah
const IDLE_FOLD_THRESHOLD: i32 = 64;
const SECONDS_PER_DAY: i64 = 86_400;
/// Counter values the monitor reports after a clear
const CLEARED_DCA: u16 = 9;
const CLEARED_CCA: u16 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("charge {value} Ah outside plausible range {min}..{max} Ah")]
    OutOfRange { value: i16, min: i32, max: i32 },
    #[error(transparent)]
    Device(#[from] DeviceError),
}

pub struct Estimator {
    sensor: SensorConfig,
    bank_size: i16,
    monitor: Option<Box<dyn BatteryMonitor>>,
    probe: Option<Box<dyn TemperatureProbe>>,
    clock: Box<dyn Clock>,
    volts: RollingWindow,
    amps: RollingWindow,
    temperature: RollingWindow,
    extrema: PowerExtrema,
    probe_temperature: Option<i16>,
    last_minute: u64,
    last_hour: u64,
    /// Charge as last written to the store
    last_charge: i16,
    leak_time: i64,
    idle_day: i64,
    state: Option<BatteryState>,
}

impl Estimator {
    pub fn new(
        sensor: SensorConfig,
        bank_size: i16,
        mut monitor: Option<Box<dyn BatteryMonitor>>,
        mut probe: Option<Box<dyn TemperatureProbe>>,
        clock: Box<dyn Clock>,
        store: &mut dyn PersistentStore,
    ) -> Self {
        let now = clock.time();
        let uptime = clock.uptime();

        let mut last_charge = 0;
        let mut leak_time = now;
        if let Some(monitor) = monitor.as_mut() {
            last_charge = match store.load_i16(StoreKey::Charge) {
                Some(charge) => charge,
                None => {
                    let charge = nominal_charge(bank_size);
                    store.persist_i16(StoreKey::Charge, charge);
                    charge
                }
            };
            if let Err(e) = monitor.initialize(sensor.shunt, last_charge) {
                warn!(error = %e, charge = last_charge, "failed to preload monitor charge");
            }

            leak_time = match store.load_u32(StoreKey::SelfLeakTime) {
                Some(ts) if ts != 0 && ts != u32::MAX => ts as i64,
                _ => {
                    store.persist_u32(StoreKey::SelfLeakTime, now as u32);
                    now
                }
            };
            info!(charge = last_charge, leak_time, "battery monitor attached");
        } else {
            warn!("no battery monitor, publishing nominal values");
        }

        if let Some(probe) = probe.as_mut() {
            probe.set_resolution(sensor.probe_resolution_bits);
            probe.start_conversion();
        }

        Self {
            volts: RollingWindow::new(sensor.volts_window),
            amps: RollingWindow::new(sensor.amps_window),
            temperature: RollingWindow::new(sensor.temperature_window),
            extrema: PowerExtrema::new(),
            probe_temperature: None,
            last_minute: uptime,
            last_hour: uptime,
            last_charge,
            leak_time,
            idle_day: now.div_euclid(SECONDS_PER_DAY),
            state: None,
            sensor,
            bank_size,
            monitor,
            probe,
            clock,
        }
    }

    pub fn has_monitor(&self) -> bool {
        self.monitor.is_some()
    }

    /// Latest published snapshot; `None` until the first good read
    pub fn state(&self) -> Option<&BatteryState> {
        self.state.as_ref()
    }

    /// Take one reading and publish a new snapshot.
    ///
    /// Returns false when the read failed; the previous snapshot stays
    /// published and nothing else changes.
    pub fn tick(&mut self, store: &mut dyn PersistentStore, events: &mut dyn EventLog) -> bool {
        let Some(monitor) = self.monitor.as_mut() else {
            self.state = Some(BatteryState::nominal(
                self.sensor.nominal_voltage,
                self.bank_size,
            ));
            return true;
        };

        let reading = match monitor
            .trigger_conversion()
            .and_then(|_| monitor.read_all())
        {
            Ok(reading) => reading,
            Err(e) => {
                debug!(error = %e, "battery monitor read failed, skipping tick");
                return false;
            }
        };

        let uptime = self.clock.uptime();
        let now = self.clock.time();
        let previous = self
            .state
            .map(|s| Extrema {
                hour_max: s.hour_max,
                hour_min: s.hour_min,
                day_max: s.day_max,
                day_min: s.day_min,
            })
            .unwrap_or_default();

        let minute_elapsed = uptime >= self.last_minute + 60;
        if minute_elapsed {
            self.last_minute = uptime;
            self.extrema.advance_minute();
            self.poll_probe();
        }

        let mut state = self.filter(&reading);
        state.charge = reading.charge;
        state.dca = reading.dca;
        state.cca = reading.cca;

        if (self.last_charge as i32 - state.charge as i32).abs() > CHARGE_WRITE_THRESHOLD {
            self.last_charge = state.charge;
            store.persist_i16(StoreKey::Charge, state.charge);
        }

        let power = state.power_now;
        if power > previous.hour_max {
            events.emit(Event::new(EventKind::NewHourMax));
        }
        if power > previous.day_max {
            events.emit(Event::new(EventKind::NewDayMax));
        }
        if power < previous.hour_min {
            events.emit(Event::new(EventKind::NewHourMin));
        }
        if power < previous.day_min {
            events.emit(Event::new(EventKind::NewDayMin));
        }

        if uptime >= self.last_hour + 3600 {
            self.last_hour = uptime;
            self.extrema.advance_hour();
            self.last_charge = state.charge;
            store.persist_i16(StoreKey::Charge, state.charge);
        }
        let extrema = self.extrema.record(power);
        state.hour_max = extrema.hour_max;
        state.hour_min = extrema.hour_min;
        state.day_max = extrema.day_max;
        state.day_min = extrema.day_min;

        self.correct_self_discharge(&mut state, now, store, events);
        self.correct_idle_draw(&mut state, now, store, events);

        self.state = Some(state);
        true
    }

    /// Window the raw reading; charge and counters are filled in by the caller
    fn filter(&mut self, reading: &MonitorReading) -> BatteryState {
        let volts = self.scale_volts(reading.volts_raw);
        self.volts.add(volts);
        self.amps.add(reading.amps_raw);
        self.temperature.add(reading.temp_raw);

        let volts_now = self.volts.median().unwrap_or(volts);
        let amps_now = self.amps.median().unwrap_or(reading.amps_raw);
        let volts_avg = self.volts.average().unwrap_or(volts);
        let amps_avg = self.amps.average().unwrap_or(reading.amps_raw);
        let temperature = match self.probe_temperature {
            Some(t) => t,
            None => self.temperature.median().unwrap_or(reading.temp_raw),
        };

        BatteryState {
            volts: volts_avg,
            amps: amps_avg,
            power: power(amps_avg, volts_avg),
            volts_now,
            amps_now,
            power_now: power(amps_now, volts_now),
            temperature,
            ..Default::default()
        }
    }

    fn scale_volts(&self, raw: i16) -> i16 {
        let divided = raw as i32 * self.sensor.nominal_voltage as i32 / DIVIDER_REFERENCE_VOLTS;
        (divided as f64 * self.sensor.voltage_offset as f64) as i16
    }

    /// Take the probe's last conversion and start the next one
    fn poll_probe(&mut self) {
        if let Some(probe) = self.probe.as_mut() {
            if probe.busy() {
                debug!("temperature probe still converting");
                return;
            }
            self.probe_temperature = Some(probe.read());
            probe.start_conversion();
        }
    }

    fn correct_self_discharge(
        &mut self,
        state: &mut BatteryState,
        now: i64,
        store: &mut dyn PersistentStore,
        events: &mut dyn EventLog,
    ) {
        let period = self.sensor.self_discharge_days as i64 * SECONDS_PER_DAY;
        if now < self.leak_time + period {
            return;
        }
        let before = state.charge;
        state.charge = (state.charge as f64 * 0.99) as i16;
        self.reload_monitor(state.charge);
        self.leak_time = now;
        store.persist_u32(StoreKey::SelfLeakTime, now as u32);
        info!(before, after = state.charge, "self-discharge correction");
        events.emit(Event::new(EventKind::LeakAdjust));
    }

    fn correct_idle_draw(
        &mut self,
        state: &mut BatteryState,
        now: i64,
        store: &mut dyn PersistentStore,
        events: &mut dyn EventLog,
    ) {
        let day = now.div_euclid(SECONDS_PER_DAY);
        if day < self.idle_day {
            debug!(day, idle_day = self.idle_day, "wall clock stepped back, re-anchoring idle day");
            self.idle_day = day;
            return;
        }
        if day == self.idle_day {
            return;
        }
        self.idle_day = day;

        // running total is centi-amp-hours; charge only moves in whole Ah
        let before = store.load_i16(StoreKey::IdleTotal).unwrap_or(0).max(0) as i32;
        let mut total = before + self.sensor.idle_current.max(0) as i32 * 24;
        let amount = (total / 100 - before / 100) as i16;

        if amount > 0 {
            state.charge = state.charge.saturating_sub(amount);
            self.reload_monitor(state.charge);
        }

        if total > IDLE_FOLD_THRESHOLD * 100 {
            let folded = total / 100;
            let dca = state.dca.wrapping_add(folded as u16);
            if let Some(monitor) = self.monitor.as_mut() {
                match monitor.set_counters(dca, state.cca) {
                    Ok(()) => {
                        state.dca = dca;
                        total %= 100;
                    }
                    Err(e) => warn!(error = %e, "failed to fold idle draw into discharge counter"),
                }
            }
        }
        let total = total.min(i16::MAX as i32) as i16;
        store.persist_i16(StoreKey::IdleTotal, total);

        if amount > 0 {
            info!(amount, charge = state.charge, idle_total = total, "idle draw correction");
            events.emit(Event::new(EventKind::IdleAdjust));
        } else {
            debug!(idle_total = total, "idle draw carried to the next day");
        }
    }

    fn reload_monitor(&mut self, charge: i16) {
        if let Some(monitor) = self.monitor.as_mut() {
            if let Err(e) = monitor.initialize(self.sensor.shunt, charge) {
                warn!(error = %e, charge, "failed to reload monitor charge");
            }
        }
    }

    /// Re-synchronise the tracked charge to an external measurement
    pub fn sync_charge(
        &mut self,
        value: i16,
        store: &mut dyn PersistentStore,
    ) -> Result<(), SyncError> {
        let min = self.bank_size as i32 / 10;
        let max = self.bank_size as i32 * 2;
        if (value as i32) <= min || (value as i32) >= max {
            return Err(SyncError::OutOfRange { value, min, max });
        }
        let monitor = self.monitor.as_mut().ok_or(DeviceError::NotPresent)?;
        monitor.initialize(self.sensor.shunt, value)?;

        store.persist_i16(StoreKey::Charge, value);
        self.last_charge = value;
        if let Some(state) = self.state.as_mut() {
            state.charge = value;
        }
        info!(charge = value, "charge synchronised");
        Ok(())
    }

    /// Null the monitor's current offset with only the idle draw flowing
    pub fn calibrate(&mut self) -> Result<(), DeviceError> {
        let monitor = self.monitor.as_mut().ok_or(DeviceError::NotPresent)?;
        monitor.calibrate(self.sensor.idle_current)
    }

    pub fn clear_counters(&mut self) -> Result<(), DeviceError> {
        let monitor = self.monitor.as_mut().ok_or(DeviceError::NotPresent)?;
        monitor.set_counters(CLEARED_DCA, CLEARED_CCA)?;
        if let Some(state) = self.state.as_mut() {
            state.dca = CLEARED_DCA;
            state.cca = CLEARED_CCA;
        }
        Ok(())
    }
}

/// Volts and amps are both scaled by 100
fn power(amps: i16, volts: i16) -> i16 {
    (amps as f64 * volts as f64 / 10_000.0) as i16
}

fn nominal_charge(bank_size: i16) -> i16 {
    (bank_size as f64 * 0.90) as i16
}
