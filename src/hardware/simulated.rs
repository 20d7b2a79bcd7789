//! Simulated bus devices for development and tests.
//!
//! Every device is a cheap handle over shared state, so a test can keep a
//! clone, hand the other to the estimator or controller, and then inspect or
//! steer the device between ticks.

use std::sync::atomic::{AtomicI64, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    BatteryMonitor, Clock, Delay, DeviceError, DumpLoadOutput, MonitorReading, PulseCounter,
    RomCode, SwitchDevice, TemperatureProbe,
};
use crate::controller::relay::{PIN_PRESS, PIN_RELEASE, SENSE_OFF, SENSE_ON};

#[derive(Debug, Default)]
struct MonitorState {
    reading: MonitorReading,
    failing_reads: u32,
    conversions: u32,
    initialized: Vec<(i16, i16)>,
    calibrations: Vec<i16>,
    /// Fractional amp-hours not yet folded into the charge register
    residual_ah: f64,
}

/// Battery monitor whose registers are set directly by the test or by a
/// simple charge integration
#[derive(Debug, Clone, Default)]
pub struct SimulatedMonitor {
    state: Arc<Mutex<MonitorState>>,
}

impl SimulatedMonitor {
    pub fn new(reading: MonitorReading) -> Self {
        let monitor = Self::default();
        monitor.state.lock().reading = reading;
        monitor
    }

    pub fn rom() -> RomCode {
        RomCode([0x26, 0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x9c])
    }

    pub fn set_reading(&self, reading: MonitorReading) {
        self.state.lock().reading = reading;
    }

    pub fn reading(&self) -> MonitorReading {
        self.state.lock().reading
    }

    pub fn set_volts_raw(&self, volts_raw: i16) {
        self.state.lock().reading.volts_raw = volts_raw;
    }

    pub fn set_amps(&self, amps_raw: i16) {
        self.state.lock().reading.amps_raw = amps_raw;
    }

    pub fn set_temperature(&self, temp_raw: i16) {
        self.state.lock().reading.temp_raw = temp_raw;
    }

    pub fn set_charge(&self, charge: i16) {
        self.state.lock().reading.charge = charge;
    }

    /// Make the next `count` reads fail with a checksum error
    pub fn fail_reads(&self, count: u32) {
        self.state.lock().failing_reads = count;
    }

    /// `(shunt, charge)` for every initialize call, oldest first
    pub fn initializations(&self) -> Vec<(i16, i16)> {
        self.state.lock().initialized.clone()
    }

    pub fn calibrations(&self) -> Vec<i16> {
        self.state.lock().calibrations.clone()
    }

    pub fn conversions(&self) -> u32 {
        self.state.lock().conversions
    }

    /// Integrate the current reading over `seconds` into the charge register
    pub fn integrate(&self, seconds: f64) {
        let mut st = self.state.lock();
        st.residual_ah += st.reading.amps_raw as f64 / 100.0 * seconds / 3600.0;
        let whole = st.residual_ah.trunc();
        if whole != 0.0 {
            st.residual_ah -= whole;
            st.reading.charge = st.reading.charge.saturating_add(whole as i16);
            let ah = whole.abs() as u16;
            if whole > 0.0 {
                st.reading.cca = st.reading.cca.wrapping_add(ah);
            } else {
                st.reading.dca = st.reading.dca.wrapping_add(ah);
            }
        }
    }
}

impl BatteryMonitor for SimulatedMonitor {
    fn trigger_conversion(&mut self) -> Result<(), DeviceError> {
        self.state.lock().conversions += 1;
        Ok(())
    }

    fn read_all(&mut self) -> Result<MonitorReading, DeviceError> {
        let mut st = self.state.lock();
        if st.failing_reads > 0 {
            st.failing_reads -= 1;
            return Err(DeviceError::Checksum);
        }
        Ok(st.reading)
    }

    fn initialize(&mut self, shunt: i16, starting_charge: i16) -> Result<(), DeviceError> {
        let mut st = self.state.lock();
        st.initialized.push((shunt, starting_charge));
        st.reading.charge = starting_charge;
        Ok(())
    }

    fn set_counters(&mut self, dca: u16, cca: u16) -> Result<(), DeviceError> {
        let mut st = self.state.lock();
        st.reading.dca = dca;
        st.reading.cca = cca;
        Ok(())
    }

    fn calibrate(&mut self, idle_current_hint: i16) -> Result<(), DeviceError> {
        self.state.lock().calibrations.push(idle_current_hint);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SwitchState {
    load_on: bool,
    pressed: bool,
    presses: u32,
    stuck: bool,
    nack: bool,
}

/// Inverter remote: a press toggles the inverter, the sense inputs follow
/// its indicator LED
#[derive(Debug, Clone, Default)]
pub struct SimulatedSwitch {
    state: Arc<Mutex<SwitchState>>,
}

impl SimulatedSwitch {
    pub fn new(load_on: bool) -> Self {
        let switch = Self::default();
        switch.state.lock().load_on = load_on;
        switch
    }

    pub fn rom() -> RomCode {
        RomCode([0x3a, 0x11, 0x21, 0x31, 0x41, 0x51, 0x61, 0x2e])
    }

    pub fn is_on(&self) -> bool {
        self.state.lock().load_on
    }

    pub fn presses(&self) -> u32 {
        self.state.lock().presses
    }

    /// Presses are acknowledged but the inverter does not respond
    pub fn set_stuck(&self, stuck: bool) {
        self.state.lock().stuck = stuck;
    }

    /// Writes are not acknowledged
    pub fn set_nack(&self, nack: bool) {
        self.state.lock().nack = nack;
    }
}

impl SwitchDevice for SimulatedSwitch {
    fn read(&mut self) -> u8 {
        if self.state.lock().load_on {
            SENSE_ON
        } else {
            SENSE_OFF
        }
    }

    fn write(&mut self, pin_mask: u8) -> bool {
        let mut st = self.state.lock();
        if st.nack {
            return false;
        }
        match pin_mask {
            PIN_PRESS if !st.pressed => {
                st.pressed = true;
                st.presses += 1;
                if !st.stuck {
                    st.load_on = !st.load_on;
                }
            }
            PIN_RELEASE => st.pressed = false,
            _ => {}
        }
        true
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    value: i16,
    resolution: u8,
    busy: bool,
    conversions: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl SimulatedProbe {
    pub fn new(value: i16) -> Self {
        let probe = Self::default();
        probe.state.lock().value = value;
        probe
    }

    pub fn rom() -> RomCode {
        RomCode([0x28, 0x12, 0x22, 0x32, 0x42, 0x52, 0x62, 0x71])
    }

    pub fn set_value(&self, value: i16) {
        self.state.lock().value = value;
    }

    /// Hold the probe busy, as if a conversion never finished
    pub fn set_busy(&self, busy: bool) {
        self.state.lock().busy = busy;
    }

    pub fn resolution(&self) -> u8 {
        self.state.lock().resolution
    }

    pub fn conversions(&self) -> u32 {
        self.state.lock().conversions
    }
}

impl TemperatureProbe for SimulatedProbe {
    fn set_resolution(&mut self, bits: u8) {
        self.state.lock().resolution = bits;
    }

    fn start_conversion(&mut self) {
        self.state.lock().conversions += 1;
    }

    fn busy(&self) -> bool {
        self.state.lock().busy
    }

    fn read(&mut self) -> i16 {
        self.state.lock().value
    }
}

/// Clock moved by hand; uptime and wall time advance together unless the wall
/// clock is set explicitly
#[derive(Debug, Clone)]
pub struct ManualClock {
    uptime: Arc<AtomicU64>,
    wall: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(wall_start: i64) -> Self {
        Self {
            uptime: Arc::new(AtomicU64::new(0)),
            wall: Arc::new(AtomicI64::new(wall_start)),
        }
    }

    pub fn advance(&self, seconds: u64) {
        self.uptime.fetch_add(seconds, Ordering::SeqCst);
        self.wall.fetch_add(seconds as i64, Ordering::SeqCst);
    }

    /// Step the wall clock only, as an operator setting the time would
    pub fn set_wall(&self, unix_seconds: i64) {
        self.wall.store(unix_seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn uptime(&self) -> u64 {
        self.uptime.load(Ordering::SeqCst)
    }

    fn time(&self) -> i64 {
        self.wall.load(Ordering::SeqCst)
    }
}

/// Delay that returns immediately and records what was asked for
#[derive(Debug, Clone, Default)]
pub struct RecordingDelay {
    delays: Arc<Mutex<Vec<u32>>>,
}

impl RecordingDelay {
    pub fn delays(&self) -> Vec<u32> {
        self.delays.lock().clone()
    }
}

impl Delay for RecordingDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.delays.lock().push(ms);
    }
}

/// PWM register that can be read back from a test
#[derive(Debug, Clone, Default)]
pub struct SimulatedPwm {
    duty: Arc<Mutex<u16>>,
}

impl SimulatedPwm {
    pub fn duty(&self) -> u16 {
        *self.duty.lock()
    }
}

impl DumpLoadOutput for SimulatedPwm {
    fn set_duty(&mut self, value: u16) {
        *self.duty.lock() = value;
    }
}

/// Rotor pulse capture driven from a target speed
#[derive(Debug, Clone, Default)]
pub struct SimulatedPulseCounter {
    period: Arc<AtomicU16>,
}

impl SimulatedPulseCounter {
    pub fn set_period(&self, period: u16) {
        self.period.store(period, Ordering::SeqCst);
    }

    /// Capture period for `rpm` on a generator with `poles` poles; 0 when
    /// stalled
    pub fn set_rpm(&self, rpm: u32, poles: u32) {
        let period = if rpm == 0 || poles == 0 {
            0
        } else {
            (62_500 * (60 / poles) / rpm).min(u16::MAX as u32) as u16
        };
        self.set_period(period);
    }
}

impl PulseCounter for SimulatedPulseCounter {
    fn period(&self) -> u16 {
        self.period.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_press_toggles_load() {
        let mut switch = SimulatedSwitch::new(false);
        let handle = switch.clone();
        assert_eq!(switch.read(), SENSE_OFF);
        assert!(switch.write(PIN_PRESS));
        assert!(switch.write(PIN_RELEASE));
        assert_eq!(switch.read(), SENSE_ON);
        assert_eq!(handle.presses(), 1);
    }

    #[test]
    fn test_monitor_read_failures_are_counted_down() {
        let mut monitor = SimulatedMonitor::new(MonitorReading::default());
        monitor.fail_reads(1);
        assert_eq!(monitor.read_all(), Err(DeviceError::Checksum));
        assert!(monitor.read_all().is_ok());
    }

    #[test]
    fn test_monitor_integrates_charge() {
        let monitor = SimulatedMonitor::new(MonitorReading {
            amps_raw: 1000,
            charge: 500,
            ..Default::default()
        });
        // 10 A for half an hour
        monitor.integrate(1800.0);
        assert_eq!(monitor.reading().charge, 505);
        assert_eq!(monitor.reading().cca, 5);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_700_000_000);
        clock.advance(90);
        assert_eq!(clock.uptime(), 90);
        assert_eq!(clock.time(), 1_700_000_090);
        clock.set_wall(1_800_000_000);
        assert_eq!(clock.uptime(), 90);
    }
}
