//! # Hardware Collaborators
//!
//! Narrow contracts for the bus devices the controller talks to. The bus
//! transactions themselves live in the board support code; the core only ever
//! sees these traits.
//!
//! - [`BatteryMonitor`]: voltage/current/temperature and hardware coulomb counter
//! - [`SwitchDevice`]: two-pin switch driving the inverter remote relay
//! - [`TemperatureProbe`]: optional stand-alone probe on the battery
//! - [`Clock`], [`Delay`], [`DumpLoadOutput`], [`PulseCounter`]: timer and PWM plumbing

pub mod factory;
pub mod registry;
pub mod simulated;
pub mod system;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use factory::{DeviceFactory, DeviceSet, HardwareMode};
pub use registry::{DeviceRegistry, DeviceRole, RomCode};
pub use system::{PwmRegister, SystemClock, ThreadDelay};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("scratchpad checksum mismatch")]
    Checksum,
    #[error("bus error: {0}")]
    Bus(String),
    #[error("device not present on the bus")]
    NotPresent,
    #[error("device rejected request: {0}")]
    Rejected(String),
}

/// One complete register read from the battery monitor.
///
/// Volts and amps are scaled by 100, temperature is centi-degrees. Volts are
/// as seen at the monitor input, before the external divider is accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MonitorReading {
    pub volts_raw: i16,
    pub amps_raw: i16,
    pub temp_raw: i16,
    /// Remaining capacity (amp-hours) from the hardware coulomb counter
    pub charge: i16,
    /// Discharge current accumulator
    pub dca: u16,
    /// Charge current accumulator
    pub cca: u16,
}

pub trait BatteryMonitor {
    fn trigger_conversion(&mut self) -> Result<(), DeviceError>;
    fn read_all(&mut self) -> Result<MonitorReading, DeviceError>;
    /// Program the shunt conductance and preload the charge register
    fn initialize(&mut self, shunt: i16, starting_charge: i16) -> Result<(), DeviceError>;
    fn set_counters(&mut self, dca: u16, cca: u16) -> Result<(), DeviceError>;
    /// Null the current offset with the given idle current flowing
    fn calibrate(&mut self, idle_current_hint: i16) -> Result<(), DeviceError>;
}

pub trait SwitchDevice {
    /// Raw latch/sense bit pattern
    fn read(&mut self) -> u8;
    /// Drive the output latches; false when the device did not acknowledge
    fn write(&mut self, pin_mask: u8) -> bool;
}

pub trait TemperatureProbe {
    fn set_resolution(&mut self, bits: u8);
    fn start_conversion(&mut self);
    fn busy(&self) -> bool;
    /// Last converted value in centi-degrees
    fn read(&mut self) -> i16;
}

pub trait Clock {
    /// Monotonic seconds since start
    fn uptime(&self) -> u64;
    /// Wall clock, unix seconds
    fn time(&self) -> i64;
}

pub trait Delay {
    fn delay_ms(&mut self, ms: u32);
}

/// Rotor pulse capture: timer counts (16 µs each) between the last two
/// pulses, 0 once the timer has overflowed without a pulse
pub trait PulseCounter {
    fn period(&self) -> u16;
}

/// Dump load PWM compare register (0..=1023)
pub trait DumpLoadOutput {
    fn set_duty(&mut self, value: u16);
}
