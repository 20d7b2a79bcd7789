use anyhow::{ensure, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use crate::domain::InverterControl;
use crate::hardware::HardwareMode;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub station: StationConfig,
    pub charge: ChargeConfig,
    pub sensor: SensorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    pub tick_ms: u64,
    pub hardware: HardwareMode,
    /// Directory for the persistent store; in-memory when absent
    pub store_dir: Option<String>,
    pub event_history: usize,
}

/// Charge thresholds. Volts are scaled by 100, charge levels are amp-hours.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChargeConfig {
    /// Over-voltage limit; shunt ceiling in bulk, forced inverter run above it
    pub volts_upper: i16,
    /// Under-voltage limit; the inverter is cut below it
    pub volts_lower: i16,
    pub absorb_volts: i16,
    pub float_volts: i16,
    pub bank_size: i16,
    /// Charge the automatic cycle discharges down to
    pub min_charge: i16,
    /// Charge the automatic cycle recharges to between float charges
    pub max_charge: i16,
    /// Partial cycles before a full float charge
    pub max_discharge: i16,
    pub inverter: InverterControl,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SensorConfig {
    /// System voltage to the nearest 6 V (12, 24, 48)
    pub nominal_voltage: i16,
    /// Voltage calibration multiplier
    pub voltage_offset: f32,
    /// Shunt conductance in siemens
    pub shunt: i16,
    /// Days for the bank to lose 1% to self-discharge
    pub self_discharge_days: i16,
    /// Quiescent draw of the controller and its peripherals, amps x 100
    pub idle_current: i16,
    /// Magnetic poles in the generator
    pub poles: i16,
    pub volts_window: usize,
    pub amps_window: usize,
    pub temperature_window: usize,
    pub rpm_window: usize,
    pub probe_resolution_bits: u8,
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("WCC__").split("__"));
        let cfg: Self = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let cfg: Self = Figment::new().merge(Toml::string(toml)).extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.charge.validate()?;
        self.sensor.validate()?;
        ensure!(self.station.tick_ms > 0, "station.tick_ms must be positive");
        Ok(())
    }
}

impl ChargeConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.bank_size > 0, "bank_size must be positive, got {}", self.bank_size);
        ensure!(
            self.volts_lower < self.volts_upper,
            "volts_lower {} must be below volts_upper {}",
            self.volts_lower,
            self.volts_upper
        );
        ensure!(
            self.float_volts <= self.absorb_volts,
            "float_volts {} must not exceed absorb_volts {}",
            self.float_volts,
            self.absorb_volts
        );
        ensure!(
            self.min_charge <= self.max_charge,
            "min_charge {} must not exceed max_charge {}",
            self.min_charge,
            self.max_charge
        );
        ensure!(self.max_discharge >= 0, "max_discharge must not be negative");
        Ok(())
    }
}

impl SensorConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.nominal_voltage > 0, "nominal_voltage must be positive");
        ensure!(self.poles > 0, "poles must be positive");
        ensure!(self.self_discharge_days > 0, "self_discharge_days must be positive");
        ensure!(
            self.voltage_offset.is_finite() && self.voltage_offset > 0.0,
            "voltage_offset must be a positive multiplier"
        );
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            station: StationConfig {
                tick_ms: 250,
                #[cfg(feature = "sim")]
                hardware: HardwareMode::Simulated,
                #[cfg(not(feature = "sim"))]
                hardware: HardwareMode::Detached,
                store_dir: None,
                event_history: 256,
            },
            charge: ChargeConfig::default(),
            sensor: SensorConfig::default(),
        }
    }
}

impl Default for ChargeConfig {
    fn default() -> Self {
        Self {
            volts_upper: 2900,
            volts_lower: 2200,
            absorb_volts: 2800,
            float_volts: 2700,
            bank_size: 1000,
            min_charge: 500,
            max_charge: 900,
            max_discharge: 5,
            inverter: InverterControl::Manual,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            nominal_voltage: 24,
            voltage_offset: 1.0,
            shunt: 1000,
            self_discharge_days: 10,
            idle_current: 2,
            poles: 6,
            volts_window: 10,
            amps_window: 10,
            temperature_window: 5,
            rpm_window: 10,
            probe_resolution_bits: 12,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [station]
        tick_ms = 500
        hardware = "detached"
        event_history = 64

        [charge]
        volts_upper = 2900
        volts_lower = 2200
        absorb_volts = 2800
        float_volts = 2700
        bank_size = 800
        min_charge = 400
        max_charge = 700
        max_discharge = 3
        inverter = "automatic"

        [sensor]
        nominal_voltage = 24
        voltage_offset = 1.01
        shunt = 1000
        self_discharge_days = 7
        idle_current = 3
        poles = 6
        volts_window = 10
        amps_window = 10
        temperature_window = 5
        rpm_window = 10
        probe_resolution_bits = 12
    "#;

    #[test]
    fn test_parse_config() {
        let cfg = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.station.tick_ms, 500);
        assert_eq!(cfg.station.hardware, HardwareMode::Detached);
        assert!(cfg.station.store_dir.is_none());
        assert_eq!(cfg.charge.bank_size, 800);
        assert_eq!(cfg.charge.inverter, InverterControl::Automatic);
        assert_eq!(cfg.sensor.self_discharge_days, 7);
    }

    #[test]
    fn test_rejects_inverted_voltage_limits() {
        let bad = SAMPLE.replace("volts_lower = 2200", "volts_lower = 3000");
        assert!(Config::from_toml_str(&bad).is_err());
    }

    #[test]
    fn test_rejects_float_above_absorb() {
        let mut charge = ChargeConfig::default();
        charge.float_volts = 2850;
        assert!(charge.validate().is_err());
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }
}
