use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Filtered battery state published by the estimator once per tick.
///
/// Volts, amps, power and temperature are fixed point scaled by 100
/// (`2750` = 27.50 V, `2500` = 25.00 °C). Charge is in amp-hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatteryState {
    /// Average over the voltage window
    pub volts: i16,
    /// Average over the current window
    pub amps: i16,
    /// `amps * volts / 10_000` from the averaged values
    pub power: i16,
    /// Median over the voltage window
    pub volts_now: i16,
    /// Median over the current window
    pub amps_now: i16,
    /// Power from the median values, feeds the extremum trackers
    pub power_now: i16,
    /// Centi-degrees Celsius
    pub temperature: i16,
    /// Remaining charge from the monitor's coulomb counter
    pub charge: i16,
    /// Cumulative discharge counter
    pub dca: u16,
    /// Cumulative charge counter
    pub cca: u16,
    pub hour_max: i16,
    pub hour_min: i16,
    pub day_max: i16,
    pub day_min: i16,
}

impl BatteryState {
    /// Safe stand-in used while no battery monitor is fitted
    pub fn nominal(nominal_system_voltage: i16, bank_size: i16) -> Self {
        Self {
            volts: nominal_system_voltage.saturating_mul(105),
            volts_now: nominal_system_voltage.saturating_mul(105),
            temperature: 2500,
            charge: (bank_size as f64 * 0.90) as i16,
            hour_max: i16::MIN,
            hour_min: i16::MAX,
            day_max: i16::MIN,
            day_min: i16::MAX,
            ..Default::default()
        }
    }
}

/// Charge regime, selected from charge as a fraction of bank size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ChargeMode {
    #[strum(serialize = "bulk")]
    Bulk,
    #[strum(serialize = "absorb")]
    Absorb,
    #[strum(serialize = "float")]
    Float,
}

impl ChargeMode {
    pub fn classify(charge: i16, bank_size: i16) -> Self {
        if (charge as f64) < bank_size as f64 * 0.90 {
            ChargeMode::Bulk
        } else if charge < bank_size {
            ChargeMode::Absorb
        } else {
            ChargeMode::Float
        }
    }

    /// Single character shown on the status line
    pub fn as_char(self) -> char {
        match self {
            ChargeMode::Bulk => 'B',
            ChargeMode::Absorb => 'A',
            ChargeMode::Float => 'F',
        }
    }
}

/// State of the inverter (or any switchable) load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum LoadState {
    Off,
    /// Switched on by the operator or by over-voltage
    On,
    /// Switched on by the automatic charge/discharge cycle
    Auto,
}

/// How much authority the controller has over the inverter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InverterControl {
    /// No inverter fitted
    Disabled,
    /// Operator commands and under-voltage protection only
    Manual,
    /// Full charge/discharge cycling
    Automatic,
}

impl InverterControl {
    /// Stored setting code, as written by the keypad UI
    pub fn from_code(code: i16) -> Self {
        match code {
            0 => InverterControl::Disabled,
            2 => InverterControl::Automatic,
            _ => InverterControl::Manual,
        }
    }

    pub fn code(self) -> i16 {
        match self {
            InverterControl::Disabled => 0,
            InverterControl::Manual => 1,
            InverterControl::Automatic => 2,
        }
    }
}

/// One-shot operator command for the load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum LoadCommand {
    ManualOn,
    ManualOff,
}
