//! User-adjustable thresholds.
//!
//! The persistent store is authoritative: the config file only supplies the
//! factory value for a key that has never been written, and that value is
//! written back so the box keeps it across a config change.

use tracing::{debug, info, warn};

use crate::config::{ChargeConfig, Config, SensorConfig};
use crate::domain::InverterControl;
use crate::storage::{PersistentStore, StoreExt, StoreKey};

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub charge: ChargeConfig,
    pub sensor: SensorConfig,
}

impl Settings {
    pub fn load(store: &mut dyn PersistentStore, config: &Config) -> Self {
        let mut charge = config.charge.clone();
        let mut sensor = config.sensor.clone();
        let mut seeded = 0usize;

        let mut overlay = |key: StoreKey, value: &mut i16| {
            match store.load_i16(key) {
                Some(stored) => *value = stored,
                None => {
                    store.persist_i16(key, *value);
                    seeded += 1;
                }
            }
        };
        overlay(StoreKey::VoltsUpper, &mut charge.volts_upper);
        overlay(StoreKey::VoltsLower, &mut charge.volts_lower);
        overlay(StoreKey::AbsorbVolts, &mut charge.absorb_volts);
        overlay(StoreKey::FloatVolts, &mut charge.float_volts);
        overlay(StoreKey::BankSize, &mut charge.bank_size);
        overlay(StoreKey::MinCharge, &mut charge.min_charge);
        overlay(StoreKey::MaxCharge, &mut charge.max_charge);
        overlay(StoreKey::MaxDischarge, &mut charge.max_discharge);
        overlay(StoreKey::NominalVoltage, &mut sensor.nominal_voltage);
        overlay(StoreKey::Shunt, &mut sensor.shunt);
        overlay(StoreKey::Poles, &mut sensor.poles);
        overlay(StoreKey::IdleCurrent, &mut sensor.idle_current);
        overlay(StoreKey::SelfDischargeDays, &mut sensor.self_discharge_days);

        let mut code = charge.inverter.code();
        overlay(StoreKey::InverterControl, &mut code);
        charge.inverter = InverterControl::from_code(code);
        if charge.inverter.code() != code {
            debug!(code, inverter = %charge.inverter, "unknown inverter control code");
        }

        match store.read_f32(StoreKey::VoltageOffset) {
            Ok(Some(offset)) if offset.is_finite() && offset > 0.0 => {
                sensor.voltage_offset = offset
            }
            _ => {
                if store
                    .write_f32(StoreKey::VoltageOffset, sensor.voltage_offset)
                    .is_ok()
                {
                    seeded += 1;
                }
            }
        }

        // Guard against zero divisors from a hand-edited store
        if sensor.poles <= 0 {
            sensor.poles = config.sensor.poles;
        }
        if sensor.nominal_voltage <= 0 {
            sensor.nominal_voltage = config.sensor.nominal_voltage;
        }
        if sensor.self_discharge_days <= 0 {
            sensor.self_discharge_days = config.sensor.self_discharge_days;
        }
        if charge.bank_size <= 0 {
            charge.bank_size = config.charge.bank_size;
        }
        if let Err(e) = charge.validate() {
            warn!(error = %e, "stored charge thresholds are inconsistent, using factory values");
            charge = ChargeConfig {
                bank_size: charge.bank_size,
                inverter: charge.inverter,
                ..config.charge.clone()
            };
        }

        info!(
            bank_size = charge.bank_size,
            volts_upper = charge.volts_upper,
            volts_lower = charge.volts_lower,
            inverter = %charge.inverter,
            seeded,
            "loaded settings"
        );
        Self { charge, sensor }
    }
}
