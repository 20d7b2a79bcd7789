//! # Wind Turbine Plant Simulation
//!
//! Drives the simulated bus devices from a gusty wind model: generator
//! current follows a cubic power curve between cut-in and rated wind, the
//! inverter and dump load draw current back out, and the battery terminal
//! voltage follows state of charge plus an IR term.

use std::time::Duration;

use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::hardware::factory::SimulatedRig;

/// Configuration for the wind plant simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindSimulatorConfig {
    /// Long-run mean wind speed (m/s)
    pub mean_wind_ms: f64,
    /// Gust standard deviation per sqrt(second) (m/s)
    pub gust_std_ms: f64,
    /// Wind speed where the generator starts charging (m/s)
    pub cut_in_ms: f64,
    /// Wind speed at rated output (m/s)
    pub rated_wind_ms: f64,
    /// Charge current at rated wind, amps x 100
    pub rated_amps: i32,
    /// Inverter draw while the load is on, amps x 100
    pub inverter_amps: i32,
    /// Dump load draw at full duty, amps x 100
    pub dump_amps: i32,
    /// System voltage the monitor divider is sized for
    pub nominal_voltage: i16,
    pub bank_size: i16,
    /// Random seed for reproducibility (None = random)
    pub random_seed: Option<u64>,
}

impl Default for WindSimulatorConfig {
    fn default() -> Self {
        Self {
            mean_wind_ms: 7.0,
            gust_std_ms: 0.8,
            cut_in_ms: 3.0,
            rated_wind_ms: 12.0,
            rated_amps: 4000,
            inverter_amps: 2500,
            dump_amps: 3500,
            nominal_voltage: 24,
            bank_size: 1000,
            random_seed: None,
        }
    }
}

/// Current state of the wind plant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindState {
    pub wind_ms: f64,
    pub rpm: u32,
    /// Net battery current, amps x 100 (positive = charging)
    pub net_amps: i32,
    /// Battery terminal voltage, volts x 100
    pub volts: i32,
}

pub struct WindSimulator {
    config: WindSimulatorConfig,
    rng: rand::rngs::StdRng,
    state: WindState,
}

impl WindSimulator {
    pub fn new(config: WindSimulatorConfig) -> Self {
        let rng = match config.random_seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_entropy(),
        };
        let state = WindState {
            wind_ms: config.mean_wind_ms,
            rpm: 0,
            net_amps: 0,
            volts: config.nominal_voltage as i32 * 105,
        };
        Self { config, rng, state }
    }

    pub fn state(&self) -> &WindState {
        &self.state
    }

    /// Generator charge current for a wind speed, amps x 100
    pub fn generator_amps(&self, wind_ms: f64) -> i32 {
        let cfg = &self.config;
        if wind_ms <= cfg.cut_in_ms {
            return 0;
        }
        let fraction = ((wind_ms - cfg.cut_in_ms) / (cfg.rated_wind_ms - cfg.cut_in_ms)).min(1.0);
        (cfg.rated_amps as f64 * fraction.powi(3)) as i32
    }

    /// Advance the plant by `dt` and push the result into the simulated devices
    pub fn step(&mut self, dt: Duration, rig: &SimulatedRig, load_on: bool, dump_duty: u16) {
        let seconds = dt.as_secs_f64();
        let cfg = &self.config;

        // mean-reverting gusts
        let gust = Normal::new(0.0, cfg.gust_std_ms * seconds.sqrt())
            .map(|n| n.sample(&mut self.rng))
            .unwrap_or(0.0);
        let reversion = (cfg.mean_wind_ms - self.state.wind_ms) * (0.02 * seconds).min(1.0);
        let wind_ms = (self.state.wind_ms + reversion + gust).max(0.0);

        let mut net_amps = self.generator_amps(wind_ms);
        let cfg = &self.config;
        if load_on {
            net_amps -= cfg.inverter_amps;
        }
        net_amps -= (cfg.dump_amps as f64 * dump_duty as f64 / 1010.0) as i32;

        rig.monitor.set_amps(net_amps.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
        rig.monitor.integrate(seconds);

        let soc = rig.monitor.reading().charge as f64 / cfg.bank_size.max(1) as f64;
        let nominal = cfg.nominal_voltage as f64 * 100.0;
        let volts = nominal * (0.96 + 0.16 * soc.clamp(0.0, 1.2)) + net_amps as f64 / 50.0;
        let volts = volts.max(0.0) as i32;
        let volts_raw = volts * 7 / cfg.nominal_voltage.max(1) as i32;
        rig.monitor.set_volts_raw(volts_raw.min(i16::MAX as i32) as i16);

        let rpm = if wind_ms <= cfg.cut_in_ms / 2.0 {
            0
        } else {
            (wind_ms * 60.0).min(900.0) as u32
        };
        rig.pulses.set_rpm(rpm, 6);

        self.state = WindState {
            wind_ms,
            rpm,
            net_amps,
            volts,
        };
    }
}
