//! # Plant Simulation
//!
//! Physical models that drive the simulated bus devices when the station
//! runs without real hardware.

pub mod wind;

pub use wind::{WindSimulator, WindSimulatorConfig, WindState};
