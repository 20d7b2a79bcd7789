pub mod config;
pub mod controller;
pub mod domain;
pub mod estimator;
pub mod filter;
pub mod hardware;
pub mod rotor;
pub mod settings;
#[cfg(feature = "sim")]
pub mod simulation;
pub mod station;
pub mod storage;
pub mod telemetry;
