use serde::Deserialize;
use tracing::{info, warn};

use super::registry::{DeviceRegistry, DeviceRole};
use super::{BatteryMonitor, PulseCounter, SwitchDevice, TemperatureProbe};

#[cfg(feature = "sim")]
use super::simulated::{SimulatedMonitor, SimulatedProbe, SimulatedPulseCounter, SimulatedSwitch};
#[cfg(feature = "sim")]
use super::MonitorReading;

/// Hardware mode configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareMode {
    /// Simulated bus devices for development and testing
    #[cfg(feature = "sim")]
    Simulated,
    /// Nothing found on the bus; the controller runs on nominal values
    Detached,
}

/// Handles onto the simulated devices so a driver loop can steer them
#[cfg(feature = "sim")]
#[derive(Debug, Clone)]
pub struct SimulatedRig {
    pub monitor: SimulatedMonitor,
    pub switch: SimulatedSwitch,
    pub probe: SimulatedProbe,
    pub pulses: SimulatedPulseCounter,
}

/// Devices found on the bus, attached by role
#[derive(Default)]
pub struct DeviceSet {
    pub registry: DeviceRegistry,
    pub monitor: Option<Box<dyn BatteryMonitor>>,
    pub switch: Option<Box<dyn SwitchDevice>>,
    pub probe: Option<Box<dyn TemperatureProbe>>,
    /// Rotor pulse capture; not a bus device, so not in the registry
    pub pulses: Option<Box<dyn PulseCounter>>,
    #[cfg(feature = "sim")]
    pub rig: Option<SimulatedRig>,
}

impl DeviceSet {
    pub fn detached() -> Self {
        Self::default()
    }
}

/// Factory for the device set the station runs against
pub struct DeviceFactory {
    mode: HardwareMode,
}

impl DeviceFactory {
    pub fn new(mode: HardwareMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> HardwareMode {
        self.mode
    }

    /// Enumerate the bus and attach a driver for every resolved role
    pub fn create_devices(&self) -> DeviceSet {
        match self.mode {
            #[cfg(feature = "sim")]
            HardwareMode::Simulated => {
                let rig = SimulatedRig {
                    monitor: SimulatedMonitor::new(MonitorReading {
                        volts_raw: 790,
                        amps_raw: 0,
                        temp_raw: 2000,
                        charge: 0,
                        dca: 0,
                        cca: 0,
                    }),
                    switch: SimulatedSwitch::new(false),
                    probe: SimulatedProbe::new(2000),
                    pulses: SimulatedPulseCounter::default(),
                };
                let registry = DeviceRegistry::resolve([
                    SimulatedMonitor::rom(),
                    SimulatedSwitch::rom(),
                    SimulatedProbe::rom(),
                ]);

                let mut set = DeviceSet {
                    registry,
                    ..Default::default()
                };
                if set.registry.has(DeviceRole::Battery) {
                    set.monitor = Some(Box::new(rig.monitor.clone()));
                }
                if set.registry.has(DeviceRole::Switch) {
                    set.switch = Some(Box::new(rig.switch.clone()));
                }
                if set.registry.has(DeviceRole::ThermalProbe) {
                    set.probe = Some(Box::new(rig.probe.clone()));
                }
                set.pulses = Some(Box::new(rig.pulses.clone()));
                set.rig = Some(rig);
                info!("using simulated bus devices");
                set
            }
            HardwareMode::Detached => {
                warn!("no bus devices attached, running on nominal battery values");
                DeviceSet::detached()
            }
        }
    }
}

impl Default for DeviceFactory {
    fn default() -> Self {
        Self::new(HardwareMode::Detached)
    }
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;

    #[test]
    fn test_factory_attaches_simulated_devices() {
        let set = DeviceFactory::new(HardwareMode::Simulated).create_devices();
        assert!(set.registry.has(DeviceRole::Battery));
        assert!(set.registry.has(DeviceRole::Switch));
        assert!(set.registry.has(DeviceRole::ThermalProbe));
        assert!(set.monitor.is_some());
        assert!(set.switch.is_some());
        assert!(set.probe.is_some());
        assert!(set.pulses.is_some());
        assert!(set.rig.is_some());
    }

    #[test]
    fn test_detached_factory_has_no_devices() {
        let set = DeviceFactory::default().create_devices();
        assert_eq!(set.registry, DeviceRegistry::default());
        assert!(set.monitor.is_none());
        assert!(set.switch.is_none());
        assert!(set.probe.is_none());
    }
}
