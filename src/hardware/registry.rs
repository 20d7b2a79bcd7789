use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// 64-bit bus ROM code, family byte first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RomCode(pub [u8; 8]);

impl RomCode {
    pub fn family(&self) -> u8 {
        self.0[0]
    }
}

impl fmt::Display for RomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

/// What a device found on the bus is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceRole {
    /// Smart battery monitor with coulomb counter
    Battery,
    /// Dual-channel addressable switch
    Switch,
    /// Stand-alone digital thermometer
    ThermalProbe,
}

impl DeviceRole {
    pub const BATTERY_FAMILY: u8 = 0x26;
    pub const SWITCH_FAMILY: u8 = 0x3a;
    pub const PROBE_FAMILIES: [u8; 2] = [0x28, 0x10];

    pub fn from_family(family: u8) -> Option<Self> {
        match family {
            Self::BATTERY_FAMILY => Some(DeviceRole::Battery),
            Self::SWITCH_FAMILY => Some(DeviceRole::Switch),
            f if Self::PROBE_FAMILIES.contains(&f) => Some(DeviceRole::ThermalProbe),
            _ => None,
        }
    }
}

/// Bus devices resolved to their roles once at enumeration time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRegistry {
    battery: Option<RomCode>,
    switch: Option<RomCode>,
    probe: Option<RomCode>,
}

impl DeviceRegistry {
    /// Resolve enumerated ROM codes. The first device of each role wins.
    pub fn resolve(found: impl IntoIterator<Item = RomCode>) -> Self {
        let mut registry = Self::default();
        for rom in found {
            let Some(role) = DeviceRole::from_family(rom.family()) else {
                debug!(rom = %rom, "ignoring unknown bus device");
                continue;
            };
            let slot = registry.slot_mut(role);
            if slot.is_none() {
                info!(rom = %rom, ?role, "bus device found");
                *slot = Some(rom);
            }
        }
        registry
    }

    pub fn get(&self, role: DeviceRole) -> Option<&RomCode> {
        match role {
            DeviceRole::Battery => self.battery.as_ref(),
            DeviceRole::Switch => self.switch.as_ref(),
            DeviceRole::ThermalProbe => self.probe.as_ref(),
        }
    }

    pub fn has(&self, role: DeviceRole) -> bool {
        self.get(role).is_some()
    }

    fn slot_mut(&mut self, role: DeviceRole) -> &mut Option<RomCode> {
        match role {
            DeviceRole::Battery => &mut self.battery,
            DeviceRole::Switch => &mut self.switch,
            DeviceRole::ThermalProbe => &mut self.probe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom(family: u8, serial: u8) -> RomCode {
        RomCode([family, serial, 0, 0, 0, 0, 0, 0x5a])
    }

    #[test]
    fn test_resolve_roles() {
        let registry = DeviceRegistry::resolve([rom(0x26, 1), rom(0x3a, 2), rom(0x99, 3)]);
        assert_eq!(registry.get(DeviceRole::Battery), Some(&rom(0x26, 1)));
        assert!(registry.has(DeviceRole::Switch));
        assert!(!registry.has(DeviceRole::ThermalProbe));
    }

    #[test]
    fn test_first_device_of_role_wins() {
        let registry = DeviceRegistry::resolve([rom(0x28, 1), rom(0x10, 2)]);
        assert_eq!(registry.get(DeviceRole::ThermalProbe), Some(&rom(0x28, 1)));
    }

    #[test]
    fn test_empty_bus() {
        let registry = DeviceRegistry::resolve(std::iter::empty());
        assert_eq!(registry, DeviceRegistry::default());
    }

    #[test]
    fn test_rom_display() {
        assert_eq!(rom(0x26, 0xab).to_string(), "26:ab0000000000:5a");
    }
}
