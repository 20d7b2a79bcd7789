//! # Charge Controller
//!
//! Runs once per tick after the estimator has published. Two independent
//! pieces of state are driven from the battery snapshot:
//!
//! - the dump load, a PWM duty shaped against a voltage envelope chosen by
//!   the bulk/absorb/float charge mode
//! - the inverter load, switched through the remote-button [`Relay`] by
//!   operator commands, under-voltage protection and, in automatic mode, a
//!   charge/discharge cycle driven towards `target_charge`

pub mod duty;
pub mod relay;

use tracing::{debug, info, warn};

use crate::config::ChargeConfig;
use crate::domain::{
    BatteryState, ChargeMode, Event, EventKind, EventLog, InverterControl, LoadCommand, LoadState,
};
use crate::hardware::DumpLoadOutput;
use crate::storage::{PersistentStore, StoreExt, StoreKey};

pub use duty::{shaping, Envelope, EnvelopeLimits, MAX_DUTY};
pub use relay::Relay;

/// Dump duty (0-100) at which shunt-on is reported
const SHUNT_REPORT_DUTY: u16 = 50;

pub struct ChargeController {
    config: ChargeConfig,
    relay: Relay,
    output: Box<dyn DumpLoadOutput>,
    mode: ChargeMode,
    /// Last value written to the PWM register
    duty: u16,
    /// Dump load as a percentage, for display
    dump: u16,
    shunt_reported: bool,
    load: LoadState,
    target_charge: i16,
    discharge_cycles: i16,
    pending: Option<LoadCommand>,
}

impl ChargeController {
    /// Drives the relay off so the load starts from a known state, then
    /// resumes the discharge cycle count from the store.
    pub fn new(
        config: ChargeConfig,
        mut relay: Relay,
        mut output: Box<dyn DumpLoadOutput>,
        store: &dyn PersistentStore,
    ) -> Self {
        output.set_duty(0);
        if relay.has_switch() && !relay.toggle_state(false) {
            warn!("inverter did not confirm off at startup");
        }

        let discharge_cycles = store.load_i16(StoreKey::DischargeCycles).unwrap_or(0);
        let target_charge = if discharge_cycles == 0 {
            config.bank_size
        } else {
            config.max_charge
        };
        info!(
            discharge_cycles,
            target_charge,
            inverter = %config.inverter,
            "charge controller ready"
        );

        Self {
            mode: ChargeMode::Bulk,
            duty: 0,
            dump: 0,
            shunt_reported: false,
            load: LoadState::Off,
            target_charge,
            discharge_cycles,
            pending: None,
            config,
            relay,
            output,
        }
    }

    /// Queue an operator command for the next tick; replaces any command not
    /// yet consumed
    pub fn command(&mut self, command: LoadCommand) {
        if let Some(previous) = self.pending.replace(command) {
            debug!(%previous, %command, "replaced pending load command");
        }
    }

    pub fn pending_command(&self) -> Option<LoadCommand> {
        self.pending
    }

    pub fn tick(
        &mut self,
        state: &BatteryState,
        store: &mut dyn PersistentStore,
        events: &mut dyn EventLog,
    ) {
        self.regulate_dump_load(state, events);
        if self.config.inverter != InverterControl::Disabled {
            self.control_inverter(state, store, events);
        }
    }

    fn regulate_dump_load(&mut self, state: &BatteryState, events: &mut dyn EventLog) {
        self.mode = ChargeMode::classify(state.charge, self.config.bank_size);
        let limits = EnvelopeLimits {
            volts_upper: self.config.volts_upper,
            absorb_volts: self.config.absorb_volts,
            float_volts: self.config.float_volts,
        };
        let envelope = Envelope::for_mode(self.mode, &limits, state.temperature);

        self.duty = envelope.duty(state.volts);
        self.output.set_duty(self.duty);
        self.dump = (self.duty / 10).min(100);

        if (state.volts as i32) <= envelope.low {
            if self.shunt_reported {
                self.shunt_reported = false;
                events.emit(Event::new(EventKind::ShuntOff));
            }
        } else if !self.shunt_reported && self.dump >= SHUNT_REPORT_DUTY {
            self.shunt_reported = true;
            events.emit(Event::new(EventKind::ShuntOn));
        }
    }

    fn control_inverter(
        &mut self,
        state: &BatteryState,
        store: &mut dyn PersistentStore,
        events: &mut dyn EventLog,
    ) {
        match self.pending.take() {
            Some(LoadCommand::ManualOff) => {
                if self.relay.toggle_state(false) {
                    self.load = LoadState::Off;
                    self.target_charge = self.config.bank_size;
                    events.emit(Event::new(EventKind::ManualOff));
                } else {
                    events.emit(Event::failed(EventKind::ManualOff));
                }
            }
            // runs until under-voltage or a manual off
            Some(LoadCommand::ManualOn) => {
                if self.relay.toggle_state(true) {
                    self.load = LoadState::On;
                    self.target_charge = 0;
                    events.emit(Event::new(EventKind::ManualOn));
                } else {
                    events.emit(Event::failed(EventKind::ManualOn));
                }
            }
            None => {}
        }

        // Level triggered: retried every tick while the voltage stays low
        if state.volts < self.config.volts_lower {
            if self.relay.toggle_state(false) {
                self.load = LoadState::Off;
                self.target_charge = self.config.bank_size;
                events.emit(Event::new(EventKind::UnderVolt));
            } else {
                events.emit(Event::failed(EventKind::UnderVolt));
            }
        }

        if self.config.inverter == InverterControl::Automatic {
            self.cycle_load(state, store, events);
        }
    }

    fn cycle_load(
        &mut self,
        state: &BatteryState,
        store: &mut dyn PersistentStore,
        events: &mut dyn EventLog,
    ) {
        match self.load {
            LoadState::Off if state.volts > self.config.volts_upper => {
                if self.relay.toggle_state(true) {
                    self.load = LoadState::On;
                    // discharge only slightly so the forced run stays short
                    self.target_charge = (state.charge as f64 * 0.99) as i16;
                    events.emit(Event::new(EventKind::OverVolt));
                } else {
                    events.emit(Event::failed(EventKind::OverVolt));
                }
            }
            LoadState::Off if state.charge >= self.target_charge => {
                if self.relay.toggle_state(true) {
                    self.load = LoadState::Auto;
                    self.target_charge = self.config.min_charge;
                    events.emit(Event::new(EventKind::Charged));
                } else {
                    events.emit(Event::failed(EventKind::Charged));
                }
            }
            LoadState::Off => {}
            LoadState::On | LoadState::Auto if state.charge <= self.target_charge => {
                if self.relay.toggle_state(false) {
                    self.load = LoadState::Off;
                    events.emit(Event::new(EventKind::Discharged));
                    self.next_charge_target();
                    store.persist_i16(StoreKey::DischargeCycles, self.discharge_cycles);
                } else {
                    events.emit(Event::failed(EventKind::Discharged));
                }
            }
            LoadState::On | LoadState::Auto => {}
        }
    }

    /// A float charge to the full bank every `max_discharge` partial cycles
    fn next_charge_target(&mut self) {
        if self.discharge_cycles >= self.config.max_discharge || self.discharge_cycles < 0 {
            self.discharge_cycles = 0;
            self.target_charge = self.config.bank_size;
        } else {
            self.discharge_cycles += 1;
            self.target_charge = self.config.max_charge;
        }
        debug!(
            discharge_cycles = self.discharge_cycles,
            target_charge = self.target_charge,
            "discharge cycle complete"
        );
    }

    pub fn mode(&self) -> ChargeMode {
        self.mode
    }

    /// Raw PWM register value, `0..=MAX_DUTY`
    pub fn duty(&self) -> u16 {
        self.duty
    }

    /// Dump load, 0-100
    pub fn dump(&self) -> u16 {
        self.dump
    }

    pub fn load(&self) -> LoadState {
        self.load
    }

    pub fn target_charge(&self) -> i16 {
        self.target_charge
    }

    pub fn discharge_cycles(&self) -> i16 {
        self.discharge_cycles
    }

    pub fn inverter(&self) -> InverterControl {
        self.config.inverter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventJournal;
    use crate::hardware::simulated::{RecordingDelay, SimulatedPwm, SimulatedSwitch};
    use crate::storage::MemoryStore;

    struct Rig {
        controller: ChargeController,
        switch: SimulatedSwitch,
        pwm: SimulatedPwm,
        store: MemoryStore,
        events: EventJournal,
    }

    impl Rig {
        fn new(inverter: InverterControl) -> Self {
            Self::with_store(inverter, MemoryStore::new())
        }

        fn with_store(inverter: InverterControl, store: MemoryStore) -> Self {
            let switch = SimulatedSwitch::new(false);
            let pwm = SimulatedPwm::default();
            let config = ChargeConfig {
                inverter,
                ..ChargeConfig::default()
            };
            let relay = Relay::new(
                Some(Box::new(switch.clone())),
                Box::new(RecordingDelay::default()),
            );
            let controller = ChargeController::new(config, relay, Box::new(pwm.clone()), &store);
            Self {
                controller,
                switch,
                pwm,
                store,
                events: EventJournal::new(),
            }
        }

        fn tick(&mut self, state: &BatteryState) {
            self.controller
                .tick(state, &mut self.store, &mut self.events);
        }
    }

    fn battery(volts: i16, charge: i16) -> BatteryState {
        BatteryState {
            volts,
            volts_now: volts,
            temperature: 2500,
            charge,
            ..Default::default()
        }
    }

    #[test]
    fn test_initial_target_from_discharge_count() {
        let rig = Rig::new(InverterControl::Automatic);
        assert_eq!(rig.controller.target_charge(), 1000);
        assert_eq!(rig.controller.load(), LoadState::Off);

        let mut store = MemoryStore::new();
        store.write_i16(StoreKey::DischargeCycles, 3).unwrap();
        let rig = Rig::with_store(InverterControl::Automatic, store);
        assert_eq!(rig.controller.target_charge(), 900);
        assert_eq!(rig.controller.discharge_cycles(), 3);
    }

    #[test]
    fn test_startup_turns_a_running_inverter_off() {
        let switch = SimulatedSwitch::new(true);
        let relay = Relay::new(
            Some(Box::new(switch.clone())),
            Box::new(RecordingDelay::default()),
        );
        let _ = ChargeController::new(
            ChargeConfig::default(),
            relay,
            Box::new(SimulatedPwm::default()),
            &MemoryStore::new(),
        );
        assert!(!switch.is_on());
    }

    #[test]
    fn test_shunt_events_are_edge_triggered() {
        let mut rig = Rig::new(InverterControl::Disabled);
        // float mode, envelope 2646..2700
        rig.tick(&battery(2700, 1000));
        assert_eq!(rig.pwm.duty(), MAX_DUTY);
        assert_eq!(rig.controller.dump(), 100);
        rig.tick(&battery(2700, 1000));
        assert_eq!(rig.events.kinds(), vec![EventKind::ShuntOn]);

        rig.tick(&battery(2640, 1000));
        rig.tick(&battery(2640, 1000));
        assert_eq!(rig.pwm.duty(), 0);
        assert_eq!(rig.events.kinds(), vec![EventKind::ShuntOn, EventKind::ShuntOff]);
    }

    #[test]
    fn test_low_dump_is_not_reported() {
        let mut rig = Rig::new(InverterControl::Disabled);
        rig.tick(&battery(2660, 1000));
        assert!(rig.pwm.duty() > 0);
        assert!(rig.controller.dump() < 50);
        assert!(rig.events.is_empty());
    }

    #[test]
    fn test_disabled_inverter_ignores_commands_and_low_volts() {
        let mut rig = Rig::new(InverterControl::Disabled);
        rig.controller.command(LoadCommand::ManualOn);
        rig.tick(&battery(2100, 500));
        assert!(!rig.switch.is_on());
        assert_eq!(rig.switch.presses(), 0);
    }

    #[test]
    fn test_manual_commands_are_consumed_once() {
        let mut rig = Rig::new(InverterControl::Manual);
        rig.controller.command(LoadCommand::ManualOn);
        rig.tick(&battery(2500, 800));
        assert_eq!(rig.controller.load(), LoadState::On);
        assert_eq!(rig.controller.target_charge(), 0);
        assert!(rig.switch.is_on());
        assert_eq!(rig.controller.pending_command(), None);

        rig.controller.command(LoadCommand::ManualOff);
        rig.tick(&battery(2500, 800));
        assert_eq!(rig.controller.load(), LoadState::Off);
        assert_eq!(rig.controller.target_charge(), 1000);
        assert_eq!(
            rig.events.kinds(),
            vec![EventKind::ManualOn, EventKind::ManualOff]
        );
    }

    #[test]
    fn test_failed_manual_command_is_dropped() {
        let mut rig = Rig::new(InverterControl::Manual);
        rig.switch.set_stuck(true);
        rig.controller.command(LoadCommand::ManualOn);
        rig.tick(&battery(2500, 800));
        assert_eq!(rig.controller.load(), LoadState::Off);
        assert!(rig.events.contains(Event::failed(EventKind::ManualOn)));

        rig.switch.set_stuck(false);
        rig.tick(&battery(2500, 800));
        assert_eq!(rig.switch.presses(), 1);
    }

    #[test]
    fn test_newer_command_replaces_pending() {
        let mut rig = Rig::new(InverterControl::Manual);
        rig.controller.command(LoadCommand::ManualOn);
        rig.controller.command(LoadCommand::ManualOff);
        assert_eq!(rig.controller.pending_command(), Some(LoadCommand::ManualOff));
    }

    #[test]
    fn test_under_voltage_retries_every_tick() {
        let mut rig = Rig::new(InverterControl::Manual);
        rig.controller.command(LoadCommand::ManualOn);
        rig.tick(&battery(2500, 800));
        assert!(rig.switch.is_on());

        rig.switch.set_stuck(true);
        rig.tick(&battery(2150, 800));
        rig.tick(&battery(2150, 800));
        assert_eq!(rig.switch.presses(), 3);
        assert_eq!(rig.controller.load(), LoadState::On);

        rig.switch.set_stuck(false);
        rig.tick(&battery(2150, 800));
        assert!(!rig.switch.is_on());
        assert_eq!(rig.controller.load(), LoadState::Off);
        assert_eq!(rig.controller.target_charge(), 1000);
        assert_eq!(
            rig.events.kinds(),
            vec![
                EventKind::ManualOn,
                EventKind::UnderVolt,
                EventKind::UnderVolt,
                EventKind::UnderVolt
            ]
        );
        assert!(rig.events.contains(Event::failed(EventKind::UnderVolt)));
    }

    #[test]
    fn test_over_voltage_forces_short_run() {
        let mut rig = Rig::new(InverterControl::Automatic);
        rig.tick(&battery(2901, 850));
        assert_eq!(rig.controller.load(), LoadState::On);
        assert_eq!(rig.controller.target_charge(), 841);
        assert_eq!(rig.controller.mode(), ChargeMode::Bulk);
        assert!(rig.events.contains(Event::new(EventKind::OverVolt)));
    }

    #[test]
    fn test_automatic_cycle() {
        let mut rig = Rig::new(InverterControl::Automatic);
        // charge up to the full bank first
        rig.tick(&battery(2600, 990));
        assert_eq!(rig.controller.load(), LoadState::Off);
        rig.tick(&battery(2600, 1000));
        assert_eq!(rig.controller.load(), LoadState::Auto);
        assert_eq!(rig.controller.target_charge(), 500);

        rig.tick(&battery(2500, 501));
        assert_eq!(rig.controller.load(), LoadState::Auto);
        rig.tick(&battery(2500, 500));
        assert_eq!(rig.controller.load(), LoadState::Off);
        assert_eq!(rig.controller.discharge_cycles(), 1);
        assert_eq!(rig.controller.target_charge(), 900);
        assert_eq!(rig.store.read_i16(StoreKey::DischargeCycles).unwrap(), Some(1));
        assert_eq!(
            rig.events.kinds(),
            vec![EventKind::Charged, EventKind::Discharged]
        );
    }

    #[test]
    fn test_float_charge_after_max_discharge_cycles() {
        let mut store = MemoryStore::new();
        store.write_i16(StoreKey::DischargeCycles, 5).unwrap();
        let mut rig = Rig::with_store(InverterControl::Automatic, store);

        rig.tick(&battery(2600, 950));
        assert_eq!(rig.controller.load(), LoadState::Auto);
        rig.tick(&battery(2500, 480));
        assert_eq!(rig.controller.discharge_cycles(), 0);
        assert_eq!(rig.controller.target_charge(), 1000);
        assert_eq!(rig.store.read_i16(StoreKey::DischargeCycles).unwrap(), Some(0));
    }

    #[test]
    fn test_negative_cycle_count_resets() {
        let mut store = MemoryStore::new();
        store.write_i16(StoreKey::DischargeCycles, -4).unwrap();
        let mut rig = Rig::with_store(InverterControl::Automatic, store);
        rig.tick(&battery(2600, 950));
        rig.tick(&battery(2500, 400));
        assert_eq!(rig.controller.discharge_cycles(), 0);
    }

    #[test]
    fn test_manual_mode_does_not_cycle() {
        let mut rig = Rig::new(InverterControl::Manual);
        rig.tick(&battery(2950, 1000));
        assert_eq!(rig.controller.load(), LoadState::Off);
        assert!(!rig.switch.is_on());
    }
}
