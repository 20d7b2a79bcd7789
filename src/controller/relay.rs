//! Push-button relay driving the inverter remote.
//!
//! The switch device has two output latches wired across the inverter's
//! remote button and two sense inputs on its indicator. A press is a pulse
//! on the outputs; success is judged only by the indicator afterwards.

use tracing::{debug, warn};

use crate::hardware::{Delay, SwitchDevice};

/// Output latch pattern that closes the remote button
pub const PIN_PRESS: u8 = 0x02;
/// Output latch pattern that releases it
pub const PIN_RELEASE: u8 = 0x03;
/// Sense pattern while the inverter is running
pub const SENSE_ON: u8 = 0x4b;
/// Sense pattern while the inverter is off
pub const SENSE_OFF: u8 = 0x0f;

const PRESS_HOLD_MS: u32 = 500;
const SETTLE_MS: u32 = 150;

pub struct Relay {
    switch: Option<Box<dyn SwitchDevice>>,
    delay: Box<dyn Delay>,
}

impl Relay {
    pub fn new(switch: Option<Box<dyn SwitchDevice>>, delay: Box<dyn Delay>) -> Self {
        Self { switch, delay }
    }

    pub fn has_switch(&self) -> bool {
        self.switch.is_some()
    }

    /// Drive the load to `on` and report whether the indicator agrees.
    ///
    /// Reads first and returns without pressing when the load is already in
    /// the requested state. Without a switch device this always succeeds.
    /// There is no retry; the caller decides whether to try again next tick.
    pub fn toggle_state(&mut self, on: bool) -> bool {
        let Some(switch) = self.switch.as_mut() else {
            return true;
        };
        let expected = if on { SENSE_ON } else { SENSE_OFF };

        let sensed = switch.read();
        if sensed == expected {
            return true;
        }

        debug!(on, sensed, "pressing inverter remote");
        if !switch.write(PIN_PRESS) {
            warn!(on, "switch did not acknowledge press");
            return false;
        }
        self.delay.delay_ms(PRESS_HOLD_MS);
        if !switch.write(PIN_RELEASE) {
            warn!(on, "switch did not acknowledge release");
            return false;
        }
        self.delay.delay_ms(SETTLE_MS);

        let sensed = switch.read();
        if sensed != expected {
            warn!(on, sensed, expected, "inverter did not follow the remote");
            return false;
        }
        true
    }
}
