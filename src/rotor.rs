//! Generator speed from the rotor pulse period.

use tracing::trace;

use crate::filter::{Extremum, MinMaxTracker, RollingWindow};

/// Capture timer counts per second (16 µs per count)
const COUNTS_PER_SECOND: u32 = 1_000_000 / 16;
/// Anything at or above this is a glitch on the pulse input
const MAX_PLAUSIBLE_RPM: u32 = 1000;
const MINUTES_PER_HOUR: usize = 60;

pub struct RotorSpeed {
    poles: u32,
    samples: RollingWindow,
    hour_max: MinMaxTracker,
    last_minute: u64,
    rpm: i16,
    max_rpm: i16,
}

impl RotorSpeed {
    pub fn new(poles: i16, window: usize, uptime: u64) -> Self {
        Self {
            poles: poles.max(1) as u32,
            samples: RollingWindow::new(window),
            hour_max: MinMaxTracker::new(MINUTES_PER_HOUR, Extremum::Max),
            last_minute: uptime,
            rpm: 0,
            max_rpm: 0,
        }
    }

    /// Fold in the latest capture period; 0 means the rotor is stalled
    pub fn update(&mut self, period: u16, uptime: u64) {
        if period == 0 {
            self.rpm = 0;
        } else {
            // 60 / poles first: the integer order matters for small periods
            let rpm = COUNTS_PER_SECOND * (60 / self.poles) / period as u32;
            if rpm < MAX_PLAUSIBLE_RPM {
                self.samples.add(rpm as i16);
            } else {
                trace!(rpm, period, "rejected rotor speed glitch");
            }
            if let Ok(average) = self.samples.average() {
                self.rpm = average;
            }
        }

        if uptime >= self.last_minute + 60 {
            self.last_minute = uptime;
            self.hour_max.advance();
        }
        self.max_rpm = self.hour_max.update(self.rpm);
    }

    pub fn rpm(&self) -> i16 {
        self.rpm
    }

    /// Highest speed over the trailing hour
    pub fn max_rpm(&self) -> i16 {
        self.max_rpm
    }
}
