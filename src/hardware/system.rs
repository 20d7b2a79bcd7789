use std::time::{Duration, Instant};

use chrono::Utc;

use super::{Clock, Delay, DumpLoadOutput};

/// Host clock: `Instant` for uptime, UTC for wall time
#[derive(Debug, Clone)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn uptime(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    fn time(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Blocking delay. Only the relay press uses it, and nothing else has to run
/// while the relay is held.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}

/// PWM compare register with the 10-bit top of the dump load timer
#[derive(Debug, Clone, Copy, Default)]
pub struct PwmRegister {
    value: u16,
}

impl PwmRegister {
    pub const TOP: u16 = 0x3ff;

    pub fn value(&self) -> u16 {
        self.value
    }
}

impl DumpLoadOutput for PwmRegister {
    fn set_duty(&mut self, value: u16) {
        self.value = value.min(Self::TOP);
    }
}
