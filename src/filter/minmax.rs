use serde::{Deserialize, Serialize};

/// Which extremum a [`MinMaxTracker`] keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Extremum {
    Min,
    Max,
}

impl Extremum {
    /// Value that any real sample replaces
    pub fn absorbing(self) -> i16 {
        match self {
            Extremum::Min => i16::MAX,
            Extremum::Max => i16::MIN,
        }
    }

    fn pick(self, a: i16, b: i16) -> i16 {
        match self {
            Extremum::Min => a.min(b),
            Extremum::Max => a.max(b),
        }
    }
}

/// Running extremum over a trailing period, kept as one cell per time bucket
/// (minute-of-hour, hour-of-day, ...).
///
/// The cell under the cursor collects the extremum of the bucket in progress.
/// The caller advances the cursor once per bucket boundary, which drops the
/// oldest bucket. Queries scan every cell; capacities are at most 60.
#[derive(Debug, Clone)]
pub struct MinMaxTracker {
    cells: Vec<i16>,
    cursor: usize,
    mode: Extremum,
}

impl MinMaxTracker {
    pub fn new(capacity: usize, mode: Extremum) -> Self {
        let capacity = capacity.clamp(1, super::rolling::MAX_WINDOW);
        Self {
            cells: vec![mode.absorbing(); capacity],
            cursor: 0,
            mode,
        }
    }

    /// Start a new bucket, discarding the oldest one
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.cells.len();
        self.cells[self.cursor] = self.mode.absorbing();
    }

    /// Fold `value` into the current bucket and return the extremum over the
    /// whole trailing period
    pub fn update(&mut self, value: i16) -> i16 {
        let cell = &mut self.cells[self.cursor];
        *cell = self.mode.pick(*cell, value);
        self.extreme()
    }

    /// Extremum over the whole trailing period without adding a sample.
    /// Returns the absorbing element while no bucket holds a sample.
    pub fn extreme(&self) -> i16 {
        self.cells
            .iter()
            .fold(self.mode.absorbing(), |acc, &v| self.mode.pick(acc, v))
    }

    pub fn mode(&self) -> Extremum {
        self.mode
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }
}
