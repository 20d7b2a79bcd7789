use crate::filter::{Extremum, MinMaxTracker};

const MINUTES_PER_HOUR: usize = 60;
const HOURS_PER_DAY: usize = 24;

/// Power extrema over the trailing hour and day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extrema {
    pub hour_max: i16,
    pub hour_min: i16,
    pub day_max: i16,
    pub day_min: i16,
}

impl Default for Extrema {
    fn default() -> Self {
        Self {
            hour_max: Extremum::Max.absorbing(),
            hour_min: Extremum::Min.absorbing(),
            day_max: Extremum::Max.absorbing(),
            day_min: Extremum::Min.absorbing(),
        }
    }
}

/// One cell per minute for the hour trackers, one per hour for the day
/// trackers. The day cells are fed the hour extremum, not raw samples.
#[derive(Debug, Clone)]
pub struct PowerExtrema {
    hour_max: MinMaxTracker,
    hour_min: MinMaxTracker,
    day_max: MinMaxTracker,
    day_min: MinMaxTracker,
}

impl PowerExtrema {
    pub fn new() -> Self {
        Self {
            hour_max: MinMaxTracker::new(MINUTES_PER_HOUR, Extremum::Max),
            hour_min: MinMaxTracker::new(MINUTES_PER_HOUR, Extremum::Min),
            day_max: MinMaxTracker::new(HOURS_PER_DAY, Extremum::Max),
            day_min: MinMaxTracker::new(HOURS_PER_DAY, Extremum::Min),
        }
    }

    pub fn advance_minute(&mut self) {
        self.hour_max.advance();
        self.hour_min.advance();
    }

    pub fn advance_hour(&mut self) {
        self.day_max.advance();
        self.day_min.advance();
    }

    pub fn record(&mut self, power: i16) -> Extrema {
        let hour_max = self.hour_max.update(power);
        let hour_min = self.hour_min.update(power);
        Extrema {
            hour_max,
            hour_min,
            day_max: self.day_max.update(hour_max),
            day_min: self.day_min.update(hour_min),
        }
    }
}

impl Default for PowerExtrema {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hour_window_forgets_after_sixty_minutes() {
        let mut extrema = PowerExtrema::new();
        assert_eq!(extrema.record(500).hour_max, 500);
        for _ in 0..59 {
            extrema.advance_minute();
            extrema.record(100);
        }
        assert_eq!(extrema.record(100).hour_max, 500);

        extrema.advance_minute();
        let now = extrema.record(100);
        assert_eq!(now.hour_max, 100);
        // the day cell for this hour still holds the earlier peak
        assert_eq!(now.day_max, 500);
    }

    #[test]
    fn test_day_tracks_hour_minimum() {
        let mut extrema = PowerExtrema::new();
        extrema.record(-40);
        extrema.advance_hour();
        let now = extrema.record(20);
        assert_eq!(now.hour_min, -40);
        assert_eq!(now.day_min, -40);
        assert_eq!(now.day_max, 20);
    }
}
