use super::FilterError;

/// Smallest window the filter will run with
pub const MIN_WINDOW: usize = 1;
/// Largest window the filter will run with
pub const MAX_WINDOW: usize = 60;

/// Integer sample type that can be held in a [`RollingWindow`].
///
/// Averages are summed in `i64` so a full window never overflows; the mean of
/// in-range samples is always in range again, so narrowing back is lossless.
pub trait Sample: Copy + Ord + Default {
    fn widen(self) -> i64;
    fn narrow(value: i64) -> Self;
}

impl Sample for i16 {
    fn widen(self) -> i64 {
        self as i64
    }

    fn narrow(value: i64) -> Self {
        value as i16
    }
}

impl Sample for i32 {
    fn widen(self) -> i64 {
        self as i64
    }

    fn narrow(value: i64) -> Self {
        value as i32
    }
}

/// Fixed-capacity ring of the most recent samples with median, average and
/// extremum queries.
///
/// Used to reject single-sample glitches from the sensor bus: the median of a
/// short window ignores an outlier completely, the average smooths the rest.
///
/// Insertion order is never disturbed by a query; order statistics are taken
/// from a scratch copy that the window owns.
#[derive(Debug, Clone)]
pub struct RollingWindow<T = i16> {
    samples: Vec<T>,
    sorted: Vec<T>,
    cursor: usize,
    len: usize,
}

impl<T: Sample> RollingWindow<T> {
    /// Create an empty window. Capacity is constrained to
    /// `MIN_WINDOW..=MAX_WINDOW`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(MIN_WINDOW, MAX_WINDOW);
        Self {
            samples: vec![T::default(); capacity],
            sorted: Vec::with_capacity(capacity),
            cursor: 0,
            len: 0,
        }
    }

    /// Add a sample, overwriting the oldest once the window is full
    pub fn add(&mut self, value: T) {
        self.samples[self.cursor] = value;
        self.cursor = (self.cursor + 1) % self.samples.len();
        if self.len < self.samples.len() {
            self.len += 1;
        }
    }

    /// Middle of the sorted samples (lower median for even counts)
    pub fn median(&mut self) -> Result<T, FilterError> {
        let sorted = self.sort()?;
        Ok(sorted[sorted.len() / 2])
    }

    /// Truncating integer mean of the valid samples
    pub fn average(&self) -> Result<T, FilterError> {
        if self.len == 0 {
            return Err(FilterError::EmptyWindow);
        }
        let sum: i64 = self.valid().iter().map(|s| s.widen()).sum();
        Ok(T::narrow(sum / self.len as i64))
    }

    pub fn highest(&mut self) -> Result<T, FilterError> {
        let sorted = self.sort()?;
        Ok(sorted[sorted.len() - 1])
    }

    pub fn lowest(&mut self) -> Result<T, FilterError> {
        let sorted = self.sort()?;
        Ok(sorted[0])
    }

    pub fn count(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forget every sample; capacity is kept
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.len = 0;
    }

    fn valid(&self) -> &[T] {
        // until the ring wraps the valid samples are the first `len` slots,
        // afterwards every slot is valid
        &self.samples[..self.len]
    }

    fn sort(&mut self) -> Result<&[T], FilterError> {
        if self.len == 0 {
            return Err(FilterError::EmptyWindow);
        }
        self.sorted.clear();
        self.sorted.extend_from_slice(&self.samples[..self.len]);

        // insertion sort, windows are at most 60 samples
        for i in 1..self.sorted.len() {
            let mut j = i;
            while j > 0 && self.sorted[j - 1] > self.sorted[j] {
                self.sorted.swap(j - 1, j);
                j -= 1;
            }
        }
        Ok(&self.sorted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_window_queries_fail() {
        let mut window = RollingWindow::<i16>::new(5);
        assert!(window.is_empty());
        assert_eq!(window.median(), Err(FilterError::EmptyWindow));
        assert_eq!(window.average(), Err(FilterError::EmptyWindow));
        assert_eq!(window.highest(), Err(FilterError::EmptyWindow));
        assert_eq!(window.lowest(), Err(FilterError::EmptyWindow));
    }

    #[test]
    fn test_median_rejects_glitch() {
        let mut window = RollingWindow::<i16>::new(5);
        for v in [2500, 2510, 9999, 2490, 2505] {
            window.add(v);
        }
        assert_eq!(window.median(), Ok(2505));
        assert_eq!(window.highest(), Ok(9999));
        assert_eq!(window.lowest(), Ok(2490));
    }

    #[test]
    fn test_lower_median_on_even_count() {
        let mut window = RollingWindow::<i16>::new(10);
        for v in [4, 1, 3, 2] {
            window.add(v);
        }
        // sorted [1, 2, 3, 4], index 4 / 2 = 2
        assert_eq!(window.median(), Ok(3));
    }

    #[test]
    fn test_average_truncates() {
        let mut window = RollingWindow::<i16>::new(10);
        window.add(1);
        window.add(2);
        assert_eq!(window.average(), Ok(1));

        let mut window = RollingWindow::<i16>::new(10);
        window.add(-1);
        window.add(-2);
        assert_eq!(window.average(), Ok(-1));
    }

    #[test]
    fn test_ring_overwrites_oldest() {
        let mut window = RollingWindow::<i16>::new(3);
        for v in [100, 200, 300, 400] {
            window.add(v);
        }
        assert_eq!(window.count(), 3);
        assert_eq!(window.average(), Ok(300));
        assert_eq!(window.lowest(), Ok(200));
    }

    #[test]
    fn test_capacity_is_constrained() {
        assert_eq!(RollingWindow::<i16>::new(0).capacity(), MIN_WINDOW);
        assert_eq!(RollingWindow::<i16>::new(500).capacity(), MAX_WINDOW);
    }

    #[test]
    fn test_reset_empties_window() {
        let mut window = RollingWindow::<i32>::new(5);
        window.add(70_000);
        window.reset();
        assert!(window.is_empty());
        assert_eq!(window.capacity(), 5);
    }

    #[test]
    fn test_query_does_not_disturb_insertion_order() {
        let mut window = RollingWindow::<i16>::new(3);
        window.add(30);
        window.add(10);
        window.add(20);
        assert_eq!(window.median(), Ok(20));
        // oldest (30) is overwritten next, not the smallest
        window.add(40);
        assert_eq!(window.lowest(), Ok(10));
        assert_eq!(window.highest(), Ok(40));
    }

    proptest! {
        #[test]
        fn prop_average_is_mean_of_last_capacity(
            capacity in 1usize..=60,
            values in proptest::collection::vec(-3000i16..3000, 1..200),
        ) {
            let mut window = RollingWindow::<i16>::new(capacity);
            for &v in &values {
                window.add(v);
            }
            let start = values.len().saturating_sub(capacity);
            let recent = &values[start..];
            let sum: i64 = recent.iter().map(|&v| v as i64).sum();
            prop_assert_eq!(window.count(), recent.len());
            prop_assert_eq!(window.average(), Ok((sum / recent.len() as i64) as i16));
        }

        #[test]
        fn prop_median_is_middle_of_recent_and_idempotent(
            capacity in 1usize..=60,
            values in proptest::collection::vec(any::<i16>(), 1..200),
        ) {
            let mut window = RollingWindow::<i16>::new(capacity);
            for &v in &values {
                window.add(v);
            }
            let start = values.len().saturating_sub(capacity);
            let mut recent = values[start..].to_vec();
            recent.sort();
            let first = window.median();
            prop_assert_eq!(first, Ok(recent[recent.len() / 2]));
            prop_assert_eq!(window.median(), first);
        }
    }
}
