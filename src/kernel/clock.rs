// Monotonic millisecond time and interval bookkeeping
//
// All comparisons use wrapping subtraction so a counter rollover never
// stalls or double-fires a timer.

/// Monotonic millisecond clock.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

#[inline]
pub fn elapsed_ms(since: u64, now: u64) -> u64 {
    now.wrapping_sub(since)
}

/// Fires once `period_ms` has passed since the last `reset`.
/// A fresh interval is due immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    period_ms: u64,
    last: Option<u64>,
}

impl Interval {
    pub const fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            last: None,
        }
    }

    pub const fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Timestamp of the last reset, `None` before the first one.
    pub const fn last(&self) -> Option<u64> {
        self.last
    }

    pub fn is_due(&self, now: u64) -> bool {
        match self.last {
            None => true,
            Some(t) => elapsed_ms(t, now) >= self.period_ms,
        }
    }

    pub fn reset(&mut self, now: u64) {
        self.last = Some(now);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_interval_is_due() {
        let iv = Interval::new(1000);
        assert!(iv.is_due(0));
        assert_eq!(iv.last(), None);
    }

    #[test]
    fn due_exactly_at_period() {
        let mut iv = Interval::new(1000);
        iv.reset(500);
        assert!(!iv.is_due(1499));
        assert!(iv.is_due(1500));
    }

    #[test]
    fn survives_counter_wrap() {
        let mut iv = Interval::new(100);
        iv.reset(u64::MAX - 10);
        assert!(!iv.is_due(50));
        assert!(iv.is_due(89));
    }
}
