use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Stops using a failing remote cache for the rest of the build once it has failed
/// `max_failures` times. There is no half-open state: a tripped breaker stays tripped until the
/// build ends.
///
#[derive(Debug)]
pub struct DisableOnErrorBreaker {
    max_failures: usize,
    failures: AtomicUsize,
    disabled: AtomicBool,
}

impl DisableOnErrorBreaker {
    pub fn new(max_failures: usize) -> Self {
        Self {
            max_failures: max_failures.max(1),
            failures: AtomicUsize::new(0),
            disabled: AtomicBool::new(false),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Acquire)
    }

    /// Count a failure. Returns `true` only for the call that trips the breaker.
    pub fn record_failure(&self) -> bool {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures < self.max_failures {
            return false;
        }
        self.disabled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_once_at_the_threshold() {
        let breaker = DisableOnErrorBreaker::new(3);
        assert!(!breaker.record_failure());
        assert!(!breaker.record_failure());
        assert!(!breaker.is_disabled());
        assert!(breaker.record_failure());
        assert!(breaker.is_disabled());
        assert!(!breaker.record_failure());
        assert_eq!(breaker.failures(), 4);
    }

    #[test]
    fn a_zero_threshold_trips_on_the_first_failure() {
        let breaker = DisableOnErrorBreaker::new(0);
        assert!(breaker.record_failure());
        assert!(breaker.is_disabled());
    }

    #[test]
    fn concurrent_failures_trip_it_exactly_once() {
        let breaker = std::sync::Arc::new(DisableOnErrorBreaker::new(5));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let breaker = breaker.clone();
                std::thread::spawn(move || breaker.record_failure())
            })
            .collect();
        let trips = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|tripped| *tripped)
            .count();
        assert_eq!(trips, 1);
        assert!(breaker.is_disabled());
    }
}
