//! A single token bucket.

use std::time::Instant;

use parking_lot::Mutex;

/// A per-key token reservoir refilled by elapsed time.
///
/// The bucket starts full. Every consumption attempt first adds `elapsed * refill_rate`
/// tokens, capped at the capacity, so an idle key can burst at most `capacity` requests.
#[derive(Debug)]
pub struct Bucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    /// Create a full bucket. A capacity below one is raised to one, so the first request for
    /// a fresh key always passes even with a fractional rate.
    ///
    /// `refill_rate` must be positive and finite; [`crate::RateLimitManager::new`] rejects
    /// anything else before a bucket is ever built.
    pub fn new(refill_rate: f64, capacity: f64) -> Self {
        Self::new_at(refill_rate, capacity, Instant::now())
    }

    pub(crate) fn new_at(refill_rate: f64, capacity: f64, now: Instant) -> Self {
        let capacity = capacity.max(1.0);

        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now,
            }),
        }
    }

    /// Take one token if available.
    pub fn try_consume(&self) -> bool {
        self.try_consume_at(Instant::now())
    }

    pub(crate) fn try_consume_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state, now);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// When tokens were last computed, which is also when the key was last seen.
    pub fn last_refill(&self) -> Instant {
        self.state.lock().last_refill
    }

    /// Tokens currently available, as of the last refill.
    pub fn tokens(&self) -> f64 {
        self.state.lock().tokens
    }

    /// Maximum burst size.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        // A caller may hand in an instant taken before another thread refilled.
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();

        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = state.last_refill.max(now);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn starts_full() {
        let bucket = Bucket::new(5.0, 5.0);

        assert_eq!(bucket.tokens(), 5.0);
        assert_eq!(bucket.capacity(), 5.0);
    }

    #[test]
    fn fractional_capacity_is_raised_to_one() {
        let now = Instant::now();
        let bucket = Bucket::new_at(0.2, 0.2, now);

        assert_eq!(bucket.capacity(), 1.0);
        assert!(bucket.try_consume_at(now));
        assert!(!bucket.try_consume_at(now));
    }

    #[test]
    fn capacity_bounds_a_burst() {
        let now = Instant::now();
        let bucket = Bucket::new_at(5.0, 5.0, now);

        for i in 0..5 {
            assert!(bucket.try_consume_at(now), "request {} should pass", i + 1);
        }

        assert!(!bucket.try_consume_at(now));
    }

    #[test]
    fn refills_by_elapsed_time() {
        let start = Instant::now();
        let bucket = Bucket::new_at(10.0, 10.0, start);

        for _ in 0..10 {
            assert!(bucket.try_consume_at(start));
        }

        let later = start + Duration::from_millis(500);
        let admitted = (0..10).filter(|_| bucket.try_consume_at(later)).count();

        assert_eq!(admitted, 5);
    }

    #[test]
    fn idle_time_does_not_exceed_capacity() {
        let start = Instant::now();
        let bucket = Bucket::new_at(5.0, 5.0, start);

        assert!(bucket.try_consume_at(start));

        let much_later = start + Duration::from_secs(3600);
        let admitted = (0..20).filter(|_| bucket.try_consume_at(much_later)).count();

        assert_eq!(admitted, 5);
    }

    #[test]
    fn fractional_rate_refills_slowly() {
        let start = Instant::now();
        let bucket = Bucket::new_at(0.2, 0.2, start);

        assert!(bucket.try_consume_at(start));
        assert!(!bucket.try_consume_at(start + Duration::from_secs(4)));
        assert!(bucket.try_consume_at(start + Duration::from_secs(9)));
    }

    #[test]
    fn stale_instant_does_not_rewind() {
        let start = Instant::now();
        let bucket = Bucket::new_at(1.0, 1.0, start);
        let later = start + Duration::from_secs(2);

        assert!(bucket.try_consume_at(later));
        assert!(!bucket.try_consume_at(start));
        assert_eq!(bucket.last_refill(), later);
    }

    #[test]
    fn tokens_never_go_negative() {
        let now = Instant::now();
        let bucket = Bucket::new_at(3.0, 3.0, now);

        for _ in 0..10 {
            bucket.try_consume_at(now);
        }

        assert!(bucket.tokens() >= 0.0);
    }
}
