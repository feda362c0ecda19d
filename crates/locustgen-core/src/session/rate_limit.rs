use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Width of the rate-limit window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Admits at most `capacity` requests in any `window`-long span.
///
/// Only admitted requests are recorded, so a client hammering past the cap
/// does not push its own recovery further out.
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    window: Duration,
    capacity: u32,
    admitted: VecDeque<Instant>,
}

impl SlidingWindowLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            window,
            capacity,
            admitted: VecDeque::with_capacity(capacity as usize),
        }
    }

    pub fn per_minute(capacity: u32) -> Self {
        Self::new(capacity, RATE_WINDOW)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Record a request at `now` if there is room for it.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.admitted.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }

        if self.admitted.len() >= self.capacity as usize {
            return false;
        }
        self.admitted.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_request_past_capacity() {
        let start = Instant::now();
        let mut limiter = SlidingWindowLimiter::per_minute(3);
        for i in 0..3 {
            assert!(limiter.try_acquire(start + Duration::from_secs(i)));
        }
        assert!(!limiter.try_acquire(start + Duration::from_secs(5)));
        assert!(!limiter.try_acquire(start + Duration::from_secs(59)));
    }

    #[test]
    fn admits_again_once_oldest_slides_out() {
        let start = Instant::now();
        let mut limiter = SlidingWindowLimiter::per_minute(2);
        assert!(limiter.try_acquire(start));
        assert!(limiter.try_acquire(start + Duration::from_secs(30)));
        assert!(!limiter.try_acquire(start + Duration::from_secs(59)));

        // Only the first request has left the window.
        assert!(limiter.try_acquire(start + Duration::from_secs(60)));
        assert!(!limiter.try_acquire(start + Duration::from_secs(61)));
        assert!(limiter.try_acquire(start + Duration::from_secs(90)));
    }

    #[test]
    fn rejected_requests_are_not_recorded() {
        let start = Instant::now();
        let mut limiter = SlidingWindowLimiter::per_minute(1);
        assert!(limiter.try_acquire(start));
        for s in 1..50 {
            assert!(!limiter.try_acquire(start + Duration::from_secs(s)));
        }
        assert!(limiter.try_acquire(start + Duration::from_secs(60)));
    }
}
