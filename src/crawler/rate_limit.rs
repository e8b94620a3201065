use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Per-domain pacing via token reservation. The map holds the next instant a
/// request to a domain may start; reservations advance it by `1/rps`.
///
/// Two policies:
/// - [`try_reserve`](Self::try_reserve): reserve-or-skip, used by the crawl
///   scheduler to pick ready items from its pending buffer without blocking.
/// - [`acquire`](Self::acquire): queue-reserve, callers take the next free
///   slot and sleep until it arrives, so concurrent callers line up
///   monotonically with no thundering herd.
pub struct DomainRateLimiter {
    min_interval: Duration,
    next_allowed_at: Mutex<HashMap<String, Instant>>,
}

impl DomainRateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        Self {
            min_interval: Duration::from_secs_f64(1.0 / requests_per_second),
            next_allowed_at: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve a slot for `domain` if one is available right now.
    pub fn try_reserve(&self, domain: &str) -> bool {
        let now = Instant::now();
        let mut map = self.next_allowed_at.lock().expect("rate limiter lock");
        match map.get(domain) {
            Some(next) if now < *next => false,
            _ => {
                map.insert(domain.to_string(), now + self.min_interval);
                true
            }
        }
    }

    /// Wait for the next slot for `domain`. The slot is claimed before
    /// sleeping, so the gap between any two admissions is at least the
    /// configured interval regardless of caller count.
    pub async fn acquire(&self, domain: &str) {
        let my_slot = {
            let now = Instant::now();
            let mut map = self.next_allowed_at.lock().expect("rate limiter lock");
            let slot = match map.get(domain) {
                Some(next) if *next > now => *next,
                _ => now,
            };
            map.insert(domain.to_string(), slot + self.min_interval);
            slot
        };
        tokio::time::sleep_until(my_slot).await;
    }

    /// How long until `domain` has a free slot. Used to size scheduler waits.
    pub fn seconds_until_ready(&self, domain: &str) -> Duration {
        let now = Instant::now();
        let map = self.next_allowed_at.lock().expect("rate limiter lock");
        match map.get(domain) {
            Some(next) if *next > now => *next - now,
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reservation_succeeds_then_blocks() {
        let limiter = DomainRateLimiter::new(10.0);
        assert!(limiter.try_reserve("example.com"));
        assert!(!limiter.try_reserve("example.com"));
        // other domains are independent
        assert!(limiter.try_reserve("other.com"));
    }

    #[test]
    fn seconds_until_ready_reports_backoff() {
        let limiter = DomainRateLimiter::new(2.0);
        assert_eq!(limiter.seconds_until_ready("example.com"), Duration::ZERO);
        assert!(limiter.try_reserve("example.com"));
        let wait = limiter.seconds_until_ready("example.com");
        assert!(wait > Duration::ZERO && wait <= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn queued_acquires_space_out_monotonically() {
        let limiter = DomainRateLimiter::new(4.0);
        let start = Instant::now();
        limiter.acquire("example.com").await;
        limiter.acquire("example.com").await;
        limiter.acquire("example.com").await;
        // Three admissions: the third starts two intervals after the first.
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn reserve_after_interval_elapses() {
        let limiter = DomainRateLimiter::new(5.0);
        assert!(limiter.try_reserve("example.com"));
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(limiter.try_reserve("example.com"));
    }
}
