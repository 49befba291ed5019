use std::time::{Duration, Instant};

/// Time left until the deadline, zero if it has already passed.
#[inline]
pub fn remaining(now: Instant, deadline: Instant) -> Duration {
    deadline.saturating_duration_since(now)
}

/// The shorter of the wait and the time left until the deadline.
#[inline]
pub fn bounded_wait(wait: Duration, now: Instant, deadline: Instant) -> Duration {
    wait.min(remaining(now, deadline))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_saturates() {
        let now = Instant::now();

        assert_eq!(remaining(now + Duration::from_secs(5), now), Duration::from_secs(0));
        assert_eq!(remaining(now, now + Duration::from_secs(5)), Duration::from_secs(5));
    }

    #[test]
    fn test_bounded_wait() {
        let now = Instant::now();
        let deadline = now + Duration::from_secs(2);

        assert_eq!(bounded_wait(Duration::from_secs(60), now, deadline), Duration::from_secs(2));
        assert_eq!(bounded_wait(Duration::from_secs(1), now, deadline), Duration::from_secs(1));
    }
}
