use std::time::Duration;

/// Exponential backoff policy for connection attempts.
///
/// One policy instance is scoped to a single connect cycle; a fresh clone is
/// taken each time a connect cycle starts, and `reset` is called when an
/// attempt first succeeds.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    factor: u32,
    max_delay: Duration,
    max_attempts: Option<u32>,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::unbounded(Duration::from_secs(1), 2, Duration::from_secs(60))
    }
}

impl Backoff {
    /// Policy that retries forever.
    #[must_use]
    pub const fn unbounded(initial: Duration, factor: u32, max_delay: Duration) -> Self {
        Self {
            initial,
            factor,
            max_delay,
            max_attempts: None,
            attempt: 0,
        }
    }

    /// Policy that gives up after `max_attempts` consultations.
    #[must_use]
    pub const fn bounded(
        initial: Duration,
        factor: u32,
        max_delay: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial,
            factor,
            max_delay,
            max_attempts: Some(max_attempts),
            attempt: 0,
        }
    }

    /// Delay to wait before the next attempt, or `None` when the attempt
    /// budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if self.attempt >= max {
                return None;
            }
        }

        // Exponent is clamped so the multiplier cannot overflow; the cap
        // below dominates well before that point.
        let exponent = self.attempt.min(16);
        let delay = self
            .initial
            .saturating_mul(self.factor.saturating_pow(exponent))
            .min(self.max_delay);

        self.attempt += 1;
        Some(delay)
    }

    /// Number of delays handed out so far.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the policy retries without bound.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none()
    }

    /// Reset the attempt counter after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_are_non_decreasing_and_capped() {
        let mut backoff =
            Backoff::unbounded(Duration::from_millis(100), 2, Duration::from_millis(800));

        let mut previous = Duration::ZERO;
        for _ in 0..10 {
            let delay = backoff.next_delay().unwrap();
            assert!(delay >= previous);
            assert!(delay <= Duration::from_millis(800));
            previous = delay;
        }
        assert_eq!(previous, Duration::from_millis(800));
    }

    #[test]
    fn bounded_policy_exhausts() {
        let mut backoff =
            Backoff::bounded(Duration::from_millis(10), 2, Duration::from_secs(1), 3);

        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.attempt(), 3);
    }

    #[test]
    fn unbounded_policy_never_exhausts() {
        let mut backoff = Backoff::default();
        for _ in 0..1000 {
            assert!(backoff.next_delay().is_some());
        }
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let mut backoff =
            Backoff::unbounded(Duration::from_millis(100), 2, Duration::from_secs(60));

        assert_eq!(backoff.next_delay().unwrap(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_millis(200));

        backoff.reset();
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_millis(100));
    }
}
