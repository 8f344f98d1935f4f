//! Reconnection schedule: exponential backoff with jitter and an attempt cap.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// When false a dropped connection stays down until `connect()` is called again.
    pub enabled: bool,
    /// Delay ceiling before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Retries after which the manager gives up (0 = unlimited).
    pub max_attempts: u32,
    /// Randomise each delay within `[ceiling / 2, ceiling]`.
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
            jitter: true,
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Un-jittered delay before retry number `attempt` (1-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retry number `attempt`, or `None` once retries are exhausted.
    pub fn delay_for<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Option<Duration> {
        if !self.enabled || attempt == 0 {
            return None;
        }
        if self.max_attempts > 0 && attempt > self.max_attempts {
            return None;
        }

        let ceiling = self.ceiling(attempt);
        if !self.jitter {
            return Some(ceiling);
        }

        let half = ceiling / 2;
        let spread = (ceiling - half).as_millis() as u64;
        Some(half + Duration::from_millis(rng.gen_range(0..=spread)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_ceiling_doubles_and_caps() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.ceiling(1), Duration::from_millis(100));
        assert_eq!(policy.ceiling(2), Duration::from_millis(200));
        assert_eq!(policy.ceiling(4), Duration::from_millis(800));
        assert_eq!(policy.ceiling(5), Duration::from_millis(1000));
        assert_eq!(policy.ceiling(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_jittered_delay_stays_in_band() {
        let policy = ReconnectPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..=policy.max_attempts {
            let ceiling = policy.ceiling(attempt);
            let delay = policy.delay_for(attempt, &mut rng).unwrap();
            assert!(delay <= ceiling, "attempt {attempt}: {delay:?} > {ceiling:?}");
            assert!(delay >= ceiling / 2, "attempt {attempt}: {delay:?} too short");
        }
    }

    #[test]
    fn test_attempts_are_capped() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            jitter: false,
            ..ReconnectPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert!(policy.delay_for(3, &mut rng).is_some());
        assert!(policy.delay_for(4, &mut rng).is_none());
    }

    #[test]
    fn test_disabled_policy_never_retries() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(ReconnectPolicy::disabled().delay_for(1, &mut rng).is_none());
    }
}
