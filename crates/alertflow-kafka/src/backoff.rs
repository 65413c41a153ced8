use std::time::Duration;

/// Exponential backoff schedule: `base * 2^attempt`, capped.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Backoff { base, cap }
    }

    pub fn from_millis(base_ms: u64, cap_ms: u64) -> Self {
        Backoff::new(Duration::from_millis(base_ms), Duration::from_millis(cap_ms))
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.min(16);
        self.base
            .saturating_mul(1u32 << shift)
            .min(self.cap)
    }
}

impl Default for Backoff {
    /// 100 ms doubling up to 5 s.
    fn default() -> Self {
        Backoff::from_millis(100, 5_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_the_cap() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(5), Duration::from_millis(3_200));
        assert_eq!(backoff.delay(6), Duration::from_millis(5_000));
        assert_eq!(backoff.delay(60), Duration::from_millis(5_000));
    }
}
