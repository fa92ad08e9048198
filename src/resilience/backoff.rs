//! Pause between retry attempts.

use std::time::Duration;

use rand::Rng;

/// Exponential delay schedule: `base`, `2 * base`, `4 * base`, ... capped at
/// `max`, each stretched by up to a tenth at random so that callers retrying
/// the same instance drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    /// A cap below `base_ms` is raised to `base_ms`.
    pub fn from_millis(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base: Duration::from_millis(base_ms),
            max: Duration::from_millis(max_ms.max(base_ms)),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.base.is_zero()
    }

    /// Pause before retry number `retry` (1-based). Retry 0 never waits.
    pub fn delay(&self, retry: u32) -> Duration {
        if retry == 0 || self.is_disabled() {
            return Duration::ZERO;
        }

        let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
        let nominal = self.base.saturating_mul(factor).min(self.max);

        let spread = nominal.as_micros() as u64 / 10;
        if spread == 0 {
            return nominal;
        }
        nominal + Duration::from_micros(rand::thread_rng().gen_range(0..spread))
    }
}
