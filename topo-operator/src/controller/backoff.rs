//! Per-identity exponential backoff.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::resource::NamespacedName;

/// Backoff bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(300),
        }
    }
}

/// Tracks consecutive failures per identity; delay doubles with each one.
pub struct Backoff {
    config: BackoffConfig,
    failures: Mutex<HashMap<NamespacedName, u32>>,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn next_delay(&self, key: &NamespacedName) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let attempt = failures.entry(key.clone()).or_insert(0);
        let delay = self
            .config
            .base
            .checked_mul(2u32.saturating_pow(*attempt))
            .unwrap_or(self.config.max)
            .min(self.config.max);
        *attempt = attempt.saturating_add(1);
        delay
    }

    /// Forget the failure history of an identity.
    pub fn forget(&self, key: &NamespacedName) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    pub fn failures(&self, key: &NamespacedName) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_and_capped() {
        let backoff = Backoff::new(BackoffConfig {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
        });
        let key = NamespacedName::new("onos", "switch");

        let delays: Vec<_> = (0..6).map(|_| backoff.next_delay(&key)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_secs(1),
                Duration::from_secs(1),
            ]
        );
        assert_eq!(backoff.failures(&key), 6);

        backoff.forget(&key);
        assert_eq!(backoff.next_delay(&key), Duration::from_millis(100));
    }

    #[test]
    fn test_many_failures_do_not_overflow() {
        let backoff = Backoff::new(BackoffConfig::default());
        let key = NamespacedName::new("onos", "switch");
        for _ in 0..100 {
            assert!(backoff.next_delay(&key) <= Duration::from_secs(300));
        }
    }
}
