//! Circuit Breaker for the tracking provider.
//!
//! Stops a pass from paying for lookups against a degraded provider.
//!
//! > If more than **50%** of the provider lookups attempted in a pass failed,
//! > once at least **5** lookups were attempted, the remaining candidates in
//! > that pass are skipped.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::models::CircuitBreakerSettings;

/// Circuit breaker for provider lookups.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerSettings,
}

/// Result of circuit breaker check.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerResult {
    /// Safe to keep calling the provider
    Safe { attempts: usize, failures: usize },
    /// Too few attempts to judge
    Warmup { attempts: usize },
    /// Failure rate above the threshold; skip the rest of the pass
    Triggered {
        attempts: usize,
        failures: usize,
        failure_percent: f64,
    },
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default configuration.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerSettings::default())
    }

    /// Create a new circuit breaker with custom configuration.
    pub fn with_config(config: CircuitBreakerSettings) -> Self {
        Self { config }
    }

    /// Judge the provider from the attempts made so far.
    pub fn check(&self, attempts: usize, failures: usize) -> CircuitBreakerResult {
        if attempts == 0 || attempts < self.config.min_baseline {
            return CircuitBreakerResult::Warmup { attempts };
        }

        let failure_percent = (failures as f64 / attempts as f64) * 100.0;
        if failure_percent > self.config.max_failure_percent as f64 {
            return CircuitBreakerResult::Triggered {
                attempts,
                failures,
                failure_percent,
            };
        }

        CircuitBreakerResult::Safe { attempts, failures }
    }

    /// Check a running tally, logging once when it trips.
    pub fn allows(&self, tally: &ProviderTally) -> bool {
        let (attempts, failures) = tally.snapshot();
        match self.check(attempts, failures) {
            CircuitBreakerResult::Safe { .. } | CircuitBreakerResult::Warmup { .. } => true,
            CircuitBreakerResult::Triggered {
                attempts,
                failures,
                failure_percent,
            } => {
                if !tally.tripped.swap(true, Ordering::SeqCst) {
                    log::error!(
                        "Circuit breaker: TRIGGERED! {}/{} provider lookups failed ({:.1}% > {}% threshold); skipping the rest of this pass",
                        failures,
                        attempts,
                        failure_percent,
                        self.config.max_failure_percent
                    );
                }
                false
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider attempts and failures within one pass.
#[derive(Debug, Default)]
pub struct ProviderTally {
    attempts: AtomicUsize,
    failures: AtomicUsize,
    tripped: AtomicBool,
}

impl ProviderTally {
    pub fn record(&self, failed: bool) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if failed {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.attempts.load(Ordering::SeqCst),
            self.failures.load(Ordering::SeqCst),
        )
    }

    pub fn tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warmup_below_baseline() {
        let cb = CircuitBreaker::new();
        assert_eq!(cb.check(4, 4), CircuitBreakerResult::Warmup { attempts: 4 });
        assert_eq!(cb.check(0, 0), CircuitBreakerResult::Warmup { attempts: 0 });
    }

    #[test]
    fn test_safe_at_threshold() {
        let cb = CircuitBreaker::new();
        assert!(matches!(cb.check(10, 5), CircuitBreakerResult::Safe { .. }));
    }

    #[test]
    fn test_triggered_above_threshold() {
        let cb = CircuitBreaker::new();
        assert!(matches!(
            cb.check(10, 6),
            CircuitBreakerResult::Triggered { .. }
        ));
    }

    #[test]
    fn test_custom_threshold() {
        let cb = CircuitBreaker::with_config(CircuitBreakerSettings {
            max_failure_percent: 10,
            min_baseline: 2,
        });
        assert!(matches!(
            cb.check(5, 1),
            CircuitBreakerResult::Triggered { .. }
        ));
    }

    #[test]
    fn test_tally_trips_once() {
        let cb = CircuitBreaker::new();
        let tally = ProviderTally::default();
        for _ in 0..5 {
            tally.record(true);
        }
        assert!(!cb.allows(&tally));
        assert!(tally.tripped());
        assert!(!cb.allows(&tally));
    }
}
