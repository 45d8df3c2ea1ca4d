// ── Availability tracking ──
//
// Counts consecutive failed cycles so a single missed poll does not flip
// availability. The threshold is fixed per configuration.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub consecutive_failures: u32,
    pub available: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub cycles: u64,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            available: true,
            last_success: None,
            last_error: None,
            cycles: 0,
        }
    }
}

pub(crate) struct HealthTracker {
    tx: watch::Sender<Health>,
}

impl HealthTracker {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(Health::default());
        Self { tx }
    }

    pub(crate) fn current(&self) -> Health {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Health> {
        self.tx.subscribe()
    }

    pub(crate) fn record_success(&self, at: DateTime<Utc>) {
        self.tx.send_modify(|h| {
            if !h.available {
                info!(
                    after_failures = h.consecutive_failures,
                    "heat pump available again"
                );
            }
            h.consecutive_failures = 0;
            h.available = true;
            h.last_success = Some(at);
            h.last_error = None;
            h.cycles += 1;
        });
    }

    pub(crate) fn record_failure(&self, error: &str, unavailable_after: u32) {
        self.tx.send_modify(|h| {
            h.consecutive_failures = h.consecutive_failures.saturating_add(1);
            h.last_error = Some(error.to_owned());
            h.cycles += 1;
            if h.available && h.consecutive_failures >= unavailable_after {
                h.available = false;
                warn!(
                    consecutive_failures = h.consecutive_failures,
                    "heat pump unavailable"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_flips_only_at_threshold() {
        let tracker = HealthTracker::new();
        tracker.record_failure("timeout", 2);
        assert!(tracker.current().available);
        assert_eq!(tracker.current().consecutive_failures, 1);

        tracker.record_failure("timeout", 2);
        assert!(!tracker.current().available);

        tracker.record_success(Utc::now());
        let health = tracker.current();
        assert!(health.available);
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.last_error.is_none());
        assert_eq!(health.cycles, 3);
    }

    #[test]
    fn threshold_of_one_flips_immediately() {
        let tracker = HealthTracker::new();
        tracker.record_failure("refused", 1);
        assert!(!tracker.current().available);
    }
}
