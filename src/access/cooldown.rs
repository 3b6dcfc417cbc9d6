// src/access/cooldown.rs
//
// Short-term memory of recent decisions per key, so a car idling in front of
// the gate does not produce a decision every few frames.
//
// The window is anchored to the first accepted decision: suppressed attempts
// do not refresh the timestamp.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

pub struct CooldownLedger {
    window: Duration,
    retention: Duration,
    records: HashMap<String, DateTime<Utc>>,
}

impl CooldownLedger {
    pub fn new(window_secs: f64, retention_secs: f64) -> Self {
        Self {
            window: secs_to_duration(window_secs),
            retention: secs_to_duration(retention_secs),
            records: HashMap::new(),
        }
    }

    /// True while `now - last decision` is still inside the window.
    pub fn is_suppressed(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.records
            .get(key)
            .map(|last| now - *last < self.window)
            .unwrap_or(false)
    }

    pub fn record(&mut self, key: &str, now: DateTime<Utc>) {
        self.records.insert(key.to_string(), now);
    }

    pub fn last_decision(&self, key: &str) -> Option<DateTime<Utc>> {
        self.records.get(key).copied()
    }

    /// Drop records older than the retention window. Returns how many went.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        let retention = self.retention;
        self.records.retain(|_, last| now - *last <= retention);
        let pruned = before - self.records.len();
        if pruned > 0 {
            debug!("🧹 Pruned {} stale cooldown record(s)", pruned);
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::milliseconds((secs.max(0.0) * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_suppresses_inside_window() {
        let mut ledger = CooldownLedger::new(15.0, 60.0);
        assert!(!ledger.is_suppressed("POX4G21", t(0)));
        ledger.record("POX4G21", t(0));
        assert!(ledger.is_suppressed("POX4G21", t(14)));
        assert!(!ledger.is_suppressed("POX4G21", t(15)));
        assert!(!ledger.is_suppressed("ABC1D23", t(1)));
    }

    #[test]
    fn test_window_anchors_to_recorded_time() {
        let mut ledger = CooldownLedger::new(15.0, 60.0);
        ledger.record("POX4G21", t(0));
        // Checking does not move the anchor
        assert!(ledger.is_suppressed("POX4G21", t(10)));
        assert!(!ledger.is_suppressed("POX4G21", t(16)));
        assert_eq!(ledger.last_decision("POX4G21"), Some(t(0)));
    }

    #[test]
    fn test_prune_uses_retention_not_window() {
        let mut ledger = CooldownLedger::new(15.0, 60.0);
        ledger.record("OLD", t(0));
        ledger.record("NEW", t(50));

        assert_eq!(ledger.prune(t(30)), 0, "past the window but inside retention");
        assert_eq!(ledger.prune(t(61)), 1);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.last_decision("NEW").is_some());
    }
}
