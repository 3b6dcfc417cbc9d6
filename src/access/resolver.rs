// src/access/resolver.rs
//
// Turns a normalized plate code into an access decision: exact registry match,
// then a bounded edit-distance scan, then the cooldown check.

use super::cooldown::CooldownLedger;
use super::edit_distance::edit_distance;
use crate::error::RegistryResult;
use crate::interface::Registry;
use crate::types::{AccessConfig, AccessDecision, DecisionReason, RegistryEntry};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Decided(AccessDecision),
    /// Same key decided inside the cooldown window; nothing is emitted.
    Suppressed { key: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    pub authorized: u64,
    pub denied: u64,
    pub fuzzy_matches: u64,
    pub suppressed: u64,
    pub lookup_failures: u64,
}

pub struct AccessResolver {
    ledger: CooldownLedger,
    max_edit_distance: usize,
    stats: ResolverStats,
}

impl AccessResolver {
    pub fn new(config: &AccessConfig) -> Self {
        Self {
            ledger: CooldownLedger::new(
                config.cooldown_window_secs,
                config.cooldown_retention_secs,
            ),
            max_edit_distance: config.max_edit_distance,
            stats: ResolverStats::default(),
        }
    }

    /// Resolve `code` against the registry at time `now`.
    ///
    /// Registry failures never escape: they become an unauthorized decision
    /// with a `lookup failed` reason, which is neither suppressed nor recorded
    /// in the cooldown ledger.
    pub fn resolve(&mut self, code: &str, registry: &dyn Registry, now: DateTime<Utc>) -> Resolution {
        let matched = match lookup(registry, code, self.max_edit_distance) {
            Ok(m) => m,
            Err(e) => {
                warn!("⚠️  Registry lookup failed for {}: {}", code, e);
                self.stats.lookup_failures += 1;
                return Resolution::Decided(AccessDecision {
                    code: code.to_string(),
                    authorized: false,
                    info: "unknown".to_string(),
                    reason: DecisionReason::LookupFailed {
                        cause: e.to_string(),
                    },
                    match_confidence: 0,
                    timestamp: now,
                });
            }
        };

        let key = matched
            .as_ref()
            .map(|(entry, _)| entry.code.as_str())
            .unwrap_or(code);

        if self.ledger.is_suppressed(key, now) {
            debug!("⏳ {} in cooldown, decision suppressed", key);
            self.stats.suppressed += 1;
            return Resolution::Suppressed {
                key: key.to_string(),
            };
        }
        self.ledger.record(key, now);

        let decision = match matched {
            Some((entry, 0)) => {
                self.stats.authorized += 1;
                AccessDecision {
                    code: code.to_string(),
                    authorized: true,
                    info: entry.info(),
                    reason: DecisionReason::Registered,
                    match_confidence: 100,
                    timestamp: now,
                }
            }
            Some((entry, distance)) => {
                info!(
                    "🔎 Fuzzy match: read {} resolved to {} (distance {})",
                    code, entry.code, distance
                );
                self.stats.authorized += 1;
                self.stats.fuzzy_matches += 1;
                AccessDecision {
                    code: code.to_string(),
                    authorized: true,
                    info: entry.info(),
                    reason: DecisionReason::RegisteredFuzzy { distance },
                    match_confidence: fuzzy_confidence(distance, entry.code.chars().count()),
                    timestamp: now,
                }
            }
            None => {
                self.stats.denied += 1;
                AccessDecision {
                    code: code.to_string(),
                    authorized: false,
                    info: "unknown".to_string(),
                    reason: DecisionReason::Unregistered,
                    match_confidence: 0,
                    timestamp: now,
                }
            }
        };

        Resolution::Decided(decision)
    }

    /// Prune stale cooldown records
    pub fn housekeeping(&mut self, now: DateTime<Utc>) -> usize {
        self.ledger.prune(now)
    }

    pub fn ledger(&self) -> &CooldownLedger {
        &self.ledger
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats
    }
}

/// Exact active match (distance 0), else the closest active entry within
/// `max_distance`.
fn lookup(
    registry: &dyn Registry,
    code: &str,
    max_distance: usize,
) -> RegistryResult<Option<(RegistryEntry, usize)>> {
    if let Some(entry) = registry.find_exact(code)? {
        if entry.active {
            return Ok(Some((entry, 0)));
        }
    }
    let candidates = registry.find_all_active()?;
    Ok(best_fuzzy_match(code, &candidates, max_distance))
}

/// Minimum edit distance wins; ties go to the lowest registry id, then the
/// lexicographically smallest code.
pub fn best_fuzzy_match(
    code: &str,
    candidates: &[RegistryEntry],
    max_distance: usize,
) -> Option<(RegistryEntry, usize)> {
    candidates
        .iter()
        .filter(|e| e.active)
        .map(|e| (e, edit_distance(code, &e.code)))
        .filter(|(_, d)| *d <= max_distance)
        .min_by(|(a, da), (b, db)| {
            da.cmp(db)
                .then_with(|| a.id.cmp(&b.id))
                .then_with(|| a.code.cmp(&b.code))
        })
        .map(|(e, d)| (e.clone(), d))
}

fn fuzzy_confidence(distance: usize, len: usize) -> u8 {
    if len == 0 {
        return 0;
    }
    let penalty = (100 * distance / len).min(100);
    (100 - penalty) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::MemoryRegistry;
    use crate::error::RegistryError;
    use chrono::{Duration, TimeZone};

    fn entry(id: u32, code: &str, owner: &str, model: &str) -> RegistryEntry {
        RegistryEntry {
            id,
            code: code.to_string(),
            owner: owner.to_string(),
            model: model.to_string(),
            color: String::new(),
            active: true,
            registered_at: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn registry() -> MemoryRegistry {
        MemoryRegistry::in_memory(vec![entry(1, "POX4G21", "Carlos", "Civic")])
    }

    fn decided(r: Resolution) -> AccessDecision {
        match r {
            Resolution::Decided(d) => d,
            Resolution::Suppressed { key } => panic!("unexpected suppression of {}", key),
        }
    }

    struct OfflineRegistry;

    impl Registry for OfflineRegistry {
        fn find_exact(&self, _code: &str) -> RegistryResult<Option<RegistryEntry>> {
            Err(RegistryError::Unavailable("db offline".into()))
        }
        fn find_all_active(&self) -> RegistryResult<Vec<RegistryEntry>> {
            Err(RegistryError::Unavailable("db offline".into()))
        }
        fn log_decision(&mut self, _decision: &AccessDecision) -> RegistryResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_exact_match_authorized() {
        let mut resolver = AccessResolver::new(&AccessConfig::default());
        let d = decided(resolver.resolve("POX4G21", &registry(), t0()));
        assert!(d.authorized);
        assert_eq!(d.info, "Carlos - Civic");
        assert_eq!(d.reason_text(), "registered");
        assert_eq!(d.match_confidence, 100);
    }

    #[test]
    fn test_unknown_code_denied() {
        let mut resolver = AccessResolver::new(&AccessConfig::default());
        let d = decided(resolver.resolve("XYZ9Q99", &registry(), t0()));
        assert!(!d.authorized);
        assert_eq!(d.reason, DecisionReason::Unregistered);
        assert_eq!(d.info, "unknown");
        assert_eq!(resolver.stats().denied, 1);
    }

    #[test]
    fn test_fuzzy_match_within_distance() {
        let mut resolver = AccessResolver::new(&AccessConfig::default());
        let d = decided(resolver.resolve("POX4G27", &registry(), t0()));
        assert!(d.authorized);
        assert_eq!(d.reason, DecisionReason::RegisteredFuzzy { distance: 1 });
        assert_eq!(d.code, "POX4G27");
        assert_eq!(d.match_confidence, 86);
    }

    #[test]
    fn test_fuzzy_limit_is_inclusive() {
        let config = AccessConfig {
            max_edit_distance: 2,
            ..Default::default()
        };
        let mut resolver = AccessResolver::new(&config);
        let d = decided(resolver.resolve("QOX4G22", &registry(), t0()));
        assert_eq!(d.reason, DecisionReason::RegisteredFuzzy { distance: 2 });
        let d = decided(resolver.resolve("QOY4G22", &registry(), t0()));
        assert_eq!(d.reason, DecisionReason::Unregistered);
    }

    #[test]
    fn test_fuzzy_tie_prefers_lowest_id() {
        let candidates = vec![
            entry(7, "ABC1D24", "Late", "A"),
            entry(3, "ABC1D22", "Early", "B"),
        ];
        let (best, d) = best_fuzzy_match("ABC1D23", &candidates, 3).unwrap();
        assert_eq!(d, 1);
        assert_eq!(best.id, 3);

        let closer = vec![entry(9, "ABC1D23", "Exact", "C"), entry(1, "ABC1D99", "Far", "D")];
        assert_eq!(best_fuzzy_match("ABC1D23", &closer, 3).unwrap().0.id, 9);
    }

    #[test]
    fn test_cooldown_emits_once_inside_window() {
        let mut resolver = AccessResolver::new(&AccessConfig::default());
        let reg = registry();
        assert!(matches!(
            resolver.resolve("POX4G21", &reg, t0()),
            Resolution::Decided(_)
        ));
        assert_eq!(
            resolver.resolve("POX4G21", &reg, t0() + Duration::seconds(5)),
            Resolution::Suppressed {
                key: "POX4G21".into()
            }
        );
        // Suppressed attempt did not push the window out
        assert!(matches!(
            resolver.resolve("POX4G21", &reg, t0() + Duration::seconds(16)),
            Resolution::Decided(_)
        ));
        assert_eq!(resolver.stats().suppressed, 1);
        assert_eq!(resolver.stats().authorized, 2);
    }

    #[test]
    fn test_fuzzy_reads_share_cooldown_with_registered_code() {
        let mut resolver = AccessResolver::new(&AccessConfig::default());
        let reg = registry();
        decided(resolver.resolve("POX4G21", &reg, t0()));
        assert_eq!(
            resolver.resolve("POX4G27", &reg, t0() + Duration::seconds(2)),
            Resolution::Suppressed {
                key: "POX4G21".into()
            }
        );
    }

    #[test]
    fn test_denied_codes_also_cool_down() {
        let mut resolver = AccessResolver::new(&AccessConfig::default());
        let reg = registry();
        decided(resolver.resolve("XYZ9Q99", &reg, t0()));
        assert!(matches!(
            resolver.resolve("XYZ9Q99", &reg, t0() + Duration::seconds(1)),
            Resolution::Suppressed { .. }
        ));
    }

    #[test]
    fn test_registry_failure_is_a_denial_not_a_crash() {
        let mut resolver = AccessResolver::new(&AccessConfig::default());
        let d = decided(resolver.resolve("POX4G21", &OfflineRegistry, t0()));
        assert!(!d.authorized);
        assert!(d.reason_text().starts_with("lookup failed"));
        assert!(resolver.ledger().is_empty());

        // Still decided again: failures are not cooled down
        let d = decided(resolver.resolve("POX4G21", &OfflineRegistry, t0()));
        assert!(!d.authorized);
        assert_eq!(resolver.stats().lookup_failures, 2);
    }

    #[test]
    fn test_housekeeping_prunes_after_retention() {
        let mut resolver = AccessResolver::new(&AccessConfig::default());
        decided(resolver.resolve("POX4G21", &registry(), t0()));
        assert_eq!(resolver.housekeeping(t0() + Duration::seconds(30)), 0);
        assert_eq!(resolver.housekeeping(t0() + Duration::seconds(61)), 1);
        assert!(resolver.ledger().is_empty());
    }
}
