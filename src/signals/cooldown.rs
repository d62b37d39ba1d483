// =============================================================================
// Cooldown Gate — Tiered repeat-alert suppression
// =============================================================================
//
// One record per symbol: when the last alert was accepted and in which score
// tier.  A new alert is accepted when
//
//   - the score reaches a configured tier, and
//   - there is no record, or the score is in a strictly stronger tier than the
//     recorded one, or more than the current tier's window has elapsed.
//
// Strong tiers carry short windows, weaker tiers longer ones.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::runtime_config::CooldownTier;

/// Last accepted alert for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownRecord {
    pub last_alert_at: DateTime<Utc>,
    /// Index into the gate's tiers (0 = strongest).
    pub tier_rank: usize,
}

pub struct CooldownGate {
    /// Sorted strongest (highest `min_score`) first.
    tiers: Vec<CooldownTier>,
    records: HashMap<String, CooldownRecord>,
}

impl CooldownGate {
    pub fn new(mut tiers: Vec<CooldownTier>) -> Self {
        tiers.sort_by(|a, b| b.min_score.cmp(&a.min_score));
        Self {
            tiers,
            records: HashMap::new(),
        }
    }

    /// Rank and definition of the tier `score` falls in. `None` when the
    /// score is below every tier.
    pub fn tier_for(&self, score: u32) -> Option<(usize, &CooldownTier)> {
        self.tiers
            .iter()
            .enumerate()
            .find(|(_, t)| score >= t.min_score)
    }

    /// Decide whether an alert for `symbol` may go out now. Records `now`
    /// when accepted.
    pub fn should_alert(&mut self, symbol: &str, score: u32, now: DateTime<Utc>) -> bool {
        let Some((rank, tier)) = self.tier_for(score) else {
            debug!(symbol, score, "below minimum alert tier");
            return false;
        };
        let window = Duration::seconds(tier.window_secs as i64);

        let accept = match self.records.get(symbol) {
            None => true,
            Some(rec) if rank < rec.tier_rank => true,
            Some(rec) => now - rec.last_alert_at > window,
        };

        if accept {
            self.records.insert(
                symbol.to_string(),
                CooldownRecord {
                    last_alert_at: now,
                    tier_rank: rank,
                },
            );
        } else {
            debug!(symbol, score, tier = %tier.name, "alert suppressed by cooldown");
        }
        accept
    }

    #[cfg(test)]
    pub fn record(&self, symbol: &str) -> Option<&CooldownRecord> {
        self.records.get(symbol)
    }

    /// Drop records whose longest possible window has passed.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let longest = self.tiers.iter().map(|t| t.window_secs).max().unwrap_or(0);
        let horizon = Duration::seconds(longest as i64);
        self.records.retain(|_, rec| now - rec.last_alert_at <= horizon);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
