// =============================================================================
// Squeeze Phase Tracker — Per-symbol lifecycle state machine
// =============================================================================
//
//   INIT ──(alert accepted)──▶ PHASE_1_2 ──(crowd L/S turns down)──▶ PHASE_4
//                                  │                                   │
//                                  └──────(OI < 85% of recent peak)────┴──▶ PHASE_5 ──▶ removed
//
// Any phase is also dropped silently once the entry is older than the
// tracking timeout (24 h by default).  Phases only ever move forward.
//
// The tracker never fetches anything itself: the scan loop gathers
// `PhaseInputs` for each tracked symbol and feeds them in once per cycle.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::runtime_config::PhaseParams;
use crate::types::{Phase, Signal, Trend};

// =============================================================================
// Types
// =============================================================================

/// One symbol under phase tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub symbol: String,
    pub phase: Phase,
    pub start_time: DateTime<Utc>,
    pub last_check_time: DateTime<Utc>,
    pub check_count: u32,
    /// Alerts accepted for this symbol while tracked (including the first).
    pub alert_count: u32,
    pub originating_signal: Signal,
    /// Global long/short trend seen on the previous check.
    pub last_global_trend: Option<Trend>,
}

/// Per-cycle observations used to evaluate transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseInputs {
    pub global_trend: Option<Trend>,
    pub current_oi: Option<f64>,
    /// Maximum OI over the unwind lookback window.
    pub recent_oi_peak: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseTransition {
    pub symbol: String,
    pub from: Phase,
    pub to: Phase,
    pub at: DateTime<Utc>,
    pub reason: String,
    /// Entry state after the transition.
    pub entry: TrackingEntry,
    /// True when the transition ended tracking.
    pub removed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    /// INIT -> PHASE_1_2.
    Started(PhaseTransition),
    /// Already tracked; phase unchanged.
    Refreshed { phase: Phase, alert_count: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome {
    Transitioned(PhaseTransition),
    /// Timed out; no notification.
    Expired(TrackingEntry),
}

// =============================================================================
// PhaseTracker
// =============================================================================

pub struct PhaseTracker {
    params: PhaseParams,
    entries: HashMap<String, TrackingEntry>,
}

impl PhaseTracker {
    pub fn new(params: PhaseParams) -> Self {
        Self {
            params,
            entries: HashMap::new(),
        }
    }

    /// Start (or refresh) tracking for the symbol of an accepted signal.
    pub fn register(&mut self, signal: &Signal, now: DateTime<Utc>) -> Registration {
        if let Some(entry) = self.entries.get_mut(&signal.symbol) {
            entry.alert_count += 1;
            entry.last_check_time = now;
            debug!(
                symbol = %signal.symbol,
                phase = %entry.phase,
                alert_count = entry.alert_count,
                "tracking refreshed"
            );
            return Registration::Refreshed {
                phase: entry.phase,
                alert_count: entry.alert_count,
            };
        }

        let entry = TrackingEntry {
            symbol: signal.symbol.clone(),
            phase: Phase::Accumulation,
            start_time: now,
            last_check_time: now,
            check_count: 0,
            alert_count: 1,
            originating_signal: signal.clone(),
            last_global_trend: signal.enhanced.global_long_short.as_ref().map(|r| r.trend),
        };
        self.entries.insert(signal.symbol.clone(), entry.clone());

        info!(symbol = %signal.symbol, score = signal.score, "phase tracking started");

        Registration::Started(PhaseTransition {
            symbol: signal.symbol.clone(),
            from: Phase::Init,
            to: Phase::Accumulation,
            at: now,
            reason: "negative funding with open-interest surge".to_string(),
            entry,
            removed: false,
        })
    }

    /// Evaluate one tracked symbol. Returns `None` when it is not tracked or
    /// nothing changed.
    pub fn advance(
        &mut self,
        symbol: &str,
        inputs: PhaseInputs,
        now: DateTime<Utc>,
    ) -> Option<PhaseOutcome> {
        let timeout = Duration::seconds(self.params.tracking_timeout_secs as i64);
        let unwind_ratio = self.params.unwind_ratio;

        let entry = self.entries.get_mut(symbol)?;

        if now - entry.start_time >= timeout {
            let expired = self.entries.remove(symbol)?;
            info!(symbol, phase = %expired.phase, "phase tracking timed out");
            return Some(PhaseOutcome::Expired(expired));
        }

        entry.check_count += 1;
        entry.last_check_time = now;
        let from = entry.phase;

        // Unwind takes priority: it is reachable from both active phases.
        if matches!(from, Phase::Accumulation | Phase::Capitulation) {
            if let (Some(current), Some(peak)) = (inputs.current_oi, inputs.recent_oi_peak) {
                if peak > 0.0 && current < unwind_ratio * peak {
                    entry.phase = Phase::Unwind;
                    let reason = format!(
                        "OI {:.0} fell to {:.1}% of recent peak {:.0}",
                        current,
                        current / peak * 100.0,
                        peak
                    );
                    let entry = self.entries.remove(symbol)?;
                    info!(symbol, %from, to = %Phase::Unwind, "phase transition");
                    return Some(PhaseOutcome::Transitioned(PhaseTransition {
                        symbol: symbol.to_string(),
                        from,
                        to: Phase::Unwind,
                        at: now,
                        reason,
                        entry,
                        removed: true,
                    }));
                }
            }
        }

        let previous_trend = entry.last_global_trend;
        if inputs.global_trend.is_some() {
            entry.last_global_trend = inputs.global_trend;
        }

        if from == Phase::Accumulation
            && inputs.global_trend == Some(Trend::Declining)
            && previous_trend != Some(Trend::Declining)
        {
            entry.phase = Phase::Capitulation;
            info!(symbol, %from, to = %Phase::Capitulation, "phase transition");
            return Some(PhaseOutcome::Transitioned(PhaseTransition {
                symbol: symbol.to_string(),
                from,
                to: Phase::Capitulation,
                at: now,
                reason: "global long/short ratio turned down".to_string(),
                entry: entry.clone(),
                removed: false,
            }));
        }

        None
    }

    #[cfg(test)]
    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.entries.contains_key(symbol)
    }

    #[cfg(test)]
    pub fn get(&self, symbol: &str) -> Option<&TrackingEntry> {
        self.entries.get(symbol)
    }

    /// Tracked symbols in sorted order.
    pub fn tracked_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.entries.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn entries(&self) -> Vec<TrackingEntry> {
        let mut entries: Vec<TrackingEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new(PhaseParams::default())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoreIndicators, EnhancedIndicators, LongShortReading};
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 3, 12, 0, 0).unwrap()
    }

    fn signal(symbol: &str, trend: Option<Trend>) -> Signal {
        Signal {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            score: 70,
            core: CoreIndicators {
                funding_rate: -0.004,
                surge_ratio: 3.2,
                oi_change_pct: 40.0,
                current_oi: 1_000.0,
                price: 1.0,
                volume_24h: 20_000_000.0,
            },
            enhanced: EnhancedIndicators {
                global_long_short: trend.map(|trend| LongShortReading {
                    ratio: 0.6,
                    long_pct: 37.5,
                    short_pct: 62.5,
                    trend,
                    samples: vec![0.5, 0.6],
                }),
                ..EnhancedIndicators::default()
            },
            score_breakdown: BTreeMap::new(),
            timestamp: t0(),
        }
    }

    fn trend(t: Trend) -> PhaseInputs {
        PhaseInputs {
            global_trend: Some(t),
            current_oi: Some(1_000.0),
            recent_oi_peak: Some(1_000.0),
        }
    }

    fn oi(current: f64, peak: f64) -> PhaseInputs {
        PhaseInputs {
            global_trend: None,
            current_oi: Some(current),
            recent_oi_peak: Some(peak),
        }
    }

    #[test]
    fn register_starts_in_accumulation() {
        let mut pt = PhaseTracker::default();
        match pt.register(&signal("XUSDT", None), t0()) {
            Registration::Started(tr) => {
                assert_eq!(tr.from, Phase::Init);
                assert_eq!(tr.to, Phase::Accumulation);
                assert!(!tr.removed);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(pt.get("XUSDT").unwrap().phase, Phase::Accumulation);
    }

    #[test]
    fn register_twice_refreshes_without_reset() {
        let mut pt = PhaseTracker::default();
        pt.register(&signal("XUSDT", None), t0());
        let later = t0() + Duration::hours(3);
        let r = pt.register(&signal("XUSDT", None), later);
        assert_eq!(
            r,
            Registration::Refreshed {
                phase: Phase::Accumulation,
                alert_count: 2
            }
        );
        let e = pt.get("XUSDT").unwrap();
        assert_eq!(e.start_time, t0());
        assert_eq!(e.last_check_time, later);
    }

    #[test]
    fn trend_flip_moves_to_capitulation_once() {
        let mut pt = PhaseTracker::default();
        pt.register(&signal("XUSDT", Some(Trend::Rising)), t0());

        let out = pt.advance("XUSDT", trend(Trend::Declining), t0() + Duration::minutes(10));
        match out {
            Some(PhaseOutcome::Transitioned(tr)) => {
                assert_eq!(tr.from, Phase::Accumulation);
                assert_eq!(tr.to, Phase::Capitulation);
            }
            other => panic!("unexpected {other:?}"),
        }
        // Still declining: no second notification.
        assert!(pt
            .advance("XUSDT", trend(Trend::Declining), t0() + Duration::minutes(20))
            .is_none());
        assert_eq!(pt.get("XUSDT").unwrap().phase, Phase::Capitulation);
    }

    #[test]
    fn declining_at_registration_needs_a_fresh_flip() {
        let mut pt = PhaseTracker::default();
        pt.register(&signal("XUSDT", Some(Trend::Declining)), t0());
        assert!(pt
            .advance("XUSDT", trend(Trend::Declining), t0() + Duration::minutes(10))
            .is_none());
        assert!(pt
            .advance("XUSDT", trend(Trend::Rising), t0() + Duration::minutes(20))
            .is_none());
        assert!(matches!(
            pt.advance("XUSDT", trend(Trend::Declining), t0() + Duration::minutes(30)),
            Some(PhaseOutcome::Transitioned(_))
        ));
    }

    #[test]
    fn missing_trend_does_not_erase_last_seen() {
        let mut pt = PhaseTracker::default();
        pt.register(&signal("XUSDT", Some(Trend::Rising)), t0());
        assert!(pt
            .advance("XUSDT", PhaseInputs::default(), t0() + Duration::minutes(10))
            .is_none());
        assert_eq!(pt.get("XUSDT").unwrap().last_global_trend, Some(Trend::Rising));
    }

    #[test]
    fn oi_unwind_from_accumulation_removes() {
        let mut pt = PhaseTracker::default();
        pt.register(&signal("XUSDT", None), t0());
        match pt.advance("XUSDT", oi(840.0, 1_000.0), t0() + Duration::minutes(10)) {
            Some(PhaseOutcome::Transitioned(tr)) => {
                assert_eq!(tr.to, Phase::Unwind);
                assert_eq!(tr.entry.phase, Phase::Unwind);
                assert!(tr.removed);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!pt.is_tracked("XUSDT"));
    }

    #[test]
    fn oi_exactly_at_threshold_does_not_unwind() {
        let mut pt = PhaseTracker::default();
        pt.register(&signal("XUSDT", None), t0());
        assert!(pt
            .advance("XUSDT", oi(850.0, 1_000.0), t0() + Duration::minutes(10))
            .is_none());
        assert!(pt.is_tracked("XUSDT"));
    }

    #[test]
    fn full_lifecycle_in_order() {
        let mut pt = PhaseTracker::default();
        pt.register(&signal("XUSDT", Some(Trend::Rising)), t0());
        let mut phases = vec![pt.get("XUSDT").unwrap().phase];
        if let Some(PhaseOutcome::Transitioned(tr)) =
            pt.advance("XUSDT", trend(Trend::Declining), t0() + Duration::minutes(10))
        {
            phases.push(tr.to);
        }
        if let Some(PhaseOutcome::Transitioned(tr)) =
            pt.advance("XUSDT", oi(500.0, 1_000.0), t0() + Duration::minutes(20))
        {
            phases.push(tr.to);
        }
        assert_eq!(
            phases,
            vec![Phase::Accumulation, Phase::Capitulation, Phase::Unwind]
        );
        assert_eq!(pt.len(), 0);
    }

    #[test]
    fn unwind_wins_over_capitulation_in_same_cycle() {
        let mut pt = PhaseTracker::default();
        pt.register(&signal("XUSDT", Some(Trend::Rising)), t0());
        let inputs = PhaseInputs {
            global_trend: Some(Trend::Declining),
            current_oi: Some(100.0),
            recent_oi_peak: Some(1_000.0),
        };
        match pt.advance("XUSDT", inputs, t0() + Duration::minutes(10)) {
            Some(PhaseOutcome::Transitioned(tr)) => assert_eq!(tr.to, Phase::Unwind),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn timeout_expires_silently_before_other_rules() {
        let mut pt = PhaseTracker::default();
        pt.register(&signal("XUSDT", Some(Trend::Rising)), t0());
        let out = pt.advance("XUSDT", oi(10.0, 1_000.0), t0() + Duration::hours(24));
        assert!(matches!(out, Some(PhaseOutcome::Expired(_))));
        assert!(!pt.is_tracked("XUSDT"));
    }

    #[test]
    fn just_before_timeout_is_still_tracked() {
        let mut pt = PhaseTracker::default();
        pt.register(&signal("XUSDT", None), t0());
        let out = pt.advance(
            "XUSDT",
            PhaseInputs::default(),
            t0() + Duration::hours(24) - Duration::seconds(1),
        );
        assert!(out.is_none());
        assert_eq!(pt.get("XUSDT").unwrap().check_count, 1);
    }

    #[test]
    fn untracked_symbol_is_ignored() {
        let mut pt = PhaseTracker::default();
        assert!(pt.advance("NOPE", oi(1.0, 100.0), t0()).is_none());
    }
}
