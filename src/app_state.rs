// =============================================================================
// Engine State — Squeeze Radar
// =============================================================================
//
// The engine-owned state store. Every piece of mutable detection state lives
// here instead of in module-level globals, so one process can host several
// independent engines and every test builds its own.
//
// Thread safety:
//   - parking_lot::Mutex around each per-symbol state machine (one mutator
//     at a time; guards are never held across an await).
//   - parking_lot::RwLock for collections the status API only reads.
//   - Atomic counter for lock-free version tracking.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::error::ScanError;
use crate::performance::{PerformanceStats, PerformanceTracker, SignalOutcome};
use crate::phase_tracker::{PhaseTracker, TrackingEntry};
use crate::runtime_config::RuntimeConfig;
use crate::scanner::CycleReport;
use crate::signals::{CooldownGate, OIWindowTracker, SqueezeScorer};
use crate::store::SignalLog;
use crate::types::Signal;

// =============================================================================
// Error Record
// =============================================================================

/// A recorded skip or failure, exposed through the status API.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// `ScanError::kind()` of the failure.
    pub kind: String,
    pub at: DateTime<Utc>,
}

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

// =============================================================================
// EngineState
// =============================================================================

pub struct EngineState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Incremented on every meaningful mutation.
    pub state_version: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub config: RwLock<RuntimeConfig>,
    pub preset: String,

    // ── Decision core ───────────────────────────────────────────────────
    pub scorer: SqueezeScorer,
    pub oi_windows: Mutex<OIWindowTracker>,
    pub cooldowns: Mutex<CooldownGate>,
    pub tracker: Mutex<PhaseTracker>,

    // ── Signal log ──────────────────────────────────────────────────────
    pub signals: RwLock<Vec<Signal>>,
    pub performance: Mutex<PerformanceTracker>,

    // ── Operational status ──────────────────────────────────────────────
    pub last_cycle: RwLock<Option<CycleReport>>,
    pub last_stats_report: Mutex<Option<DateTime<Utc>>>,
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    // ── Timing ──────────────────────────────────────────────────────────
    pub start_time: std::time::Instant,
    pub started_at: DateTime<Utc>,
}

impl EngineState {
    pub fn new(config: RuntimeConfig, preset: impl Into<String>) -> Self {
        let scorer = SqueezeScorer::new(config.score_weights.clone(), config.score_tiers.clone());
        let oi_windows = OIWindowTracker::new(config.short_window, config.long_window);
        let cooldowns = CooldownGate::new(config.cooldown_tiers.clone());
        let tracker = PhaseTracker::new(config.phase.clone());
        let performance = PerformanceTracker::new(config.performance.clone());

        Self {
            state_version: AtomicU64::new(0),
            config: RwLock::new(config),
            preset: preset.into(),
            scorer,
            oi_windows: Mutex::new(oi_windows),
            cooldowns: Mutex::new(cooldowns),
            tracker: Mutex::new(tracker),
            signals: RwLock::new(Vec::new()),
            performance: Mutex::new(performance),
            last_cycle: RwLock::new(None),
            last_stats_report: Mutex::new(None),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
            started_at: Utc::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record a failure. Capped at [`MAX_RECENT_ERRORS`], oldest first out.
    pub fn push_error(&self, err: &ScanError) {
        let record = ErrorRecord {
            message: err.to_string(),
            kind: err.kind().to_string(),
            at: Utc::now(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
    }

    // ── Signal Log ──────────────────────────────────────────────────────

    pub fn push_signal(&self, signal: Signal) {
        self.performance.lock().open(&signal);
        self.signals.write().push(signal);
        self.increment_version();
    }

    /// Most recent `limit` signals, newest first.
    pub fn recent_signals(&self, limit: usize) -> Vec<Signal> {
        self.signals.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn signal_count(&self) -> usize {
        self.signals.read().len()
    }

    /// Serialisable copy of the signal log and its outcomes.
    pub fn signal_log(&self, now: DateTime<Utc>) -> SignalLog {
        SignalLog {
            signals: self.signals.read().clone(),
            outcomes: self.performance.lock().outcomes().to_vec(),
            last_update: Some(now),
        }
    }

    // ── Restore ─────────────────────────────────────────────────────────

    pub fn restore_oi_history(&self, history: HashMap<String, Vec<f64>>) -> usize {
        let mut windows = self.oi_windows.lock();
        windows.restore(history);
        windows.symbol_count()
    }

    pub fn restore_signal_log(&self, log: SignalLog) -> usize {
        let count = log.signals.len();
        self.performance.lock().restore(log.outcomes);
        *self.signals.write() = log.signals;
        self.increment_version();
        count
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    pub fn tracking_entries(&self) -> Vec<TrackingEntry> {
        self.tracker.lock().entries()
    }

    pub fn stats(&self) -> PerformanceStats {
        self.performance.lock().stats()
    }

    pub fn outcomes(&self) -> Vec<SignalOutcome> {
        self.performance.lock().outcomes().to_vec()
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: "ok",
            preset: self.preset.clone(),
            started_at: self.started_at,
            uptime_secs: self.start_time.elapsed().as_secs(),
            state_version: self.current_state_version(),
            tracked_symbols: self.tracker.lock().len(),
            cooldown_symbols: self.cooldowns.lock().len(),
            oi_symbols: self.oi_windows.lock().symbol_count(),
            signals: self.signal_count(),
            last_cycle: self.last_cycle.read().clone(),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub preset: String,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub state_version: u64,
    pub tracked_symbols: usize,
    /// Symbols still inside an alert cooldown window.
    pub cooldown_symbols: usize,
    pub oi_symbols: usize,
    pub signals: usize,
    pub last_cycle: Option<CycleReport>,
    pub recent_errors: Vec<ErrorRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_log_is_capped() {
        let state = EngineState::new(RuntimeConfig::default(), "standard");
        for i in 0..(MAX_RECENT_ERRORS + 5) {
            state.push_error(&ScanError::transient(format!("S{i}"), "timeout"));
        }
        let errors = state.recent_errors.read();
        assert_eq!(errors.len(), MAX_RECENT_ERRORS);
        assert!(errors[0].message.contains("S5"));
        assert_eq!(errors[0].kind, "transient_fetch");
    }

    #[test]
    fn restore_truncates_oi_history() {
        let mut config = RuntimeConfig::default();
        config.long_window = 4;
        config.short_window = 2;
        let state = EngineState::new(config, "standard");
        let mut history = HashMap::new();
        history.insert("AAAUSDT".to_string(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        history.insert("EMPTYUSDT".to_string(), vec![]);
        assert_eq!(state.restore_oi_history(history), 1);
        let windows = state.oi_windows.lock();
        let kept: Vec<f64> = windows.history("AAAUSDT").unwrap().iter().copied().collect();
        assert_eq!(kept, vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn recent_signals_newest_first() {
        let state = EngineState::new(RuntimeConfig::default(), "standard");
        assert!(state.recent_signals(10).is_empty());
        assert_eq!(state.health().signals, 0);
        assert_eq!(state.health().status, "ok");
        assert_eq!(state.health().cooldown_symbols, 0);
    }
}
