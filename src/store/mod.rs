// =============================================================================
// Persistence — Durable OI history, signal log and time-series export
// =============================================================================
//
// The engine treats every store failure as non-fatal: errors come back as
// `ScanError::Persistence` and the caller logs them and keeps going with its
// in-memory state.

pub mod json_store;

pub use json_store::JsonFileStore;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScanResult;
use crate::performance::SignalOutcome;
use crate::types::{Phase, Signal};

/// Signals plus their price follow-up, as one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalLog {
    #[serde(default)]
    pub signals: Vec<Signal>,
    #[serde(default)]
    pub outcomes: Vec<SignalOutcome>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

/// One exported evaluation row.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeseriesRow {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub funding_rate: f64,
    pub surge_ratio: f64,
    pub current_oi: f64,
    pub price: f64,
    pub score: u32,
    pub phase: Phase,
}

pub trait PersistenceStore: Send + Sync {
    /// Empty map when nothing was stored yet.
    fn load_oi_history(&self) -> ScanResult<HashMap<String, Vec<f64>>>;

    fn save_oi_history(&self, history: &HashMap<String, Vec<f64>>) -> ScanResult<()>;

    fn load_signal_log(&self) -> ScanResult<SignalLog>;

    fn save_signal_log(&self, log: &SignalLog) -> ScanResult<()>;

    fn append_timeseries(&self, rows: &[TimeseriesRow]) -> ScanResult<()>;
}

/// Process-local store; nothing survives a restart.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct InMemoryStore {
    oi_history: parking_lot::Mutex<HashMap<String, Vec<f64>>>,
    signal_log: parking_lot::Mutex<SignalLog>,
    timeseries: parking_lot::Mutex<Vec<TimeseriesRow>>,
}

#[cfg(test)]
impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeseries(&self) -> Vec<TimeseriesRow> {
        self.timeseries.lock().clone()
    }
}

#[cfg(test)]
impl PersistenceStore for InMemoryStore {
    fn load_oi_history(&self) -> ScanResult<HashMap<String, Vec<f64>>> {
        Ok(self.oi_history.lock().clone())
    }

    fn save_oi_history(&self, history: &HashMap<String, Vec<f64>>) -> ScanResult<()> {
        *self.oi_history.lock() = history.clone();
        Ok(())
    }

    fn load_signal_log(&self) -> ScanResult<SignalLog> {
        Ok(self.signal_log.lock().clone())
    }

    fn save_signal_log(&self, log: &SignalLog) -> ScanResult<()> {
        *self.signal_log.lock() = log.clone();
        Ok(())
    }

    fn append_timeseries(&self, rows: &[TimeseriesRow]) -> ScanResult<()> {
        self.timeseries.lock().extend_from_slice(rows);
        Ok(())
    }
}
