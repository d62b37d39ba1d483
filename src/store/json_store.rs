// =============================================================================
// JSON File Store — Files under the configured data directory
// =============================================================================
//
//   oi_history.json       symbol -> samples (oldest first)
//   squeeze_signals.json  { signals, outcomes, last_update }
//   timeseries.csv        one row per accepted evaluation, header once
//
// JSON files are rewritten atomically (tmp + rename) so a crash mid-write
// leaves the previous version intact.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{PersistenceStore, SignalLog, TimeseriesRow};
use crate::error::{ScanError, ScanResult};

const OI_HISTORY_FILE: &str = "oi_history.json";
const SIGNAL_LOG_FILE: &str = "squeeze_signals.json";
const TIMESERIES_FILE: &str = "timeseries.csv";

const TIMESERIES_HEADER: [&str; 8] = [
    "timestamp",
    "symbol",
    "funding_rate",
    "surge_ratio",
    "current_oi",
    "price",
    "score",
    "phase",
];

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Creates `dir` if it does not exist.
    pub fn open(dir: impl AsRef<Path>) -> ScanResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| ScanError::persistence(dir.display().to_string(), e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn read_json<T: DeserializeOwned + Default>(&self, file: &str) -> ScanResult<T> {
        let path = self.path(file);
        if !path.exists() {
            return Ok(T::default());
        }
        let contents = fs::read_to_string(&path)
            .map_err(|e| ScanError::persistence(path.display().to_string(), e))?;
        serde_json::from_str(&contents)
            .map_err(|e| ScanError::persistence(path.display().to_string(), e))
    }

    fn write_json<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> ScanResult<()> {
        let path = self.path(file);
        let context = path.display().to_string();
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| ScanError::persistence(&context, e))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| ScanError::persistence(&context, e))?;
        fs::rename(&tmp, &path).map_err(|e| ScanError::persistence(&context, e))?;
        debug!(path = %context, "state file written");
        Ok(())
    }
}

impl PersistenceStore for JsonFileStore {
    fn load_oi_history(&self) -> ScanResult<HashMap<String, Vec<f64>>> {
        self.read_json(OI_HISTORY_FILE)
    }

    fn save_oi_history(&self, history: &HashMap<String, Vec<f64>>) -> ScanResult<()> {
        self.write_json(OI_HISTORY_FILE, history)
    }

    fn load_signal_log(&self) -> ScanResult<SignalLog> {
        self.read_json(SIGNAL_LOG_FILE)
    }

    fn save_signal_log(&self, log: &SignalLog) -> ScanResult<()> {
        self.write_json(SIGNAL_LOG_FILE, log)
    }

    fn append_timeseries(&self, rows: &[TimeseriesRow]) -> ScanResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let path = self.path(TIMESERIES_FILE);
        let context = path.display().to_string();
        let write_header = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ScanError::persistence(&context, e))?;
        let mut writer = csv::Writer::from_writer(file);

        if write_header {
            writer
                .write_record(TIMESERIES_HEADER)
                .map_err(|e| ScanError::persistence(&context, e))?;
        }
        for row in rows {
            writer
                .write_record([
                    row.timestamp.to_rfc3339(),
                    row.symbol.clone(),
                    row.funding_rate.to_string(),
                    row.surge_ratio.to_string(),
                    row.current_oi.to_string(),
                    row.price.to_string(),
                    row.score.to_string(),
                    row.phase.label().to_string(),
                ])
                .map_err(|e| ScanError::persistence(&context, e))?;
        }
        writer
            .flush()
            .map_err(|e| ScanError::persistence(&context, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Phase;
    use chrono::{TimeZone, Utc};

    fn row(symbol: &str) -> TimeseriesRow {
        TimeseriesRow {
            timestamp: Utc.with_ymd_and_hms(2026, 1, 3, 12, 0, 0).unwrap(),
            symbol: symbol.to_string(),
            funding_rate: -0.002,
            surge_ratio: 2.5,
            current_oi: 1000.0,
            price: 0.5,
            score: 55,
            phase: Phase::Accumulation,
        }
    }

    #[test]
    fn missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert!(store.load_oi_history().unwrap().is_empty());
        assert_eq!(store.load_signal_log().unwrap(), SignalLog::default());
    }

    #[test]
    fn oi_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = HashMap::new();
        history.insert("AAAUSDT".to_string(), vec![1.0, 2.0, 3.0]);
        JsonFileStore::open(dir.path())
            .unwrap()
            .save_oi_history(&history)
            .unwrap();

        let reopened = JsonFileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load_oi_history().unwrap(), history);
        assert!(!dir.path().join("oi_history.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SIGNAL_LOG_FILE), "{not json").unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let err = store.load_signal_log().unwrap_err();
        assert_eq!(err.kind(), "persistence");
    }

    #[test]
    fn timeseries_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        store.append_timeseries(&[row("AAAUSDT")]).unwrap();
        store
            .append_timeseries(&[row("BBBUSDT"), row("CCCUSDT")])
            .unwrap();

        let contents = fs::read_to_string(dir.path().join(TIMESERIES_FILE)).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], TIMESERIES_HEADER.join(","));
        assert!(lines[2].contains("BBBUSDT"));
        assert!(lines[3].ends_with(",55,PHASE_1_2"));
    }

    #[test]
    fn open_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = JsonFileStore::open(&nested).unwrap();
        assert!(store.dir().is_dir());
    }
}
