// =============================================================================
// Open Interest Window Tracker — Short/long moving-average surge detection
// =============================================================================
//
// Keeps a bounded FIFO of open-interest samples per symbol and derives:
//
//   change_pct  = (current - previous) / previous * 100
//   surge_ratio = mean(last SHORT samples) / mean(all LONG samples)
//
// The ratio is scale-invariant, so a single threshold works across symbols
// whose absolute OI differs by orders of magnitude.  Until the window is full
// the ratio is pinned to a neutral 1.0.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Neutral surge ratio reported during cold start.
pub const NEUTRAL_RATIO: f64 = 1.0;

/// Result of observing one OI sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OIObservation {
    pub surge_ratio: f64,
    pub change_pct: f64,
    /// Number of samples held after this observation.
    pub samples: usize,
}

pub struct OIWindowTracker {
    short_window: usize,
    long_window: usize,
    histories: HashMap<String, VecDeque<f64>>,
}

impl OIWindowTracker {
    pub fn new(short_window: usize, long_window: usize) -> Self {
        Self {
            short_window: short_window.max(1),
            long_window: long_window.max(1),
            histories: HashMap::new(),
        }
    }

    /// Record `current_oi` for `symbol` and return the surge statistics.
    pub fn observe(&mut self, symbol: &str, current_oi: f64) -> OIObservation {
        let long_window = self.long_window;
        let history = self
            .histories
            .entry(symbol.to_string())
            .or_insert_with(|| VecDeque::with_capacity(long_window));

        let change_pct = match history.back() {
            Some(&previous) if previous != 0.0 => (current_oi - previous) / previous * 100.0,
            _ => 0.0,
        };

        if history.len() == long_window {
            history.pop_front();
        }
        history.push_back(current_oi);

        let surge_ratio = Self::surge_ratio(history, self.short_window, long_window);

        debug!(
            symbol,
            current_oi,
            samples = history.len(),
            surge_ratio = format!("{:.3}", surge_ratio),
            change_pct = format!("{:.2}", change_pct),
            "OI observed"
        );

        OIObservation {
            surge_ratio,
            change_pct,
            samples: history.len(),
        }
    }

    fn surge_ratio(history: &VecDeque<f64>, short_window: usize, long_window: usize) -> f64 {
        if history.len() < long_window {
            return NEUTRAL_RATIO;
        }

        let long_avg = history.iter().sum::<f64>() / history.len() as f64;
        let short_avg =
            history.iter().rev().take(short_window).sum::<f64>() / short_window as f64;

        if long_avg > 0.0 {
            short_avg / long_avg
        } else {
            NEUTRAL_RATIO
        }
    }

    /// Stored samples for `symbol`, oldest first.
    #[cfg(test)]
    pub fn history(&self, symbol: &str) -> Option<&VecDeque<f64>> {
        self.histories.get(symbol)
    }

    /// Most recent stored sample.
    #[cfg(test)]
    pub fn latest(&self, symbol: &str) -> Option<f64> {
        self.histories.get(symbol).and_then(|h| h.back().copied())
    }

    /// Maximum over the last `lookback` samples.
    pub fn recent_peak(&self, symbol: &str, lookback: usize) -> Option<f64> {
        self.histories
            .get(symbol)?
            .iter()
            .rev()
            .take(lookback)
            .copied()
            .reduce(f64::max)
    }

    pub fn symbol_count(&self) -> usize {
        self.histories.len()
    }

    /// Copy of every history, for persistence.
    pub fn snapshot(&self) -> HashMap<String, Vec<f64>> {
        self.histories
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().copied().collect()))
            .collect()
    }

    /// Replace state with persisted histories, keeping only the newest
    /// `long_window` samples of each.
    pub fn restore(&mut self, snapshot: HashMap<String, Vec<f64>>) {
        self.histories = snapshot
            .into_iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(symbol, samples)| {
                let skip = samples.len().saturating_sub(self.long_window);
                (symbol, samples.into_iter().skip(skip).collect())
            })
            .collect();
    }
}

impl Default for OIWindowTracker {
    fn default() -> Self {
        Self::new(3, 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(tracker: &mut OIWindowTracker, symbol: &str, samples: &[f64]) -> OIObservation {
        let mut last = None;
        for &s in samples {
            last = Some(tracker.observe(symbol, s));
        }
        last.unwrap()
    }

    #[test]
    fn cold_start_is_neutral() {
        let mut t = OIWindowTracker::new(3, 10);
        for i in 1..10 {
            let obs = t.observe("ABCUSDT", (i * 1000) as f64);
            assert_eq!(obs.surge_ratio, NEUTRAL_RATIO);
            assert_eq!(obs.samples, i);
        }
    }

    #[test]
    fn single_spike_example() {
        let mut t = OIWindowTracker::new(3, 10);
        let obs = feed(
            &mut t,
            "ABCUSDT",
            &[100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 300.0],
        );
        // short = 500/3, long = 1200/10
        assert!((obs.surge_ratio - (500.0 / 3.0) / 120.0).abs() < 1e-9);
        assert!(obs.surge_ratio < 2.0);
        assert!((obs.change_pct - 200.0).abs() < 1e-9);
    }

    #[test]
    fn ratio_is_scale_invariant() {
        let base = [10.0, 12.0, 9.0, 11.0, 10.0, 13.0, 15.0, 30.0, 45.0, 60.0];
        let mut a = OIWindowTracker::new(3, 10);
        let mut b = OIWindowTracker::new(3, 10);
        let ra = feed(&mut a, "X", &base).surge_ratio;
        let scaled: Vec<f64> = base.iter().map(|v| v * 7_500.0).collect();
        let rb = feed(&mut b, "X", &scaled).surge_ratio;
        assert!((ra - rb).abs() < 1e-12);
    }

    #[test]
    fn history_is_bounded_fifo() {
        let mut t = OIWindowTracker::new(2, 4);
        feed(&mut t, "X", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let h: Vec<f64> = t.history("X").unwrap().iter().copied().collect();
        assert_eq!(h, vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn change_pct_zero_without_previous_or_zero_previous() {
        let mut t = OIWindowTracker::new(3, 10);
        assert_eq!(t.observe("X", 0.0).change_pct, 0.0);
        assert_eq!(t.observe("X", 50.0).change_pct, 0.0);
        assert!((t.observe("X", 75.0).change_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn zero_long_average_is_neutral() {
        let mut t = OIWindowTracker::new(2, 3);
        let obs = feed(&mut t, "X", &[0.0, 0.0, 0.0]);
        assert_eq!(obs.surge_ratio, NEUTRAL_RATIO);
    }

    #[test]
    fn symbols_are_independent() {
        let mut t = OIWindowTracker::new(2, 3);
        feed(&mut t, "A", &[1.0, 1.0, 10.0]);
        let obs = t.observe("B", 5.0);
        assert_eq!(obs.samples, 1);
        assert_eq!(t.symbol_count(), 2);
    }

    #[test]
    fn recent_peak_respects_lookback() {
        let mut t = OIWindowTracker::new(3, 10);
        feed(&mut t, "X", &[900.0, 100.0, 200.0, 150.0, 120.0, 110.0, 130.0]);
        assert_eq!(t.recent_peak("X", 5), Some(200.0));
        assert_eq!(t.recent_peak("X", 10), Some(900.0));
        assert_eq!(t.recent_peak("Y", 5), None);
    }

    #[test]
    fn restore_truncates_to_newest_samples() {
        let mut t = OIWindowTracker::new(2, 3);
        let mut snap = HashMap::new();
        snap.insert("X".to_string(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        snap.insert("EMPTY".to_string(), vec![]);
        t.restore(snap);
        let h: Vec<f64> = t.history("X").unwrap().iter().copied().collect();
        assert_eq!(h, vec![3.0, 4.0, 5.0]);
        assert!(t.history("EMPTY").is_none());
        assert_eq!(t.snapshot()["X"], vec![3.0, 4.0, 5.0]);
    }
}
