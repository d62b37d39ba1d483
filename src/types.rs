// =============================================================================
// Shared types used across the squeeze detection engine
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a ratio series between the first and last sample of a
/// lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Trend {
    Declining,
    Flat,
    Rising,
}

impl Trend {
    /// Compare the earliest and latest sample only. Returns `None` when fewer
    /// than two samples are available.
    pub fn from_endpoints(samples: &[f64]) -> Option<Self> {
        if samples.len() < 2 {
            return None;
        }
        let first = samples[0];
        let last = samples[samples.len() - 1];
        Some(if last > first {
            Self::Rising
        } else if last < first {
            Self::Declining
        } else {
            Self::Flat
        })
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rising => write!(f, "rising"),
            Self::Flat => write!(f, "flat"),
            Self::Declining => write!(f, "declining"),
        }
    }
}

/// Which population a long/short ratio describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LongShortKind {
    Global,
    TopTrader,
}

impl std::fmt::Display for LongShortKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::TopTrader => write!(f, "top_trader"),
        }
    }
}

/// One funding-rate row from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingEntry {
    pub symbol: String,
    /// Decimal rate (e.g. -0.001 = -0.1%).
    pub funding_rate: f64,
    pub mark_price: f64,
    /// Timestamp (ms) of the next funding event.
    pub next_funding_time: i64,
}

/// 24h ticker statistics for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub price: f64,
    pub quote_volume: f64,
    pub high: f64,
    pub low: f64,
    pub change_pct: f64,
}

/// Long/short account ratio reading over a lookback window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongShortReading {
    /// Latest long/short ratio.
    pub ratio: f64,
    /// Latest share of long accounts (0-100).
    pub long_pct: f64,
    /// Latest share of short accounts (0-100).
    pub short_pct: f64,
    pub trend: Trend,
    /// Ratio samples, oldest first.
    pub samples: Vec<f64>,
}

/// Transient per-symbol bundle gathered during one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub symbol: String,
    pub funding_rate: f64,
    pub open_interest: f64,
    pub price: f64,
    pub volume_24h: f64,
    #[serde(default)]
    pub taker_ratio: Option<f64>,
    #[serde(default)]
    pub global_long_short: Option<LongShortReading>,
    #[serde(default)]
    pub top_trader_long_short: Option<LongShortReading>,
}

/// Squeeze lifecycle phase of a tracked symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Not tracked.
    #[serde(rename = "INIT")]
    Init,
    /// Negative funding plus OI buildup: shorts crowded, positions accumulating.
    #[serde(rename = "PHASE_1_2")]
    Accumulation,
    /// Crowd long/short ratio turning down: retail shorts capitulating.
    #[serde(rename = "PHASE_4")]
    Capitulation,
    /// OI unwinding from its recent peak: squeeze presumed resolved.
    #[serde(rename = "PHASE_5")]
    Unwind,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Accumulation => "PHASE_1_2",
            Self::Capitulation => "PHASE_4",
            Self::Unwind => "PHASE_5",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The two indicators that gate a detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreIndicators {
    pub funding_rate: f64,
    pub surge_ratio: f64,
    pub oi_change_pct: f64,
    pub current_oi: f64,
    pub price: f64,
    pub volume_24h: f64,
}

/// Optional enrichment indicators; any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnhancedIndicators {
    #[serde(default)]
    pub taker_ratio: Option<f64>,
    #[serde(default)]
    pub global_long_short: Option<LongShortReading>,
    #[serde(default)]
    pub top_trader_long_short: Option<LongShortReading>,
}

/// An accepted detection event. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub score: u32,
    pub core: CoreIndicators,
    pub enhanced: EnhancedIndicators,
    /// factor name => human-readable contribution.
    pub score_breakdown: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}
