// =============================================================================
// Runtime Configuration — Detection thresholds, scoring tables, presets
// =============================================================================
//
// Every tunable parameter of the squeeze engine lives here.  The different
// threshold "variants" of the monitor are expressed as presets over the same
// structure rather than separate code paths.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::signals::{ScoreFactors, SqueezeScorer};

/// Offset past each gate threshold used to probe the weakest core pass.
const CORE_PASS_EPSILON: f64 = 1e-6;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_funding_threshold() -> f64 {
    -0.001
}

fn default_oi_surge_ratio() -> f64 {
    2.0
}

fn default_short_window() -> usize {
    3
}

fn default_long_window() -> usize {
    10
}

fn default_scan_interval_secs() -> u64 {
    600
}

fn default_min_volume_usd() -> f64 {
    10_000_000.0
}

fn default_min_price() -> f64 {
    0.001
}

fn default_max_symbols_per_cycle() -> usize {
    9999
}

fn default_request_pacing_ms() -> u64 {
    150
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_stats_report_interval_secs() -> u64 {
    6 * 3600
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_cooldown_tiers() -> Vec<CooldownTier> {
    vec![
        CooldownTier {
            name: "strong".to_string(),
            min_score: 70,
            window_secs: 2 * 3600,
        },
        CooldownTier {
            name: "medium".to_string(),
            min_score: 35,
            window_secs: 4 * 3600,
        },
    ]
}

// =============================================================================
// Scoring
// =============================================================================

/// Maximum points each factor may contribute to the composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub funding: u32,
    pub oi_surge: u32,
    pub crowd_short: u32,
    pub top_trader: u32,
    pub taker: u32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            funding: 40,
            oi_surge: 30,
            crowd_short: 15,
            top_trader: 10,
            taker: 5,
        }
    }
}

/// One rung of a tier table: reaching `threshold` earns `fraction` of the
/// factor's maximum points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierStep {
    pub threshold: f64,
    pub fraction: f64,
}

const fn step(threshold: f64, fraction: f64) -> TierStep {
    TierStep {
        threshold,
        fraction,
    }
}

/// Tier tables for every factor.
///
/// Funding steps match when the rate is at or *below* the threshold; every
/// other table matches at or above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreTiers {
    pub funding: Vec<TierStep>,
    pub oi_surge: Vec<TierStep>,
    /// Thresholds are short-account percentages (0-100).
    pub crowd_short: Vec<TierStep>,
    pub taker: Vec<TierStep>,
    /// Fraction granted when the top-trader ratio is rising.
    pub top_trader_rising: f64,
    /// Fraction granted when a top-trader reading exists but is not rising.
    pub top_trader_present: f64,
}

impl Default for ScoreTiers {
    fn default() -> Self {
        Self {
            funding: vec![
                step(-0.0005, 0.25),
                step(-0.001, 0.5),
                step(-0.002, 0.75),
                step(-0.003, 1.0),
            ],
            oi_surge: vec![
                step(1.5, 0.25),
                step(2.0, 0.5),
                step(2.5, 0.75),
                step(3.0, 1.0),
            ],
            crowd_short: vec![step(55.0, 0.33), step(60.0, 0.66), step(65.0, 1.0)],
            taker: vec![step(1.0, 0.2), step(1.2, 0.6), step(1.5, 1.0)],
            top_trader_rising: 1.0,
            top_trader_present: 0.5,
        }
    }
}

// =============================================================================
// Cooldown
// =============================================================================

/// A score tier and its alert-suppression window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownTier {
    pub name: String,
    /// Lowest score that belongs to this tier.
    pub min_score: u32,
    /// Repeat alerts inside this many seconds are suppressed.
    pub window_secs: u64,
}

// =============================================================================
// Enrichment / phase / performance parameters
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentParams {
    /// Sampling period of the global long/short account ratio.
    pub global_ls_period: String,
    /// Sampling period of the top-trader long/short ratio.
    pub top_ls_period: String,
    /// Sampling period of the taker buy/sell ratio.
    pub taker_period: String,
    /// Number of ratio samples used for trend detection.
    pub trend_window: usize,
}

impl Default for EnrichmentParams {
    fn default() -> Self {
        Self {
            global_ls_period: "1h".to_string(),
            top_ls_period: "15m".to_string(),
            taker_period: "1h".to_string(),
            trend_window: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseParams {
    /// Current OI below `unwind_ratio * recent peak` signals the unwind phase.
    pub unwind_ratio: f64,
    /// Number of most recent OI samples the peak is taken over.
    pub unwind_lookback: usize,
    /// Tracking entries older than this are dropped silently.
    pub tracking_timeout_secs: u64,
}

impl Default for PhaseParams {
    fn default() -> Self {
        Self {
            unwind_ratio: 0.85,
            unwind_lookback: 5,
            tracking_timeout_secs: 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceParams {
    pub take_profit_1_pct: f64,
    pub take_profit_2_pct: f64,
    pub stop_loss_pct: f64,
}

impl Default for PerformanceParams {
    fn default() -> Self {
        Self {
            take_profit_1_pct: 5.0,
            take_profit_2_pct: 10.0,
            stop_loss_pct: 3.0,
        }
    }
}

// =============================================================================
// Presets
// =============================================================================

/// Named threshold sets. Each one is a complete configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preset {
    Standard,
    Aggressive,
    Conservative,
}

impl std::str::FromStr for Preset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "aggressive" => Ok(Self::Aggressive),
            "conservative" => Ok(Self::Conservative),
            other => anyhow::bail!("unknown preset '{other}'"),
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Aggressive => write!(f, "aggressive"),
            Self::Conservative => write!(f, "conservative"),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the squeeze engine.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Core gate ----------------------------------------------------------

    /// Funding rate below which a symbol becomes a candidate.
    #[serde(default = "default_funding_threshold")]
    pub funding_threshold: f64,

    /// Short/long OI moving-average ratio that counts as a surge.
    #[serde(default = "default_oi_surge_ratio")]
    pub oi_surge_ratio: f64,

    /// Number of most recent OI samples in the short average.
    #[serde(default = "default_short_window")]
    pub short_window: usize,

    /// OI history capacity and long-average span.
    #[serde(default = "default_long_window")]
    pub long_window: usize,

    // --- Scan loop ----------------------------------------------------------

    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    /// 24h quote volume below this is ignored.
    #[serde(default = "default_min_volume_usd")]
    pub min_volume_usd: f64,

    /// Last price below this is ignored.
    #[serde(default = "default_min_price")]
    pub min_price: f64,

    #[serde(default = "default_max_symbols_per_cycle")]
    pub max_symbols_per_cycle: usize,

    /// Delay between per-symbol request batches.
    #[serde(default = "default_request_pacing_ms")]
    pub request_pacing_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // --- Scoring & alerting -------------------------------------------------

    #[serde(default)]
    pub score_weights: ScoreWeights,

    #[serde(default)]
    pub score_tiers: ScoreTiers,

    /// Strongest tier first is not required; tiers are sorted on use.
    #[serde(default = "default_cooldown_tiers")]
    pub cooldown_tiers: Vec<CooldownTier>,

    #[serde(default)]
    pub enrichment: EnrichmentParams,

    #[serde(default)]
    pub phase: PhaseParams,

    #[serde(default)]
    pub performance: PerformanceParams,

    #[serde(default = "default_stats_report_interval_secs")]
    pub stats_report_interval_secs: u64,

    // --- Storage / surfaces -------------------------------------------------

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Bind address of the read-only status API. Disabled when absent.
    #[serde(default)]
    pub api_bind_addr: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            funding_threshold: default_funding_threshold(),
            oi_surge_ratio: default_oi_surge_ratio(),
            short_window: default_short_window(),
            long_window: default_long_window(),
            scan_interval_secs: default_scan_interval_secs(),
            min_volume_usd: default_min_volume_usd(),
            min_price: default_min_price(),
            max_symbols_per_cycle: default_max_symbols_per_cycle(),
            request_pacing_ms: default_request_pacing_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            score_weights: ScoreWeights::default(),
            score_tiers: ScoreTiers::default(),
            cooldown_tiers: default_cooldown_tiers(),
            enrichment: EnrichmentParams::default(),
            phase: PhaseParams::default(),
            performance: PerformanceParams::default(),
            stats_report_interval_secs: default_stats_report_interval_secs(),
            data_dir: default_data_dir(),
            api_bind_addr: None,
        }
    }
}

impl RuntimeConfig {
    /// Build the configuration for a named preset.
    pub fn preset(preset: Preset) -> Self {
        let base = Self::default();
        match preset {
            Preset::Standard => base,
            Preset::Aggressive => Self {
                funding_threshold: -0.0005,
                oi_surge_ratio: 1.5,
                scan_interval_secs: 300,
                min_volume_usd: 5_000_000.0,
                max_symbols_per_cycle: 30,
                score_tiers: ScoreTiers {
                    funding: vec![
                        step(-0.0003, 0.25),
                        step(-0.0005, 0.5),
                        step(-0.001, 0.75),
                        step(-0.002, 1.0),
                    ],
                    oi_surge: vec![
                        step(1.2, 0.25),
                        step(1.5, 0.5),
                        step(2.0, 0.75),
                        step(2.5, 1.0),
                    ],
                    ..ScoreTiers::default()
                },
                cooldown_tiers: vec![
                    CooldownTier {
                        name: "strong".to_string(),
                        min_score: 60,
                        window_secs: 3600,
                    },
                    CooldownTier {
                        name: "medium".to_string(),
                        min_score: 25,
                        window_secs: 2 * 3600,
                    },
                ],
                ..base
            },
            Preset::Conservative => Self {
                funding_threshold: -0.002,
                oi_surge_ratio: 2.5,
                min_volume_usd: 20_000_000.0,
                score_tiers: ScoreTiers {
                    funding: vec![
                        step(-0.001, 0.25),
                        step(-0.002, 0.5),
                        step(-0.003, 0.75),
                        step(-0.005, 1.0),
                    ],
                    oi_surge: vec![
                        step(2.0, 0.25),
                        step(2.5, 0.5),
                        step(3.0, 0.75),
                        step(4.0, 1.0),
                    ],
                    ..ScoreTiers::default()
                },
                cooldown_tiers: vec![
                    CooldownTier {
                        name: "strong".to_string(),
                        min_score: 70,
                        window_secs: 4 * 3600,
                    },
                    CooldownTier {
                        name: "medium".to_string(),
                        min_score: 35,
                        window_secs: 8 * 3600,
                    },
                ],
                ..base
            },
        }
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.short_window >= 1, "short_window must be at least 1");
        ensure!(
            self.short_window <= self.long_window,
            "short_window ({}) must not exceed long_window ({})",
            self.short_window,
            self.long_window
        );
        ensure!(
            self.funding_threshold.is_finite() && self.oi_surge_ratio.is_finite(),
            "gate thresholds must be finite"
        );
        ensure!(self.scan_interval_secs > 0, "scan_interval_secs must be positive");
        ensure!(
            self.phase.unwind_ratio > 0.0 && self.phase.unwind_ratio <= 1.0,
            "phase.unwind_ratio must lie in (0, 1]"
        );
        ensure!(self.phase.unwind_lookback >= 1, "phase.unwind_lookback must be at least 1");
        ensure!(
            self.enrichment.trend_window >= 2,
            "enrichment.trend_window must be at least 2"
        );
        ensure!(!self.cooldown_tiers.is_empty(), "at least one cooldown tier is required");

        let tables = [
            ("funding", &self.score_tiers.funding),
            ("oi_surge", &self.score_tiers.oi_surge),
            ("crowd_short", &self.score_tiers.crowd_short),
            ("taker", &self.score_tiers.taker),
        ];
        for (name, steps) in tables {
            for s in steps {
                ensure!(
                    s.threshold.is_finite() && (0.0..=1.0).contains(&s.fraction),
                    "score_tiers.{name} has an invalid step {s:?}"
                );
            }
        }

        let floor = self.min_core_pass_score();
        let lowest_tier = self
            .cooldown_tiers
            .iter()
            .map(|t| t.min_score)
            .min()
            .unwrap_or(0);
        ensure!(
            floor >= lowest_tier,
            "a bare core pass scores {floor}, below the lowest cooldown tier ({lowest_tier})"
        );
        Ok(())
    }

    /// Score of a symbol that only just passes the core gate and has no
    /// enrichment data.
    pub fn min_core_pass_score(&self) -> u32 {
        let scorer = SqueezeScorer::new(self.score_weights.clone(), self.score_tiers.clone());
        let factors = ScoreFactors {
            funding_rate: self.funding_threshold - CORE_PASS_EPSILON,
            surge_ratio: self.oi_surge_ratio + CORE_PASS_EPSILON,
            ..ScoreFactors::default()
        };
        scorer.score(&factors).total
    }

    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to a preset with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            funding_threshold = config.funding_threshold,
            oi_surge_ratio = config.oi_surge_ratio,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}
