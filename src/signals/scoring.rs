// =============================================================================
// Squeeze Scorer — Tiered multi-factor composite score (0-100)
// =============================================================================
//
// Each factor contributes from its own bounded bucket:
//
//   funding rate     more negative   => more points   (default max 40)
//   OI surge ratio   higher          => more points   (default max 30)
//   crowd short %    higher          => more points   (default max 15)
//   top-trader trend rising > present               (default max 10)
//   taker buy/sell   higher          => more points   (default max  5)
//
// A factor's points are `round(max * fraction)` where `fraction` is the best
// tier step the value reaches.  Missing enrichment simply contributes zero.
// The scorer is pure: no I/O, no clock.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::runtime_config::{ScoreTiers, ScoreWeights, TierStep};
use crate::types::{LongShortReading, Trend};

/// Hard ceiling of the composite score.
pub const MAX_SCORE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Factor {
    FundingRate,
    OiSurge,
    CrowdShort,
    TopTraderTrend,
    TakerRatio,
}

impl Factor {
    pub fn key(&self) -> &'static str {
        match self {
            Self::FundingRate => "funding_rate",
            Self::OiSurge => "oi_surge",
            Self::CrowdShort => "crowd_short",
            Self::TopTraderTrend => "top_trader_trend",
            Self::TakerRatio => "taker_ratio",
        }
    }
}

/// Indicator values fed into the scorer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub funding_rate: f64,
    pub surge_ratio: f64,
    /// Short-account share of the global long/short ratio (0-100).
    pub crowd_short_pct: Option<f64>,
    pub top_trader_trend: Option<Trend>,
    pub taker_ratio: Option<f64>,
}

impl ScoreFactors {
    /// Build factors from the core pair plus whatever enrichment is present.
    pub fn from_indicators(
        funding_rate: f64,
        surge_ratio: f64,
        global_ls: Option<&LongShortReading>,
        top_ls: Option<&LongShortReading>,
        taker_ratio: Option<f64>,
    ) -> Self {
        Self {
            funding_rate,
            surge_ratio,
            crowd_short_pct: global_ls.map(|r| r.short_pct),
            top_trader_trend: top_ls.map(|r| r.trend),
            taker_ratio,
        }
    }
}

/// The contribution of a single factor to the final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorScore {
    pub factor: Factor,
    pub points: u32,
    pub max_points: u32,
    pub detail: String,
}

/// Result of one scoring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub total: u32,
    pub factors: Vec<FactorScore>,
}

impl ScoreCard {
    /// factor key => "points/max (detail)".
    pub fn breakdown(&self) -> BTreeMap<String, String> {
        self.factors
            .iter()
            .map(|f| {
                (
                    f.factor.key().to_string(),
                    format!("{}/{} ({})", f.points, f.max_points, f.detail),
                )
            })
            .collect()
    }

    #[cfg(test)]
    pub fn points_for(&self, factor: Factor) -> u32 {
        self.factors
            .iter()
            .find(|f| f.factor == factor)
            .map(|f| f.points)
            .unwrap_or(0)
    }
}

pub struct SqueezeScorer {
    weights: ScoreWeights,
    tiers: ScoreTiers,
}

impl SqueezeScorer {
    pub fn new(weights: ScoreWeights, tiers: ScoreTiers) -> Self {
        Self { weights, tiers }
    }

    pub fn score(&self, factors: &ScoreFactors) -> ScoreCard {
        let w = &self.weights;
        let t = &self.tiers;

        let funding_frac = best_fraction(&t.funding, factors.funding_rate, |v, th| v <= th);
        let surge_frac = best_fraction(&t.oi_surge, factors.surge_ratio, |v, th| v >= th);

        let mut scored = vec![
            FactorScore {
                factor: Factor::FundingRate,
                points: points(w.funding, funding_frac),
                max_points: w.funding,
                detail: format!("{:.4}%", factors.funding_rate * 100.0),
            },
            FactorScore {
                factor: Factor::OiSurge,
                points: points(w.oi_surge, surge_frac),
                max_points: w.oi_surge,
                detail: format!("{:.2}x", factors.surge_ratio),
            },
        ];

        scored.push(match factors.crowd_short_pct {
            Some(pct) => FactorScore {
                factor: Factor::CrowdShort,
                points: points(w.crowd_short, best_fraction(&t.crowd_short, pct, |v, th| v >= th)),
                max_points: w.crowd_short,
                detail: format!("{pct:.1}% short accounts"),
            },
            None => missing(Factor::CrowdShort, w.crowd_short),
        });

        scored.push(match factors.top_trader_trend {
            Some(trend) => {
                let frac = if trend == Trend::Rising {
                    t.top_trader_rising
                } else {
                    t.top_trader_present
                };
                FactorScore {
                    factor: Factor::TopTraderTrend,
                    points: points(w.top_trader, frac),
                    max_points: w.top_trader,
                    detail: format!("top traders {trend}"),
                }
            }
            None => missing(Factor::TopTraderTrend, w.top_trader),
        });

        scored.push(match factors.taker_ratio {
            Some(ratio) => FactorScore {
                factor: Factor::TakerRatio,
                points: points(w.taker, best_fraction(&t.taker, ratio, |v, th| v >= th)),
                max_points: w.taker,
                detail: format!("buy/sell {ratio:.2}"),
            },
            None => missing(Factor::TakerRatio, w.taker),
        });

        let total = scored.iter().map(|f| f.points).sum::<u32>().min(MAX_SCORE);

        ScoreCard {
            total,
            factors: scored,
        }
    }
}

impl Default for SqueezeScorer {
    fn default() -> Self {
        Self::new(ScoreWeights::default(), ScoreTiers::default())
    }
}

/// Highest fraction among the steps `value` reaches. Taking the maximum
/// rather than the first match keeps the result monotonic whatever order the
/// table is written in.
fn best_fraction(steps: &[TierStep], value: f64, reaches: impl Fn(f64, f64) -> bool) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    steps
        .iter()
        .filter(|s| reaches(value, s.threshold))
        .map(|s| s.fraction)
        .fold(0.0, f64::max)
}

fn points(max_points: u32, fraction: f64) -> u32 {
    (max_points as f64 * fraction.clamp(0.0, 1.0)).round() as u32
}

fn missing(factor: Factor, max_points: u32) -> FactorScore {
    FactorScore {
        factor,
        points: 0,
        max_points,
        detail: "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(funding_rate: f64, surge_ratio: f64) -> ScoreFactors {
        ScoreFactors {
            funding_rate,
            surge_ratio,
            ..ScoreFactors::default()
        }
    }

    #[test]
    fn core_only_example_scores_seventy() {
        let card = SqueezeScorer::default().score(&core(-0.004, 3.2));
        assert_eq!(card.points_for(Factor::FundingRate), 40);
        assert_eq!(card.points_for(Factor::OiSurge), 30);
        assert_eq!(card.total, 70);
    }

    #[test]
    fn missing_enrichment_contributes_zero() {
        let card = SqueezeScorer::default().score(&core(-0.004, 3.2));
        assert_eq!(card.points_for(Factor::CrowdShort), 0);
        assert_eq!(card.points_for(Factor::TopTraderTrend), 0);
        assert_eq!(card.points_for(Factor::TakerRatio), 0);
        assert_eq!(card.breakdown()["taker_ratio"], "0/5 (n/a)");
    }

    #[test]
    fn everything_maxed_caps_at_hundred() {
        let weights = ScoreWeights {
            taker: 20,
            ..ScoreWeights::default()
        };
        let scorer = SqueezeScorer::new(weights, ScoreTiers::default());
        let card = scorer.score(&ScoreFactors {
            funding_rate: -0.01,
            surge_ratio: 5.0,
            crowd_short_pct: Some(80.0),
            top_trader_trend: Some(Trend::Rising),
            taker_ratio: Some(3.0),
        });
        assert_eq!(card.total, MAX_SCORE);
    }

    #[test]
    fn benign_values_score_zero() {
        let card = SqueezeScorer::default().score(&core(0.0001, 1.0));
        assert_eq!(card.total, 0);
    }

    #[test]
    fn funding_is_monotonic() {
        let scorer = SqueezeScorer::default();
        let mut last = 0;
        for i in 0..60 {
            let rate = -(i as f64) * 0.0001;
            let pts = scorer.score(&core(rate, 1.0)).points_for(Factor::FundingRate);
            assert!(pts >= last, "rate {rate} gave {pts} < {last}");
            last = pts;
        }
        assert_eq!(last, 40);
    }

    #[test]
    fn surge_is_monotonic() {
        let scorer = SqueezeScorer::default();
        let mut last = 0;
        for i in 0..50 {
            let ratio = 1.0 + i as f64 * 0.05;
            let pts = scorer.score(&core(0.0, ratio)).points_for(Factor::OiSurge);
            assert!(pts >= last);
            last = pts;
        }
    }

    #[test]
    fn crowd_short_and_taker_tiers() {
        let scorer = SqueezeScorer::default();
        let mut f = core(-0.001, 2.0);
        f.crowd_short_pct = Some(66.0);
        f.taker_ratio = Some(1.25);
        let card = scorer.score(&f);
        assert_eq!(card.points_for(Factor::CrowdShort), 15);
        assert_eq!(card.points_for(Factor::TakerRatio), 3);
        // 20 + 15 + 15 + 3
        assert_eq!(card.total, 53);
    }

    #[test]
    fn rising_top_traders_beat_merely_present() {
        let scorer = SqueezeScorer::default();
        let mut rising = core(0.0, 1.0);
        rising.top_trader_trend = Some(Trend::Rising);
        let mut flat = core(0.0, 1.0);
        flat.top_trader_trend = Some(Trend::Declining);
        assert_eq!(scorer.score(&rising).total, 10);
        assert_eq!(scorer.score(&flat).total, 5);
    }

    #[test]
    fn unordered_tier_table_still_monotonic() {
        let mut tiers = ScoreTiers::default();
        tiers.oi_surge.reverse();
        let scorer = SqueezeScorer::new(ScoreWeights::default(), tiers);
        assert_eq!(scorer.score(&core(0.0, 3.5)).points_for(Factor::OiSurge), 30);
        assert_eq!(scorer.score(&core(0.0, 2.1)).points_for(Factor::OiSurge), 15);
    }

    #[test]
    fn nan_inputs_score_zero() {
        let card = SqueezeScorer::default().score(&core(f64::NAN, f64::NAN));
        assert_eq!(card.total, 0);
    }
}
