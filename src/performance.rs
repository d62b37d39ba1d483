// =============================================================================
// Signal Performance — Post-alert price follow-up and win-rate statistics
// =============================================================================
//
// Every accepted signal gets an outcome record that follows the price after
// the alert.  Signals stay immutable; only their outcomes move:
//
//   profit >= TP2        => Tp2Hit   (final)
//   profit >= TP1        => Tp1Hit   (a success; still watched for TP2 only)
//   profit <= -stop      => Stopped  (final, only from Active)
//
// There is no time barrier: stale signals stay Active.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::runtime_config::PerformanceParams;
use crate::types::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Active,
    Tp1Hit,
    Tp2Hit,
    Stopped,
}

impl OutcomeStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Tp2Hit | Self::Stopped)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Tp1Hit | Self::Tp2Hit)
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Tp1Hit => write!(f, "tp1_hit"),
            Self::Tp2Hit => write!(f, "tp2_hit"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Price follow-up of one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalOutcome {
    pub signal_id: Uuid,
    pub symbol: String,
    pub entry_price: f64,
    pub status: OutcomeStatus,
    pub peak_price: f64,
    pub peak_profit_pct: f64,
    #[serde(default)]
    pub final_price: Option<f64>,
    #[serde(default)]
    pub final_profit_pct: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl SignalOutcome {
    pub fn open(signal: &Signal) -> Self {
        Self {
            signal_id: signal.id,
            symbol: signal.symbol.clone(),
            entry_price: signal.core.price,
            status: OutcomeStatus::Active,
            peak_price: signal.core.price,
            peak_profit_pct: 0.0,
            final_price: None,
            final_profit_pct: None,
            updated_at: signal.timestamp,
        }
    }
}

/// A status change worth notifying about.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeEvent {
    pub outcome: SignalOutcome,
    pub profit_pct: f64,
}

/// Aggregate win/loss statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total: usize,
    pub active: usize,
    pub successes: usize,
    pub failures: usize,
    /// successes / (successes + failures) * 100; 0 when nothing resolved.
    pub win_rate_pct: f64,
    pub avg_profit_pct: f64,
    pub avg_loss_pct: f64,
}

pub struct PerformanceTracker {
    params: PerformanceParams,
    outcomes: Vec<SignalOutcome>,
}

impl PerformanceTracker {
    pub fn new(params: PerformanceParams) -> Self {
        Self {
            params,
            outcomes: Vec::new(),
        }
    }

    pub fn open(&mut self, signal: &Signal) {
        if signal.core.price > 0.0 {
            self.outcomes.push(SignalOutcome::open(signal));
        }
    }

    /// Re-price every non-final outcome whose symbol appears in `prices`.
    /// Returns the outcomes that reached a final status on this pass.
    pub fn update(
        &mut self,
        prices: &HashMap<String, f64>,
        now: DateTime<Utc>,
    ) -> Vec<OutcomeEvent> {
        let mut events = Vec::new();
        for outcome in self.outcomes.iter_mut().filter(|o| !o.status.is_final()) {
            let Some(&price) = prices.get(&outcome.symbol) else {
                continue;
            };
            if outcome.entry_price <= 0.0 || price <= 0.0 {
                continue;
            }

            let profit_pct = (price - outcome.entry_price) / outcome.entry_price * 100.0;
            if profit_pct > outcome.peak_profit_pct {
                outcome.peak_profit_pct = profit_pct;
                outcome.peak_price = price;
            }
            outcome.updated_at = now;

            if profit_pct >= self.params.take_profit_2_pct {
                outcome.status = OutcomeStatus::Tp2Hit;
            } else if profit_pct >= self.params.take_profit_1_pct {
                if outcome.status == OutcomeStatus::Active {
                    outcome.status = OutcomeStatus::Tp1Hit;
                }
            } else if profit_pct <= -self.params.stop_loss_pct
                && outcome.status == OutcomeStatus::Active
            {
                outcome.status = OutcomeStatus::Stopped;
            }

            if outcome.status.is_final() {
                outcome.final_price = Some(price);
                outcome.final_profit_pct = Some(profit_pct);
                debug!(
                    symbol = %outcome.symbol,
                    status = %outcome.status,
                    profit_pct = format!("{:.2}", profit_pct),
                    "signal outcome resolved"
                );
                events.push(OutcomeEvent {
                    outcome: outcome.clone(),
                    profit_pct,
                });
            }
        }
        events
    }

    pub fn stats(&self) -> PerformanceStats {
        let total = self.outcomes.len();
        let active = self
            .outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Active)
            .count();
        let successes: Vec<&SignalOutcome> =
            self.outcomes.iter().filter(|o| o.status.is_success()).collect();
        let failures: Vec<&SignalOutcome> = self
            .outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Stopped)
            .collect();

        let resolved = successes.len() + failures.len();
        let win_rate_pct = if resolved > 0 {
            successes.len() as f64 / resolved as f64 * 100.0
        } else {
            0.0
        };

        // Tp1Hit outcomes have no final price yet; their peak stands in.
        let avg_profit_pct = mean(
            successes
                .iter()
                .map(|o| o.final_profit_pct.unwrap_or(o.peak_profit_pct)),
        );
        let avg_loss_pct = mean(failures.iter().filter_map(|o| o.final_profit_pct));

        PerformanceStats {
            total,
            active,
            successes: successes.len(),
            failures: failures.len(),
            win_rate_pct,
            avg_profit_pct,
            avg_loss_pct,
        }
    }

    pub fn outcomes(&self) -> &[SignalOutcome] {
        &self.outcomes
    }

    /// Counts of currently tracked (non-final) outcomes.
    pub fn open_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.status.is_final()).count()
    }

    pub fn restore(&mut self, outcomes: Vec<SignalOutcome>) {
        self.outcomes = outcomes;
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(PerformanceParams::default())
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count > 0 {
        sum / count as f64
    } else {
        0.0
    }
}
