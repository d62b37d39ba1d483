// =============================================================================
// Message Builders — Markdown text for every notification kind
// =============================================================================

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::performance::{OutcomeEvent, OutcomeStatus, PerformanceStats, SignalOutcome};
use crate::phase_tracker::PhaseTransition;
use crate::runtime_config::{PerformanceParams, RuntimeConfig};
use crate::types::{Phase, Signal};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

fn pct(rate: f64) -> String {
    format!("{:.4}%", rate * 100.0)
}

/// Squeeze alert for a newly accepted signal.
pub fn squeeze_alert(signal: &Signal, risk: &PerformanceParams) -> String {
    let core = &signal.core;
    let enhanced = &signal.enhanced;
    let mut msg = String::new();

    let _ = writeln!(msg, "*Short squeeze alert: {}*", signal.symbol);
    let _ = writeln!(msg, "Score: `{}/100`", signal.score);
    let _ = writeln!(msg);
    let _ = writeln!(msg, "*Core indicators*");
    let _ = writeln!(msg, "• Funding rate: `{}`", pct(core.funding_rate));
    let _ = writeln!(
        msg,
        "• OI surge: `{:.2}x` ({:+.2}% last sample)",
        core.surge_ratio, core.oi_change_pct
    );
    let _ = writeln!(msg, "• Open interest: `{:.0}`", core.current_oi);
    let _ = writeln!(msg, "• Price: `${:.4}`", core.price);
    let _ = writeln!(msg, "• 24h volume: `${:.0}`", core.volume_24h);

    let has_enhanced = enhanced.taker_ratio.is_some()
        || enhanced.global_long_short.is_some()
        || enhanced.top_trader_long_short.is_some();
    if has_enhanced {
        let _ = writeln!(msg);
        let _ = writeln!(msg, "*Positioning*");
        if let Some(ls) = &enhanced.global_long_short {
            let _ = writeln!(
                msg,
                "• Crowd: `{:.1}%` short, ratio `{:.3}` ({})",
                ls.short_pct, ls.ratio, ls.trend
            );
        }
        if let Some(ls) = &enhanced.top_trader_long_short {
            let _ = writeln!(
                msg,
                "• Top traders: ratio `{:.3}` ({})",
                ls.ratio, ls.trend
            );
        }
        if let Some(taker) = enhanced.taker_ratio {
            let _ = writeln!(msg, "• Taker buy/sell: `{taker:.3}`");
        }
    }

    if !signal.score_breakdown.is_empty() {
        let _ = writeln!(msg);
        let _ = writeln!(msg, "*Score breakdown*");
        for (factor, detail) in &signal.score_breakdown {
            let _ = writeln!(msg, "• {factor}: {detail}");
        }
    }

    let _ = writeln!(msg);
    let _ = writeln!(msg, "*Plan*");
    let _ = writeln!(msg, "• Confirm entry on the chart before acting");
    let _ = writeln!(msg, "• Stop loss `-{:.0}%`", risk.stop_loss_pct);
    let _ = writeln!(
        msg,
        "• Targets `+{:.0}%` / `+{:.0}%`",
        risk.take_profit_1_pct, risk.take_profit_2_pct
    );
    let _ = write!(msg, "_{}_", signal.timestamp.format(TIME_FORMAT));
    msg
}

fn phase_meaning(phase: Phase) -> &'static str {
    match phase {
        Phase::Init => "not tracked",
        Phase::Accumulation => "shorts crowded while open interest builds",
        Phase::Capitulation => "crowd shorts starting to capitulate",
        Phase::Unwind => "positions unwinding, squeeze likely over",
    }
}

/// One message per phase transition.
pub fn phase_change(t: &PhaseTransition) -> String {
    let entry = &t.entry;
    let elapsed = t.at - entry.start_time;
    let mut msg = String::new();

    let _ = writeln!(msg, "*Phase change: {}*", t.symbol);
    let _ = writeln!(msg, "`{}` → `{}`: {}", t.from, t.to, phase_meaning(t.to));
    let _ = writeln!(msg, "• Reason: {}", t.reason);
    let _ = writeln!(
        msg,
        "• Tracked for {}h {:02}m, {} checks",
        elapsed.num_hours(),
        elapsed.num_minutes() % 60,
        entry.check_count
    );
    let _ = writeln!(
        msg,
        "• Originating score `{}` at `${:.4}`",
        entry.originating_signal.score, entry.originating_signal.core.price
    );
    if t.removed {
        let _ = writeln!(msg, "• Tracking closed");
    }
    let _ = write!(msg, "_{}_", t.at.format(TIME_FORMAT));
    msg
}

/// Take-profit or stop-loss resolution of a signal outcome.
pub fn outcome_update(event: &OutcomeEvent) -> String {
    let o = &event.outcome;
    let headline = match o.status {
        OutcomeStatus::Tp2Hit => "Target 2 reached",
        OutcomeStatus::Tp1Hit => "Target 1 reached",
        OutcomeStatus::Stopped => "Stop loss hit",
        OutcomeStatus::Active => "Signal update",
    };
    let mut msg = String::new();
    let _ = writeln!(msg, "*{headline}: {}*", o.symbol);
    let _ = writeln!(msg, "• Entry `${:.4}`", o.entry_price);
    if let Some(price) = o.final_price {
        let _ = writeln!(msg, "• Exit `${price:.4}`");
    }
    let _ = writeln!(msg, "• Result `{:+.2}%`", event.profit_pct);
    let _ = write!(msg, "• Peak `{:+.2}%`", o.peak_profit_pct);
    msg
}

/// Periodic win-rate report; lists up to five most recent active outcomes.
pub fn stats_report(stats: &PerformanceStats, outcomes: &[SignalOutcome]) -> String {
    let mut msg = String::new();
    let _ = writeln!(msg, "*Signal statistics*");
    let _ = writeln!(msg, "• Signals: `{}`", stats.total);
    let _ = writeln!(msg, "• Active: `{}`", stats.active);
    let _ = writeln!(msg, "• Take profit: `{}`", stats.successes);
    let _ = writeln!(msg, "• Stopped: `{}`", stats.failures);
    let _ = writeln!(msg, "• Win rate: `{:.1}%`", stats.win_rate_pct);
    let _ = writeln!(msg, "• Avg profit: `{:+.2}%`", stats.avg_profit_pct);
    let _ = write!(msg, "• Avg loss: `{:+.2}%`", stats.avg_loss_pct);

    let active: Vec<&SignalOutcome> = outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::Active)
        .collect();
    if !active.is_empty() {
        let _ = write!(msg, "\n\n*Active*");
        for o in active.iter().rev().take(5).rev() {
            let _ = write!(
                msg,
                "\n• {} peak `{:+.2}%`",
                o.symbol, o.peak_profit_pct
            );
        }
    }
    msg
}

pub fn startup(config: &RuntimeConfig, preset: &str, restored_symbols: usize, now: DateTime<Utc>) -> String {
    let mut msg = String::new();
    let _ = writeln!(msg, "*Squeeze radar started*");
    let _ = writeln!(msg, "• Preset: `{preset}`");
    let _ = writeln!(msg, "• Funding ≤ `{}`", pct(config.funding_threshold));
    let _ = writeln!(
        msg,
        "• OI surge ≥ `{:.2}x` ({}/{} samples)",
        config.oi_surge_ratio, config.short_window, config.long_window
    );
    let _ = writeln!(msg, "• Min volume `${:.0}`", config.min_volume_usd);
    let _ = writeln!(msg, "• Scan every `{}s`", config.scan_interval_secs);
    let _ = writeln!(msg, "• Restored OI history for `{restored_symbols}` symbols");
    let _ = write!(msg, "_{}_", now.format(TIME_FORMAT));
    msg
}

pub fn shutdown(tracked: usize, signals: usize, now: DateTime<Utc>) -> String {
    format!(
        "*Squeeze radar stopped*\n• Tracked symbols: `{tracked}`\n• Signals logged: `{signals}`\n_{}_",
        now.format(TIME_FORMAT)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase_tracker::TrackingEntry;
    use crate::types::{CoreIndicators, EnhancedIndicators, LongShortReading, Trend};
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn signal() -> Signal {
        let mut breakdown = BTreeMap::new();
        breakdown.insert("funding_rate".to_string(), "40/40 (-0.4000%)".to_string());
        Signal {
            id: Uuid::new_v4(),
            symbol: "AAAUSDT".to_string(),
            score: 70,
            core: CoreIndicators {
                funding_rate: -0.004,
                surge_ratio: 3.2,
                oi_change_pct: 12.5,
                current_oi: 1_500_000.0,
                price: 0.1234,
                volume_24h: 25_000_000.0,
            },
            enhanced: EnhancedIndicators {
                taker_ratio: Some(1.3),
                global_long_short: Some(LongShortReading {
                    ratio: 0.6,
                    long_pct: 37.5,
                    short_pct: 62.5,
                    trend: Trend::Declining,
                    samples: vec![0.8, 0.7, 0.6],
                }),
                top_trader_long_short: None,
            },
            score_breakdown: breakdown,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 3, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn alert_contains_core_and_breakdown() {
        let msg = squeeze_alert(&signal(), &PerformanceParams::default());
        assert!(msg.starts_with("*Short squeeze alert: AAAUSDT*"));
        assert!(msg.contains("`-0.4000%`"));
        assert!(msg.contains("`3.20x`"));
        assert!(msg.contains("62.5%"));
        assert!(msg.contains("funding_rate: 40/40"));
        assert!(msg.contains("Stop loss `-3%`"));
        assert!(!msg.contains("Top traders"));
    }

    #[test]
    fn phase_message_names_both_phases() {
        let s = signal();
        let start = s.timestamp;
        let at = start + chrono::Duration::minutes(130);
        let t = PhaseTransition {
            symbol: s.symbol.clone(),
            from: Phase::Accumulation,
            to: Phase::Capitulation,
            at,
            reason: "global long/short ratio turned down".to_string(),
            entry: TrackingEntry {
                symbol: s.symbol.clone(),
                phase: Phase::Capitulation,
                start_time: start,
                last_check_time: at,
                check_count: 13,
                alert_count: 1,
                originating_signal: s,
                last_global_trend: Some(Trend::Declining),
            },
            removed: false,
        };
        let msg = phase_change(&t);
        assert!(msg.contains("`PHASE_1_2` → `PHASE_4`"));
        assert!(msg.contains("2h 10m, 13 checks"));
        assert!(!msg.contains("Tracking closed"));
    }

    #[test]
    fn stats_lists_recent_active_only() {
        let s = signal();
        let mut outcomes: Vec<SignalOutcome> = (0..7)
            .map(|i| {
                let mut o = SignalOutcome::open(&s);
                o.symbol = format!("S{i}USDT");
                o
            })
            .collect();
        outcomes[6].status = OutcomeStatus::Stopped;
        let msg = stats_report(&PerformanceStats::default(), &outcomes);
        assert!(!msg.contains("S0USDT"));
        assert!(msg.contains("S1USDT"));
        assert!(msg.contains("S5USDT"));
        assert!(!msg.contains("S6USDT"));
    }
}
