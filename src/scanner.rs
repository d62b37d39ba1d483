// =============================================================================
// Scan Orchestrator — One detection cycle over every funding candidate
// =============================================================================
//
// Per cycle:
//   1. funding rates for every symbol, keep those below the threshold
//   2. per candidate: ticker (liquidity filter), open interest, surge ratio
//   3. core gate: funding < threshold AND surge > ratio
//   4. enrichment (long/short ratios, taker flow), never blocking
//   5. score, cooldown, alert, log signal, start/refresh tracking
//   6. advance every tracked symbol, candidate or not
//   7. follow up open signal outcomes, export time series, persist
//
// A failure for one symbol skips that symbol only; the cycle always
// completes.  Lock guards are taken per step and never held across awaits.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app_state::EngineState;
use crate::error::{ScanError, ScanResult};
use crate::futures_intel::MarketDataProvider;
use crate::notify::{format, NotificationSink};
use crate::phase_tracker::{PhaseInputs, PhaseOutcome, Registration};
use crate::runtime_config::RuntimeConfig;
use crate::signals::{OIObservation, ScoreFactors, SqueezeScorer};
use crate::store::{PersistenceStore, TimeseriesRow};
use crate::types::{
    CoreIndicators, EnhancedIndicators, FundingEntry, LongShortKind, LongShortReading,
    MetricsSnapshot, Signal, Trend,
};

// =============================================================================
// Cycle report
// =============================================================================

/// Tally of one scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    /// Symbols below the funding threshold, after the per-cycle cap.
    pub candidates: usize,
    /// Candidates fully evaluated.
    pub scanned: usize,
    pub skipped_transient: usize,
    pub skipped_format: usize,
    /// Rejected by the volume / price filter.
    pub filtered: usize,
    pub core_passes: usize,
    pub alerts: usize,
    pub suppressed: usize,
    pub transitions: usize,
    pub expired: usize,
    pub outcomes_resolved: usize,
    pub persistence_failures: usize,
}

impl CycleReport {
    fn record_skip(&mut self, err: &ScanError) {
        if err.is_transient() {
            self.skipped_transient += 1;
        } else {
            self.skipped_format += 1;
        }
    }
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq)]
enum Verdict {
    Filtered,
    NoCore,
    Suppressed,
    Alerted,
}

/// Data gathered for a symbol during this cycle, reused by phase tracking.
/// A request already attempted this cycle is never repeated, even if it failed.
#[derive(Debug, Clone, Copy, Default)]
struct CycleObservation {
    open_interest: Option<f64>,
    global_trend: Option<Trend>,
    oi_requested: bool,
    trend_requested: bool,
}

impl CycleObservation {
    fn needs_requests(&self) -> bool {
        !self.oi_requested || !self.trend_requested
    }
}

/// Counts restored at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub oi_symbols: usize,
    pub signals: usize,
}

// =============================================================================
// ScanOrchestrator
// =============================================================================

pub struct ScanOrchestrator {
    state: Arc<EngineState>,
    provider: Arc<dyn MarketDataProvider>,
    sink: Arc<dyn NotificationSink>,
    store: Arc<dyn PersistenceStore>,
}

impl ScanOrchestrator {
    pub fn new(
        state: Arc<EngineState>,
        provider: Arc<dyn MarketDataProvider>,
        sink: Arc<dyn NotificationSink>,
        store: Arc<dyn PersistenceStore>,
    ) -> Self {
        Self {
            state,
            provider,
            sink,
            store,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &Arc<EngineState> {
        &self.state
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Startup reachability check. Failure here is fatal.
    pub async fn check_provider(&self) -> ScanResult<()> {
        self.provider
            .ping()
            .await
            .map_err(|e| ScanError::StartupFatal(format!("market data provider unreachable: {e}")))
    }

    /// Load persisted OI history and the signal log. A corrupt or unreadable
    /// file is logged and replaced by empty state.
    pub fn restore(&self) -> RestoreSummary {
        let oi_symbols = match self.store.load_oi_history() {
            Ok(history) => self.state.restore_oi_history(history),
            Err(e) => {
                warn!(error = %e, "OI history not restored, starting empty");
                self.state.push_error(&e);
                0
            }
        };
        let signals = match self.store.load_signal_log() {
            Ok(log) => self.state.restore_signal_log(log),
            Err(e) => {
                warn!(error = %e, "signal log not restored, starting empty");
                self.state.push_error(&e);
                0
            }
        };
        info!(oi_symbols, signals, "state restored");
        RestoreSummary {
            oi_symbols,
            signals,
        }
    }

    /// Persist OI history and the signal log. Returns the number of writes
    /// that failed; failures are logged and never fatal.
    pub fn flush(&self, now: DateTime<Utc>) -> usize {
        let mut failures = 0;
        let snapshot = self.state.oi_windows.lock().snapshot();
        if let Err(e) = self.store.save_oi_history(&snapshot) {
            warn!(error = %e, "failed to persist OI history");
            self.state.push_error(&e);
            failures += 1;
        }
        let log = self.state.signal_log(now);
        if let Err(e) = self.store.save_signal_log(&log) {
            warn!(error = %e, "failed to persist signal log");
            self.state.push_error(&e);
            failures += 1;
        }
        failures
    }

    pub async fn notify(&self, text: &str) -> bool {
        self.sink.send(text).await
    }

    /// Send the statistics report when any signal history exists.
    pub async fn report_stats(&self, now: DateTime<Utc>) -> bool {
        let stats = self.state.stats();
        *self.state.last_stats_report.lock() = Some(now);
        if stats.total == 0 {
            return false;
        }
        let outcomes = self.state.outcomes();
        info!(
            total = stats.total,
            win_rate_pct = format!("{:.1}", stats.win_rate_pct),
            "performance statistics"
        );
        self.sink.send(&format::stats_report(&stats, &outcomes)).await
    }

    async fn maybe_report_stats(&self, config: &RuntimeConfig, now: DateTime<Utc>) {
        let due = match *self.state.last_stats_report.lock() {
            None => true,
            Some(last) => (now - last).num_seconds() >= config.stats_report_interval_secs as i64,
        };
        if due {
            self.report_stats(now).await;
        }
    }

    // -------------------------------------------------------------------------
    // Cycle
    // -------------------------------------------------------------------------

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let config = self.state.config.read().clone();
        let mut report = CycleReport {
            started_at: Some(now),
            ..CycleReport::default()
        };
        let mut observed: HashMap<String, CycleObservation> = HashMap::new();
        let mut rows: Vec<TimeseriesRow> = Vec::new();

        self.state.cooldowns.lock().prune(now);

        // 1. Candidate discovery.
        let funding = match self.provider.fetch_funding_rates().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "funding rates unavailable, candidates skipped");
                self.state.push_error(&e);
                report.record_skip(&e);
                Vec::new()
            }
        };
        let prices: HashMap<String, f64> = funding
            .iter()
            .filter(|f| f.mark_price > 0.0)
            .map(|f| (f.symbol.clone(), f.mark_price))
            .collect();
        let candidates = select_candidates(&funding, &config);
        report.candidates = candidates.len();

        // 2-5. Candidate evaluation.
        for (i, entry) in candidates.iter().enumerate() {
            if i > 0 && config.request_pacing_ms > 0 {
                tokio::time::sleep(Duration::from_millis(config.request_pacing_ms)).await;
            }
            let obs = observed.entry(entry.symbol.clone()).or_default();
            match self.evaluate(entry, &config, now, obs, &mut rows).await {
                Ok(verdict) => {
                    report.scanned += 1;
                    match verdict {
                        Verdict::Filtered => report.filtered += 1,
                        Verdict::NoCore => {}
                        Verdict::Suppressed => {
                            report.core_passes += 1;
                            report.suppressed += 1;
                        }
                        Verdict::Alerted => {
                            report.core_passes += 1;
                            report.alerts += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(symbol = %entry.symbol, error = %e, kind = e.kind(), "symbol skipped");
                    self.state.push_error(&e);
                    report.record_skip(&e);
                    obs.oi_requested = true;
                    obs.trend_requested = true;
                }
            }
        }

        // 6. Phase tracking.
        self.advance_tracked(&config, now, &mut observed, &mut report).await;

        // 7. Outcome follow-up, export, persistence.
        let events = self.state.performance.lock().update(&prices, now);
        report.outcomes_resolved = events.len();
        for event in &events {
            info!(
                symbol = %event.outcome.symbol,
                status = %event.outcome.status,
                profit_pct = format!("{:.2}", event.profit_pct),
                "signal outcome resolved"
            );
            self.sink.send(&format::outcome_update(event)).await;
        }

        if let Err(e) = self.store.append_timeseries(&rows) {
            warn!(error = %e, "failed to export time series");
            self.state.push_error(&e);
            report.persistence_failures += 1;
        }
        report.persistence_failures += self.flush(now);

        self.maybe_report_stats(&config, now).await;

        info!(
            candidates = report.candidates,
            scanned = report.scanned,
            filtered = report.filtered,
            core_passes = report.core_passes,
            alerts = report.alerts,
            transitions = report.transitions,
            skipped_transient = report.skipped_transient,
            skipped_format = report.skipped_format,
            tracked = self.state.tracker.lock().len(),
            "scan cycle complete"
        );

        *self.state.last_cycle.write() = Some(report.clone());
        self.state.increment_version();
        report
    }

    async fn evaluate(
        &self,
        entry: &FundingEntry,
        config: &RuntimeConfig,
        now: DateTime<Utc>,
        obs: &mut CycleObservation,
        rows: &mut Vec<TimeseriesRow>,
    ) -> ScanResult<Verdict> {
        let symbol = entry.symbol.as_str();

        let ticker = self.provider.fetch_ticker(symbol).await?;
        if ticker.quote_volume < config.min_volume_usd || ticker.price < config.min_price {
            debug!(
                symbol,
                quote_volume = format!("{:.0}", ticker.quote_volume),
                price = ticker.price,
                "below liquidity filter"
            );
            return Ok(Verdict::Filtered);
        }

        obs.oi_requested = true;
        let oi = self.provider.fetch_open_interest(symbol).await?;
        obs.open_interest = Some(oi);
        let observation = self.state.oi_windows.lock().observe(symbol, oi);

        let core_pass = entry.funding_rate < config.funding_threshold
            && observation.surge_ratio > config.oi_surge_ratio;
        if !core_pass {
            debug!(
                symbol,
                funding_rate = entry.funding_rate,
                surge_ratio = format!("{:.3}", observation.surge_ratio),
                samples = observation.samples,
                "core condition not met"
            );
            return Ok(Verdict::NoCore);
        }

        let enhanced = self.fetch_enrichment(symbol, config).await;
        obs.trend_requested = true;
        obs.global_trend = enhanced.global_long_short.as_ref().map(|r| r.trend);

        let snapshot = MetricsSnapshot {
            symbol: symbol.to_string(),
            funding_rate: entry.funding_rate,
            open_interest: oi,
            price: ticker.price,
            volume_24h: ticker.quote_volume,
            taker_ratio: enhanced.taker_ratio,
            global_long_short: enhanced.global_long_short,
            top_trader_long_short: enhanced.top_trader_long_short,
        };
        let signal = score_snapshot(&self.state.scorer, snapshot, observation, now);

        if !self.state.cooldowns.lock().should_alert(symbol, signal.score, now) {
            return Ok(Verdict::Suppressed);
        }

        info!(
            symbol,
            score = signal.score,
            funding_rate = entry.funding_rate,
            surge_ratio = format!("{:.2}", observation.surge_ratio),
            "squeeze alert"
        );
        if !self
            .sink
            .send(&format::squeeze_alert(&signal, &config.performance))
            .await
        {
            warn!(symbol, "squeeze alert not delivered");
        }

        let registration = self.state.tracker.lock().register(&signal, now);
        let phase = match registration {
            Registration::Started(t) => t.to,
            Registration::Refreshed { phase, .. } => phase,
        };

        rows.push(TimeseriesRow {
            timestamp: now,
            symbol: symbol.to_string(),
            funding_rate: entry.funding_rate,
            surge_ratio: observation.surge_ratio,
            current_oi: oi,
            price: ticker.price,
            score: signal.score,
            phase,
        });
        self.state.push_signal(signal);

        Ok(Verdict::Alerted)
    }

    /// Optional indicators; each failure only drops that indicator.
    async fn fetch_enrichment(&self, symbol: &str, config: &RuntimeConfig) -> EnhancedIndicators {
        let params = &config.enrichment;

        let global_long_short = self
            .long_short(symbol, LongShortKind::Global, &params.global_ls_period, params.trend_window)
            .await;
        let top_trader_long_short = self
            .long_short(symbol, LongShortKind::TopTrader, &params.top_ls_period, params.trend_window)
            .await;
        let taker_ratio = match self
            .provider
            .fetch_taker_buy_sell_ratio(symbol, &params.taker_period)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(symbol, error = %e, "taker ratio unavailable");
                None
            }
        };

        EnhancedIndicators {
            taker_ratio,
            global_long_short,
            top_trader_long_short,
        }
    }

    async fn long_short(
        &self,
        symbol: &str,
        kind: LongShortKind,
        period: &str,
        limit: usize,
    ) -> Option<LongShortReading> {
        match self
            .provider
            .fetch_long_short_ratio(symbol, kind, period, limit)
            .await
        {
            Ok(reading) => reading,
            Err(e) => {
                debug!(symbol, kind = %kind, error = %e, "long/short ratio unavailable");
                None
            }
        }
    }

    /// Evaluate transitions for every tracked symbol, fetching whatever the
    /// candidate pass did not already observe.
    async fn advance_tracked(
        &self,
        config: &RuntimeConfig,
        now: DateTime<Utc>,
        observed: &mut HashMap<String, CycleObservation>,
        report: &mut CycleReport,
    ) {
        let tracked = self.state.tracker.lock().tracked_symbols();
        let enrichment = &config.enrichment;
        let mut paced = !observed.is_empty();

        for symbol in tracked {
            let mut obs = observed.get(&symbol).copied().unwrap_or_default();

            if obs.needs_requests() {
                if paced && config.request_pacing_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(config.request_pacing_ms)).await;
                }
                paced = true;
            }

            if !obs.oi_requested {
                match self.provider.fetch_open_interest(&symbol).await {
                    Ok(oi) => {
                        self.state.oi_windows.lock().observe(&symbol, oi);
                        obs.open_interest = Some(oi);
                    }
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "tracked symbol OI unavailable");
                        self.state.push_error(&e);
                    }
                }
            }
            if !obs.trend_requested {
                obs.global_trend = self
                    .long_short(
                        &symbol,
                        LongShortKind::Global,
                        &enrichment.global_ls_period,
                        enrichment.trend_window,
                    )
                    .await
                    .map(|r| r.trend);
            }

            let recent_oi_peak = self
                .state
                .oi_windows
                .lock()
                .recent_peak(&symbol, config.phase.unwind_lookback);
            let inputs = PhaseInputs {
                global_trend: obs.global_trend,
                current_oi: obs.open_interest,
                recent_oi_peak,
            };

            let outcome = self.state.tracker.lock().advance(&symbol, inputs, now);
            match outcome {
                Some(PhaseOutcome::Transitioned(t)) => {
                    report.transitions += 1;
                    if !self.sink.send(&format::phase_change(&t)).await {
                        warn!(symbol = %symbol, to = %t.to, "phase change not delivered");
                    }
                }
                Some(PhaseOutcome::Expired(entry)) => {
                    report.expired += 1;
                    debug!(symbol = %symbol, phase = %entry.phase, checks = entry.check_count, "tracking expired");
                }
                None => {}
            }
        }
    }
}

/// Score a gathered snapshot into a candidate signal. No I/O.
fn score_snapshot(
    scorer: &SqueezeScorer,
    snapshot: MetricsSnapshot,
    observation: OIObservation,
    now: DateTime<Utc>,
) -> Signal {
    let factors = ScoreFactors::from_indicators(
        snapshot.funding_rate,
        observation.surge_ratio,
        snapshot.global_long_short.as_ref(),
        snapshot.top_trader_long_short.as_ref(),
        snapshot.taker_ratio,
    );
    let card = scorer.score(&factors);

    Signal {
        id: Uuid::new_v4(),
        symbol: snapshot.symbol,
        score: card.total,
        core: CoreIndicators {
            funding_rate: snapshot.funding_rate,
            surge_ratio: observation.surge_ratio,
            oi_change_pct: observation.change_pct,
            current_oi: snapshot.open_interest,
            price: snapshot.price,
            volume_24h: snapshot.volume_24h,
        },
        enhanced: EnhancedIndicators {
            taker_ratio: snapshot.taker_ratio,
            global_long_short: snapshot.global_long_short,
            top_trader_long_short: snapshot.top_trader_long_short,
        },
        score_breakdown: card.breakdown(),
        timestamp: now,
    }
}

/// Symbols strictly below the funding threshold, most negative first, capped
/// at `max_symbols_per_cycle`.
fn select_candidates(funding: &[FundingEntry], config: &RuntimeConfig) -> Vec<FundingEntry> {
    let mut candidates: Vec<FundingEntry> = funding
        .iter()
        .filter(|f| f.funding_rate < config.funding_threshold)
        .cloned()
        .collect();
    candidates.sort_by(|a, b| a.funding_rate.total_cmp(&b.funding_rate));
    candidates.truncate(config.max_symbols_per_cycle);
    candidates
}

// =============================================================================
// Tests
// =============================================================================
