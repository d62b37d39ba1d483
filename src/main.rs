// =============================================================================
// Squeeze Radar — Main Entry Point
// =============================================================================
//
// Polls Binance USDⓈ-M futures on a fixed interval for short-squeeze setups:
// deeply negative funding combined with an open-interest surge.  Alerts go
// out through every configured notification channel.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod binance;
mod error;
mod futures_intel;
mod notify;
mod performance;
mod phase_tracker;
mod runtime_config;
mod scanner;
mod signals;
mod store;
mod types;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::EngineState;
use crate::binance::client::DEFAULT_BASE_URL;
use crate::binance::BinanceFuturesClient;
use crate::futures_intel::BinanceFuturesProvider;
use crate::notify::{format, FanoutSink};
use crate::runtime_config::{Preset, RuntimeConfig};
use crate::scanner::ScanOrchestrator;
use crate::store::JsonFileStore;

const DEFAULT_CONFIG_PATH: &str = "squeeze_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Squeeze Radar starting up");

    let preset = match std::env::var("SQUEEZE_PRESET") {
        Ok(name) => name.parse::<Preset>().context("invalid SQUEEZE_PRESET")?,
        Err(_) => Preset::Standard,
    };
    let config_path =
        std::env::var("SQUEEZE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = if Path::new(&config_path).exists() {
        RuntimeConfig::load(&config_path)?
    } else {
        warn!(path = %config_path, preset = %preset, "config file not found, using preset");
        let config = RuntimeConfig::preset(preset);
        if let Err(e) = config.save(&config_path) {
            warn!(path = %config_path, error = %e, "could not write preset config");
        }
        config
    };
    config.validate().context("invalid configuration")?;

    info!(
        preset = %preset,
        funding_threshold = config.funding_threshold,
        oi_surge_ratio = config.oi_surge_ratio,
        short_window = config.short_window,
        long_window = config.long_window,
        scan_interval_secs = config.scan_interval_secs,
        "configuration ready"
    );

    // ── 2. Collaborators ─────────────────────────────────────────────────
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let client = BinanceFuturesClient::new(DEFAULT_BASE_URL, timeout)?;
    let provider = Arc::new(BinanceFuturesProvider::new(client));
    let store = Arc::new(
        JsonFileStore::open(&config.data_dir).context("failed to open data directory")?,
    );
    info!(dir = %store.dir().display(), "data directory ready");
    let sink = Arc::new(FanoutSink::from_env(timeout));
    info!(channels = sink.len(), "notification channels configured");

    let scan_interval = Duration::from_secs(config.scan_interval_secs);
    let api_bind_addr = config.api_bind_addr.clone();
    let state = Arc::new(EngineState::new(config, preset.to_string()));
    let scanner = ScanOrchestrator::new(state.clone(), provider.clone(), sink, store);

    // ── 3. Startup checks & restore ──────────────────────────────────────
    if let Err(e) = scanner.check_provider().await {
        error!(error = %e, "aborting startup");
        return Err(e.into());
    }
    let restored = scanner.restore();

    let now = Utc::now();
    {
        let config = state.config.read().clone();
        let notice = format::startup(&config, &state.preset, restored.oi_symbols, now);
        scanner.notify(&notice).await;
    }
    scanner.report_stats(now).await;

    // ── 4. Status API ────────────────────────────────────────────────────
    if let Some(addr) = api_bind_addr {
        let api_state = state.clone();
        tokio::spawn(async move {
            let app = api::rest::router(api_state);
            let listener = match tokio::net::TcpListener::bind(&addr).await {
                Ok(l) => l,
                Err(e) => {
                    error!(addr = %addr, error = %e, "failed to bind status API");
                    return;
                }
            };
            info!(addr = %addr, "status API listening");
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "status API stopped");
            }
        });
    }

    // ── 5. Scan loop ─────────────────────────────────────────────────────
    let mut interval = tokio::time::interval(scan_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("scan loop running. Press Ctrl+C to stop.");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                scanner.run_cycle(Utc::now()).await;
                let usage = provider.client().rate_limit().snapshot();
                debug!(
                    used_weight_1m = usage.used_weight_1m,
                    throttled_responses = usage.throttled_responses,
                    "rate-limit usage"
                );
            }
            res = &mut shutdown => {
                if let Err(e) = res {
                    error!(error = %e, "failed to listen for shutdown signal");
                }
                warn!("shutdown signal received, stopping");
                break;
            }
        }
    }

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    let now = Utc::now();
    let failures = scanner.flush(now);
    if failures > 0 {
        error!(failures, "state not fully persisted on shutdown");
    }
    let notice = format::shutdown(state.tracker.lock().len(), state.signal_count(), now);
    scanner.notify(&notice).await;

    info!("Squeeze Radar shut down complete.");
    Ok(())
}
