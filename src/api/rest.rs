// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/` and only read engine state; nothing
// here can change what the scanner does.
//
// CORS is permissive so a local dashboard can poll the API directly.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::EngineState;
use crate::performance::PerformanceStats;
use crate::phase_tracker::TrackingEntry;
use crate::types::Phase;

const DEFAULT_SIGNAL_LIMIT: usize = 50;
const MAX_SIGNAL_LIMIT: usize = 500;

// =============================================================================
// Router construction
// =============================================================================

pub fn router(state: Arc<EngineState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/tracking", get(tracking))
        .route("/api/v1/signals", get(signals))
        .route("/api/v1/stats", get(stats))
        .route("/api/v1/config", get(config))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(state): State<Arc<EngineState>>) -> impl IntoResponse {
    Json(state.health())
}

// =============================================================================
// Tracking
// =============================================================================

#[derive(Serialize)]
struct TrackingView {
    symbol: String,
    phase: Phase,
    start_time: chrono::DateTime<chrono::Utc>,
    last_check_time: chrono::DateTime<chrono::Utc>,
    check_count: u32,
    alert_count: u32,
    originating_score: u32,
    entry_price: f64,
}

impl From<TrackingEntry> for TrackingView {
    fn from(e: TrackingEntry) -> Self {
        Self {
            symbol: e.symbol,
            phase: e.phase,
            start_time: e.start_time,
            last_check_time: e.last_check_time,
            check_count: e.check_count,
            alert_count: e.alert_count,
            originating_score: e.originating_signal.score,
            entry_price: e.originating_signal.core.price,
        }
    }
}

async fn tracking(State(state): State<Arc<EngineState>>) -> impl IntoResponse {
    let entries: Vec<TrackingView> = state
        .tracking_entries()
        .into_iter()
        .map(TrackingView::from)
        .collect();
    Json(entries)
}

// =============================================================================
// Signals
// =============================================================================

#[derive(Debug, Deserialize)]
struct SignalsQuery {
    limit: Option<usize>,
}

async fn signals(
    State(state): State<Arc<EngineState>>,
    Query(query): Query<SignalsQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_SIGNAL_LIMIT)
        .min(MAX_SIGNAL_LIMIT);
    Json(state.recent_signals(limit))
}

// =============================================================================
// Stats
// =============================================================================

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    stats: PerformanceStats,
    open_outcomes: usize,
}

async fn stats(State(state): State<Arc<EngineState>>) -> impl IntoResponse {
    let stats = state.stats();
    let open_outcomes = state.performance.lock().open_count();
    Json(StatsResponse {
        stats,
        open_outcomes,
    })
}

// =============================================================================
// Config
// =============================================================================

async fn config(State(state): State<Arc<EngineState>>) -> impl IntoResponse {
    let config = state.config.read().clone();
    Json(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::RuntimeConfig;
    use crate::types::{CoreIndicators, EnhancedIndicators, Signal};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::collections::BTreeMap;
    use tower::ServiceExt;

    fn signal(symbol: &str, score: u32) -> Signal {
        Signal {
            id: uuid::Uuid::new_v4(),
            symbol: symbol.to_string(),
            score,
            core: CoreIndicators {
                funding_rate: -0.002,
                surge_ratio: 2.5,
                oi_change_pct: 5.0,
                current_oi: 1000.0,
                price: 2.0,
                volume_24h: 20_000_000.0,
            },
            enhanced: EnhancedIndicators::default(),
            score_breakdown: BTreeMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    async fn get_json(state: Arc<EngineState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn state() -> Arc<EngineState> {
        Arc::new(EngineState::new(RuntimeConfig::default(), "standard"))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = get_json(state(), "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["preset"], "standard");
        assert!(body["last_cycle"].is_null());
    }

    #[tokio::test]
    async fn signals_respect_limit_newest_first() {
        let s = state();
        s.push_signal(signal("AAAUSDT", 40));
        s.push_signal(signal("BBBUSDT", 55));
        s.push_signal(signal("CCCUSDT", 70));

        let (_, body) = get_json(s, "/api/v1/signals?limit=2").await;
        let arr = body.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["symbol"], "CCCUSDT");
        assert_eq!(arr[1]["symbol"], "BBBUSDT");
    }

    #[tokio::test]
    async fn tracking_lists_registered_symbols() {
        let s = state();
        let sig = signal("AAAUSDT", 70);
        s.tracker.lock().register(&sig, chrono::Utc::now());

        let (_, body) = get_json(s, "/api/v1/tracking").await;
        assert_eq!(body[0]["symbol"], "AAAUSDT");
        assert_eq!(body[0]["phase"], "PHASE_1_2");
        assert_eq!(body[0]["originating_score"], 70);
    }

    #[tokio::test]
    async fn stats_and_config_are_served() {
        let s = state();
        s.push_signal(signal("AAAUSDT", 70));

        let (_, stats) = get_json(s.clone(), "/api/v1/stats").await;
        assert_eq!(stats["total"], 1);
        assert_eq!(stats["open_outcomes"], 1);

        let (_, config) = get_json(s, "/api/v1/config").await;
        assert_eq!(config["long_window"], 10);
        assert_eq!(config["short_window"], 3);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let resp = router(state())
            .oneshot(Request::builder().uri("/api/v1/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
