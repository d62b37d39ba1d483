// =============================================================================
// Long/Short Ratio Monitor — Crowd and top-trader positioning
// =============================================================================
//
// Two populations are read from the same response shape:
//
//   global     => /futures/data/globalLongShortAccountRatio
//   top trader => /futures/data/topLongShortAccountRatio
//
// A short window of samples is fetched so the trend (earliest vs latest
// ratio) can be read alongside the latest long/short account shares.

use tracing::debug;

use crate::binance::client::{as_array, field_f64, BinanceFuturesClient};
use crate::error::ScanResult;
use crate::types::{LongShortKind, LongShortReading, Trend};

const GLOBAL_PATH: &str = "/futures/data/globalLongShortAccountRatio";
const TOP_TRADER_PATH: &str = "/futures/data/topLongShortAccountRatio";
const LONG_SHORT_WEIGHT: u32 = 1;

fn path_for(kind: LongShortKind) -> &'static str {
    match kind {
        LongShortKind::Global => GLOBAL_PATH,
        LongShortKind::TopTrader => TOP_TRADER_PATH,
    }
}

#[derive(Debug, Clone)]
pub struct LongShortMonitor {
    client: BinanceFuturesClient,
}

impl LongShortMonitor {
    pub fn new(client: BinanceFuturesClient) -> Self {
        Self { client }
    }

    /// `Ok(None)` when the exchange has no data for `symbol` yet.
    pub async fn fetch(
        &self,
        symbol: &str,
        kind: LongShortKind,
        period: &str,
        limit: usize,
    ) -> ScanResult<Option<LongShortReading>> {
        let query = [
            ("symbol", symbol.to_string()),
            ("period", period.to_string()),
            ("limit", limit.max(1).to_string()),
        ];
        let body = self
            .client
            .get_json(path_for(kind), &query, LONG_SHORT_WEIGHT)
            .await?;
        let reading = parse_long_short(&body, symbol)?;

        if let Some(r) = &reading {
            debug!(
                symbol,
                kind = %kind,
                ratio = format!("{:.3}", r.ratio),
                short_pct = format!("{:.1}", r.short_pct),
                trend = %r.trend,
                "long/short ratio fetched"
            );
        }
        Ok(reading)
    }
}

/// Parse a long/short history array into a reading. Rows are ordered by
/// `timestamp` before the trend is taken; a single sample reads as flat.
pub fn parse_long_short(
    body: &serde_json::Value,
    symbol: &str,
) -> ScanResult<Option<LongShortReading>> {
    let rows = as_array(body, symbol)?;
    if rows.is_empty() {
        return Ok(None);
    }

    let mut parsed = Vec::with_capacity(rows.len());
    for row in rows {
        let ratio = field_f64(row, symbol, "longShortRatio")?;
        let long_account = field_f64(row, symbol, "longAccount")?;
        let short_account = field_f64(row, symbol, "shortAccount")?;
        let ts = row["timestamp"].as_i64().unwrap_or(0);
        parsed.push((ts, ratio, long_account, short_account));
    }
    parsed.sort_by_key(|(ts, ..)| *ts);

    let samples: Vec<f64> = parsed.iter().map(|(_, ratio, ..)| *ratio).collect();
    let (_, ratio, long_account, short_account) = parsed[parsed.len() - 1];
    let trend = Trend::from_endpoints(&samples).unwrap_or(Trend::Flat);

    Ok(Some(LongShortReading {
        ratio,
        long_pct: long_account * 100.0,
        short_pct: short_account * 100.0,
        trend,
        samples,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(ts: i64, ratio: &str, long: &str, short: &str) -> serde_json::Value {
        json!({
            "symbol": "AAAUSDT",
            "longShortRatio": ratio,
            "longAccount": long,
            "shortAccount": short,
            "timestamp": ts
        })
    }

    #[test]
    fn declining_trend_from_unordered_rows() {
        let body = json!([
            row(3, "0.6667", "0.4000", "0.6000"),
            row(1, "1.0000", "0.5000", "0.5000"),
            row(2, "0.8182", "0.4500", "0.5500"),
        ]);
        let r = parse_long_short(&body, "AAAUSDT").unwrap().unwrap();
        assert_eq!(r.samples, vec![1.0, 0.8182, 0.6667]);
        assert_eq!(r.trend, Trend::Declining);
        assert_eq!(r.ratio, 0.6667);
        assert!((r.short_pct - 60.0).abs() < 1e-9);
        assert!((r.long_pct - 40.0).abs() < 1e-9);
    }

    #[test]
    fn single_sample_is_flat() {
        let body = json!([row(1, "1.2", "0.5455", "0.4545")]);
        let r = parse_long_short(&body, "AAAUSDT").unwrap().unwrap();
        assert_eq!(r.trend, Trend::Flat);
    }

    #[test]
    fn empty_history_is_absent() {
        assert!(parse_long_short(&json!([]), "AAAUSDT").unwrap().is_none());
    }

    #[test]
    fn missing_field_is_format_error() {
        let body = json!([{"longShortRatio": "1.0", "timestamp": 1}]);
        assert!(parse_long_short(&body, "AAAUSDT").is_err());
    }
}
