// =============================================================================
// Taker Buy/Sell Ratio — Aggressor flow over the enrichment period
// =============================================================================
//
//   buySellRatio > 1  =>  market buys dominate (shorts being lifted)

use tracing::debug;

use crate::binance::client::{as_array, field_f64, BinanceFuturesClient};
use crate::error::ScanResult;

const TAKER_PATH: &str = "/futures/data/takerlongshortRatio";
const TAKER_WEIGHT: u32 = 1;

#[derive(Debug, Clone)]
pub struct TakerRatioMonitor {
    client: BinanceFuturesClient,
}

impl TakerRatioMonitor {
    pub fn new(client: BinanceFuturesClient) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, symbol: &str, period: &str) -> ScanResult<Option<f64>> {
        let query = [
            ("symbol", symbol.to_string()),
            ("period", period.to_string()),
            ("limit", "1".to_string()),
        ];
        let body = self.client.get_json(TAKER_PATH, &query, TAKER_WEIGHT).await?;
        let ratio = parse_taker_ratio(&body, symbol)?;
        debug!(symbol, taker_ratio = ?ratio, "taker buy/sell ratio fetched");
        Ok(ratio)
    }
}

/// Latest `buySellRatio` by timestamp; an empty array means no data.
pub fn parse_taker_ratio(body: &serde_json::Value, symbol: &str) -> ScanResult<Option<f64>> {
    let rows = as_array(body, symbol)?;
    let Some(latest) = rows
        .iter()
        .max_by_key(|row| row["timestamp"].as_i64().unwrap_or(0))
    else {
        return Ok(None);
    };
    field_f64(latest, symbol, "buySellRatio").map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn picks_latest_row() {
        let body = json!([
            {"buySellRatio": "1.5586", "buyVol": "387.3300", "sellVol": "248.5030", "timestamp": 1585614900000i64},
            {"buySellRatio": "0.9000", "buyVol": "90", "sellVol": "100", "timestamp": 1585614600000i64}
        ]);
        assert_eq!(parse_taker_ratio(&body, "AAAUSDT").unwrap(), Some(1.5586));
    }

    #[test]
    fn empty_is_absent() {
        assert_eq!(parse_taker_ratio(&json!([]), "AAAUSDT").unwrap(), None);
    }
}
