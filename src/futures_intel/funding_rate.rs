// =============================================================================
// Funding Rate Monitor — Candidate discovery from the premium index
// =============================================================================
//
// `/fapi/v1/premiumIndex` without a symbol returns every perpetual in one
// call, which makes it the cheapest way to discover squeeze candidates:
//
//   lastFundingRate <= threshold  =>  shorts are paying longs heavily
//
// Filtering against the threshold happens in the scanner; this module only
// fetches and parses.

use tracing::{debug, warn};

use crate::binance::client::{as_array, field_f64, BinanceFuturesClient};
use crate::error::ScanResult;
use crate::types::FundingEntry;

const PREMIUM_INDEX_PATH: &str = "/fapi/v1/premiumIndex";
const PREMIUM_INDEX_WEIGHT: u32 = 10;

/// Fetches funding rates for every USDT-margined perpetual.
#[derive(Debug, Clone)]
pub struct FundingRateMonitor {
    client: BinanceFuturesClient,
}

impl FundingRateMonitor {
    pub fn new(client: BinanceFuturesClient) -> Self {
        Self { client }
    }

    pub async fn fetch_all(&self) -> ScanResult<Vec<FundingEntry>> {
        let body = self
            .client
            .get_json(PREMIUM_INDEX_PATH, &[], PREMIUM_INDEX_WEIGHT)
            .await?;
        let entries = parse_premium_index(&body)?;
        debug!(count = entries.len(), "funding rates fetched");
        Ok(entries)
    }
}

/// Parse the premium-index array. Non-USDT symbols are dropped; a malformed
/// row is skipped with a warning rather than failing the whole batch.
pub fn parse_premium_index(body: &serde_json::Value) -> ScanResult<Vec<FundingEntry>> {
    let rows = as_array(body, PREMIUM_INDEX_PATH)?;
    let mut entries = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(symbol) = row["symbol"].as_str() else {
            warn!("premiumIndex row without symbol skipped");
            continue;
        };
        if !symbol.ends_with("USDT") {
            continue;
        }

        let parsed = field_f64(row, symbol, "lastFundingRate")
            .and_then(|rate| Ok((rate, field_f64(row, symbol, "markPrice")?)));
        match parsed {
            Ok((funding_rate, mark_price)) => entries.push(FundingEntry {
                symbol: symbol.to_string(),
                funding_rate,
                mark_price,
                next_funding_time: row["nextFundingTime"].as_i64().unwrap_or(0),
            }),
            Err(e) => warn!(symbol, error = %e, "premiumIndex row skipped"),
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_usdt_rows_only() {
        let body = json!([
            {"symbol": "AAAUSDT", "markPrice": "1.2500", "lastFundingRate": "-0.00300000", "nextFundingTime": 1767456000000i64},
            {"symbol": "BBBUSDC", "markPrice": "3.0", "lastFundingRate": "-0.01", "nextFundingTime": 0},
            {"symbol": "CCCUSDT", "markPrice": "0.5", "lastFundingRate": "0.00010000", "nextFundingTime": 0}
        ]);
        let entries = parse_premium_index(&body).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].symbol, "AAAUSDT");
        assert_eq!(entries[0].funding_rate, -0.003);
        assert_eq!(entries[0].mark_price, 1.25);
        assert_eq!(entries[0].next_funding_time, 1767456000000);
    }

    #[test]
    fn malformed_row_is_skipped_not_fatal() {
        let body = json!([
            {"symbol": "AAAUSDT", "markPrice": "1.0", "lastFundingRate": ""},
            {"symbol": "BBBUSDT", "markPrice": "2.0", "lastFundingRate": "-0.002"},
            {"markPrice": "2.0"}
        ]);
        let entries = parse_premium_index(&body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].symbol, "BBBUSDT");
    }

    #[test]
    fn non_array_body_is_format_error() {
        let err = parse_premium_index(&json!({"code": -1000})).unwrap_err();
        assert_eq!(err.kind(), "data_format");
    }
}
