// =============================================================================
// Open Interest Fetcher — Current outstanding contracts for one symbol
// =============================================================================
//
// Stateless: the window history that turns single snapshots into a surge
// ratio lives in `signals::oi_window`.

use tracing::debug;

use crate::binance::client::{field_f64, BinanceFuturesClient};
use crate::error::{ScanError, ScanResult};

const OPEN_INTEREST_PATH: &str = "/fapi/v1/openInterest";
const OPEN_INTEREST_WEIGHT: u32 = 1;

#[derive(Debug, Clone)]
pub struct OpenInterestFetcher {
    client: BinanceFuturesClient,
}

impl OpenInterestFetcher {
    pub fn new(client: BinanceFuturesClient) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, symbol: &str) -> ScanResult<f64> {
        let body = self
            .client
            .get_json(
                OPEN_INTEREST_PATH,
                &[("symbol", symbol.to_string())],
                OPEN_INTEREST_WEIGHT,
            )
            .await?;
        let oi = parse_open_interest(&body, symbol)?;
        debug!(symbol, open_interest = oi, "open interest fetched");
        Ok(oi)
    }
}

pub fn parse_open_interest(body: &serde_json::Value, symbol: &str) -> ScanResult<f64> {
    let oi = field_f64(body, symbol, "openInterest")?;
    if oi < 0.0 {
        return Err(ScanError::format(symbol, format!("negative open interest {oi}")));
    }
    Ok(oi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_open_interest() {
        let body = json!({"openInterest": "10659.509", "symbol": "AAAUSDT", "time": 1589437530011i64});
        assert_eq!(parse_open_interest(&body, "AAAUSDT").unwrap(), 10659.509);
    }

    #[test]
    fn rejects_missing_or_negative() {
        assert!(parse_open_interest(&json!({"symbol": "AAAUSDT"}), "AAAUSDT").is_err());
        assert!(parse_open_interest(&json!({"openInterest": "-1"}), "AAAUSDT").is_err());
    }
}
