// =============================================================================
// 24h Ticker — Price and liquidity for the volume filter
// =============================================================================

use tracing::debug;

use crate::binance::client::{field_f64, BinanceFuturesClient};
use crate::error::ScanResult;
use crate::types::Ticker;

const TICKER_PATH: &str = "/fapi/v1/ticker/24hr";
const TICKER_WEIGHT: u32 = 1;

#[derive(Debug, Clone)]
pub struct TickerMonitor {
    client: BinanceFuturesClient,
}

impl TickerMonitor {
    pub fn new(client: BinanceFuturesClient) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, symbol: &str) -> ScanResult<Ticker> {
        let body = self
            .client
            .get_json(TICKER_PATH, &[("symbol", symbol.to_string())], TICKER_WEIGHT)
            .await?;
        let ticker = parse_ticker(&body, symbol)?;
        debug!(
            symbol,
            price = ticker.price,
            quote_volume = format!("{:.0}", ticker.quote_volume),
            "ticker fetched"
        );
        Ok(ticker)
    }
}

pub fn parse_ticker(body: &serde_json::Value, symbol: &str) -> ScanResult<Ticker> {
    Ok(Ticker {
        price: field_f64(body, symbol, "lastPrice")?,
        quote_volume: field_f64(body, symbol, "quoteVolume")?,
        high: field_f64(body, symbol, "highPrice")?,
        low: field_f64(body, symbol, "lowPrice")?,
        change_pct: field_f64(body, symbol, "priceChangePercent")?,
    })
}
