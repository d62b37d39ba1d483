// =============================================================================
// Futures Intelligence Module
// =============================================================================
//
// Everything the scanner needs to know about a symbol comes through the
// `MarketDataProvider` seam:
//
//   1. Funding rates    — candidate discovery (all symbols, one call)
//   2. Open interest    — feeds the surge window
//   3. 24h ticker       — price and liquidity filter
//   4. Long/short ratio — crowd and top-trader positioning (enrichment)
//   5. Taker ratio      — aggressor flow (enrichment)
//
// `BinanceFuturesProvider` is the production implementation; tests plug in
// recorded fixtures instead.

pub mod funding_rate;
pub mod long_short_ratio;
pub mod open_interest;
pub mod taker_ratio;
pub mod ticker;

pub use funding_rate::FundingRateMonitor;
pub use long_short_ratio::LongShortMonitor;
pub use open_interest::OpenInterestFetcher;
pub use taker_ratio::TakerRatioMonitor;
pub use ticker::TickerMonitor;

use async_trait::async_trait;

use crate::binance::BinanceFuturesClient;
use crate::error::ScanResult;
use crate::types::{FundingEntry, LongShortKind, LongShortReading, Ticker};

/// Source of futures market data.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Cheap reachability probe, used once at startup.
    async fn ping(&self) -> ScanResult<()>;

    /// Funding rate of every tradable symbol; filtering is left to the caller.
    async fn fetch_funding_rates(&self) -> ScanResult<Vec<FundingEntry>>;

    async fn fetch_open_interest(&self, symbol: &str) -> ScanResult<f64>;

    async fn fetch_ticker(&self, symbol: &str) -> ScanResult<Ticker>;

    async fn fetch_long_short_ratio(
        &self,
        symbol: &str,
        kind: LongShortKind,
        period: &str,
        limit: usize,
    ) -> ScanResult<Option<LongShortReading>>;

    async fn fetch_taker_buy_sell_ratio(&self, symbol: &str, period: &str)
        -> ScanResult<Option<f64>>;
}

/// Binance USDⓈ-M public market data.
#[derive(Debug, Clone)]
pub struct BinanceFuturesProvider {
    client: BinanceFuturesClient,
    funding: FundingRateMonitor,
    open_interest: OpenInterestFetcher,
    ticker: TickerMonitor,
    long_short: LongShortMonitor,
    taker: TakerRatioMonitor,
}

impl BinanceFuturesProvider {
    pub fn new(client: BinanceFuturesClient) -> Self {
        Self {
            funding: FundingRateMonitor::new(client.clone()),
            open_interest: OpenInterestFetcher::new(client.clone()),
            ticker: TickerMonitor::new(client.clone()),
            long_short: LongShortMonitor::new(client.clone()),
            taker: TakerRatioMonitor::new(client.clone()),
            client,
        }
    }

    pub fn client(&self) -> &BinanceFuturesClient {
        &self.client
    }
}

#[async_trait]
impl MarketDataProvider for BinanceFuturesProvider {
    async fn ping(&self) -> ScanResult<()> {
        self.client.ping().await
    }

    async fn fetch_funding_rates(&self) -> ScanResult<Vec<FundingEntry>> {
        self.funding.fetch_all().await
    }

    async fn fetch_open_interest(&self, symbol: &str) -> ScanResult<f64> {
        self.open_interest.fetch(symbol).await
    }

    async fn fetch_ticker(&self, symbol: &str) -> ScanResult<Ticker> {
        self.ticker.fetch(symbol).await
    }

    async fn fetch_long_short_ratio(
        &self,
        symbol: &str,
        kind: LongShortKind,
        period: &str,
        limit: usize,
    ) -> ScanResult<Option<LongShortReading>> {
        self.long_short.fetch(symbol, kind, period, limit).await
    }

    async fn fetch_taker_buy_sell_ratio(
        &self,
        symbol: &str,
        period: &str,
    ) -> ScanResult<Option<f64>> {
        self.taker.fetch(symbol, period).await
    }
}
