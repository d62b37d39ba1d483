// =============================================================================
// Binance Futures REST Client — Public USDⓈ-M market-data endpoints
// =============================================================================
//
// Only unsigned market-data endpoints are used, so no API key is required.
// Every request carries the client-wide timeout; an expired timeout surfaces
// as a transient failure for the symbol being fetched.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, instrument, warn};

use crate::binance::rate_limit::RateLimitTracker;
use crate::error::{ScanError, ScanResult};

pub const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";

/// Binance USDⓈ-M futures market-data client.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    base_url: String,
    client: reqwest::Client,
    rate_limit: Arc<RateLimitTracker>,
}

impl BinanceFuturesClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ScanResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScanError::StartupFatal(format!("failed to build HTTP client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, timeout_secs = timeout.as_secs(), "BinanceFuturesClient initialised");

        Ok(Self {
            base_url,
            client,
            rate_limit: Arc::new(RateLimitTracker::new()),
        })
    }

    pub fn rate_limit(&self) -> &RateLimitTracker {
        &self.rate_limit
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// GET `path` with `query` and decode the JSON body.
    ///
    /// Throttling (429/418), server errors and network failures are transient;
    /// any other non-success status or an undecodable body is a format error.
    #[instrument(skip(self, query), name = "binance::get_json")]
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
        weight: u32,
    ) -> ScanResult<serde_json::Value> {
        if !self.rate_limit.can_send_request(weight) {
            return Err(ScanError::transient(path, "local rate-limit budget exhausted"));
        }

        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| ScanError::from_reqwest(path, e))?;

        self.rate_limit.update_from_headers(resp.headers());
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            self.rate_limit.record_throttled();
            warn!(path, %status, "throttled by exchange");
            return Err(ScanError::transient(path, format!("HTTP {status}")));
        }
        if status.is_server_error() {
            return Err(ScanError::transient(path, format!("HTTP {status}")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ScanError::from_reqwest(path, e))?;

        if !status.is_success() {
            return Err(ScanError::format(path, format!("HTTP {status}: {body}")));
        }

        Ok(body)
    }

    /// Connectivity check used before entering the scan loop.
    pub async fn ping(&self) -> ScanResult<()> {
        self.get_json("/fapi/v1/ping", &[], 1).await.map(|_| ())
    }
}

impl std::fmt::Debug for BinanceFuturesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceFuturesClient")
            .field("base_url", &self.base_url)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Field helpers
// -----------------------------------------------------------------------------

/// Binance encodes most decimals as strings; accept either form.
pub fn parse_str_f64(val: &serde_json::Value, context: &str, field: &str) -> ScanResult<f64> {
    let parsed = match val {
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| ScanError::format(context, format!("field '{field}' is not a number: {val}")))
}

/// Required numeric field of a JSON object.
pub fn field_f64(obj: &serde_json::Value, context: &str, field: &str) -> ScanResult<f64> {
    parse_str_f64(&obj[field], context, field)
}

/// Body must be a JSON array.
pub fn as_array<'a>(
    body: &'a serde_json::Value,
    context: &str,
) -> ScanResult<&'a Vec<serde_json::Value>> {
    body.as_array()
        .ok_or_else(|| ScanError::format(context, "response is not an array"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_and_number_decimals() {
        assert_eq!(parse_str_f64(&json!("-0.00123"), "t", "x").unwrap(), -0.00123);
        assert_eq!(parse_str_f64(&json!(42.5), "t", "x").unwrap(), 42.5);
    }

    #[test]
    fn rejects_missing_and_garbage_fields() {
        let obj = json!({ "a": "abc", "b": null });
        assert!(field_f64(&obj, "t", "a").is_err());
        assert!(field_f64(&obj, "t", "b").is_err());
        let err = field_f64(&obj, "t", "missing").unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn as_array_rejects_objects() {
        assert!(as_array(&json!({ "code": -1121 }), "t").is_err());
        assert_eq!(as_array(&json!([1, 2]), "t").unwrap().len(), 2);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let c = BinanceFuturesClient::new("https://example.test/", Duration::from_secs(1)).unwrap();
        assert!(format!("{c:?}").contains("\"https://example.test\""));
    }
}
