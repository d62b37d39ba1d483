// =============================================================================
// Rate-Limit Tracker — monitors Binance Futures request weight
// =============================================================================
//
// USDⓈ-M futures allow 2400 request weight per minute per IP.  The scanner
// polls many symbols per cycle, so we hard-cap ourselves well below that.
//
// The tracker reads the `X-MBX-USED-WEIGHT-1M` response header after every
// request and keeps an atomic counter that any task may query lock-free.
// =============================================================================

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Weight at which requests are refused until the window rolls over.
const WEIGHT_HARD_LIMIT: u32 = 2000;
/// Soft warning threshold.
const WEIGHT_WARN_THRESHOLD: u32 = 1600;
/// The weight counter describes a rolling one-minute window.
const WEIGHT_WINDOW_SECS: i64 = 60;

pub struct RateLimitTracker {
    used_weight_1m: AtomicU32,
    /// UNIX seconds of the last header update.
    weight_updated_at: AtomicI64,
    throttled_responses: AtomicU64,
}

/// Serialisable snapshot of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub used_weight_1m: u32,
    pub throttled_responses: u64,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self {
            used_weight_1m: AtomicU32::new(0),
            weight_updated_at: AtomicI64::new(0),
            throttled_responses: AtomicU64::new(0),
        }
    }

    /// Update counters from the response headers returned by Binance.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        let Some(w) = headers
            .get("X-MBX-USED-WEIGHT-1M")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            return;
        };

        let prev = self.used_weight_1m.swap(w, Ordering::Relaxed);
        self.weight_updated_at
            .store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
        if w >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
            warn!(
                used_weight = w,
                hard_limit = WEIGHT_HARD_LIMIT,
                "rate-limit weight crossed warning threshold"
            );
        }
        debug!(used_weight_1m = w, "rate-limit weight updated from header");
    }

    /// Count a 429/418 answer.
    pub fn record_throttled(&self) {
        self.throttled_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Return `true` if `weight` more fits under the hard limit.
    pub fn can_send_request(&self, weight: u32) -> bool {
        self.can_send_request_at(weight, chrono::Utc::now().timestamp())
    }

    /// A reading older than the weight window no longer blocks anything.
    fn can_send_request_at(&self, weight: u32, now_secs: i64) -> bool {
        let updated_at = self.weight_updated_at.load(Ordering::Relaxed);
        if now_secs - updated_at >= WEIGHT_WINDOW_SECS {
            return true;
        }
        let current = self.used_weight_1m.load(Ordering::Relaxed);
        let allowed = current + weight <= WEIGHT_HARD_LIMIT;
        if !allowed {
            warn!(
                current_weight = current,
                requested_weight = weight,
                hard_limit = WEIGHT_HARD_LIMIT,
                "request blocked — would exceed rate-limit"
            );
        }
        allowed
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            used_weight_1m: self.used_weight_1m.load(Ordering::Relaxed),
            throttled_responses: self.throttled_responses.load(Ordering::Relaxed),
        }
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitTracker")
            .field("used_weight_1m", &self.used_weight_1m.load(Ordering::Relaxed))
            .field(
                "throttled_responses",
                &self.throttled_responses.load(Ordering::Relaxed),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn header_updates_weight() {
        let t = RateLimitTracker::new();
        let mut h = HeaderMap::new();
        h.insert("x-mbx-used-weight-1m", HeaderValue::from_static("42"));
        t.update_from_headers(&h);
        assert_eq!(t.snapshot().used_weight_1m, 42);
    }

    #[test]
    fn garbage_header_is_ignored() {
        let t = RateLimitTracker::new();
        let mut h = HeaderMap::new();
        h.insert("x-mbx-used-weight-1m", HeaderValue::from_static("lots"));
        t.update_from_headers(&h);
        assert_eq!(t.snapshot().used_weight_1m, 0);
    }

    #[test]
    fn hard_limit_blocks() {
        let t = RateLimitTracker::new();
        let mut h = HeaderMap::new();
        h.insert("x-mbx-used-weight-1m", HeaderValue::from_static("1995"));
        t.update_from_headers(&h);
        assert!(t.can_send_request(5));
        assert!(!t.can_send_request(6));
        let later = chrono::Utc::now().timestamp() + WEIGHT_WINDOW_SECS + 1;
        assert!(t.can_send_request_at(6, later));
    }
}
