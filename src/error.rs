// =============================================================================
// Scan Errors — Typed failure taxonomy for the detection pipeline
// =============================================================================
//
// Every failure that can reach the scan loop is one of four kinds:
//
//   TransientFetch  => timeout, rate limit, connection drop (skip symbol, retry
//                      naturally next cycle)
//   DataFormat      => provider answered with an unexpected shape (skip entry)
//   Persistence     => durable write/read failed (log, keep in-memory state)
//   StartupFatal    => primary provider unreachable at boot (abort)
//
// Only StartupFatal is allowed to stop the engine.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("transient fetch failure ({context}): {reason}")]
    TransientFetch { context: String, reason: String },

    #[error("unexpected data format ({context}): {reason}")]
    DataFormat { context: String, reason: String },

    #[error("persistence failure ({context}): {reason}")]
    Persistence { context: String, reason: String },

    #[error("startup aborted: {0}")]
    StartupFatal(String),
}

pub type ScanResult<T> = std::result::Result<T, ScanError>;

impl ScanError {
    pub fn transient(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::TransientFetch {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    pub fn format(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::DataFormat {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    pub fn persistence(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::Persistence {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    /// Classify a `reqwest` failure. Anything that is not a body decode
    /// problem is treated as transient.
    pub fn from_reqwest(context: impl Into<String>, err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::format(context, err)
        } else {
            Self::transient(context, err)
        }
    }

    /// True when the failure should simply be retried on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFetch { .. })
    }

    /// Short machine-readable label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientFetch { .. } => "transient_fetch",
            Self::DataFormat { .. } => "data_format",
            Self::Persistence { .. } => "persistence",
            Self::StartupFatal(_) => "startup_fatal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_transient() {
        let e = ScanError::transient("GET /fapi/v1/openInterest", "timed out");
        assert!(e.is_transient());
        assert_eq!(e.kind(), "transient_fetch");
    }

    #[test]
    fn format_is_not_transient() {
        let e = ScanError::format("premiumIndex", "missing field 'symbol'");
        assert!(!e.is_transient());
        assert!(e.to_string().contains("premiumIndex"));
    }

    #[test]
    fn startup_fatal_message() {
        let e = ScanError::StartupFatal("ping failed".into());
        assert_eq!(e.to_string(), "startup aborted: ping failed");
    }
}
