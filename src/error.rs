//! Error types for the vocabulary agent
//!
//! Provides structured error types for the cache, the request dispatcher,
//! the score ledger and the monitoring daemon.

use thiserror::Error;

/// Unified error type for the agent
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Network Errors
    // =========================================================================
    #[error("Network request failed for {url}: {reason}")]
    TransientNetwork { url: String, reason: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    // =========================================================================
    // Cache Errors
    // =========================================================================
    #[error("Cache write failed for {key}: {reason}")]
    CacheWrite { key: String, reason: String },

    #[error("Cache generation not found: {generation}")]
    GenerationNotFound { generation: String },

    #[error("Pre-population aborted at {url}: {reason}")]
    PrepopulateFailed { url: String, reason: String },

    // =========================================================================
    // Ledger Errors
    // =========================================================================
    #[error("Score ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Ledger write to {collection} failed: {reason}")]
    LedgerWrite { collection: String, reason: String },

    #[error("Partial write: {failed} of {attempted} anomaly records failed")]
    PartialWrite { attempted: usize, failed: usize },

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Recovery action a caller takes for an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Serve a cached copy or the offline document instead
    FallbackToCache,
    /// Abandon the current monitoring tick, try again next interval
    RetryNextTick,
    /// Record the failure and carry on; nothing to recover
    LogAndContinue,
    /// Unrecoverable, surface to the operator
    Fail,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            Error::TransientNetwork { .. } | Error::Http(_) => ErrorAction::FallbackToCache,

            Error::LedgerUnavailable(_) => ErrorAction::RetryNextTick,

            // Caching is best-effort; ledger side effects are not rolled back
            Error::CacheWrite { .. }
            | Error::LedgerWrite { .. }
            | Error::PartialWrite { .. } => ErrorAction::LogAndContinue,

            Error::Configuration(_)
            | Error::InvalidUrl(_)
            | Error::YamlParse(_)
            | Error::PrepopulateFailed { .. }
            | Error::InvalidTransition { .. } => ErrorAction::Fail,

            _ => ErrorAction::LogAndContinue,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::Fail)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::TransientNetwork { .. } | Error::Http(_) | Error::LedgerUnavailable(_)
        )
    }
}

/// Result type alias for the agent
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::TransientNetwork {
            url: "https://app.test/".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(err.action(), ErrorAction::FallbackToCache);

        let err = Error::LedgerUnavailable("timeout".into());
        assert_eq!(err.action(), ErrorAction::RetryNextTick);

        let err = Error::PartialWrite {
            attempted: 3,
            failed: 1,
        };
        assert_eq!(err.action(), ErrorAction::LogAndContinue);

        let err = Error::Configuration("bad config".into());
        assert_eq!(err.action(), ErrorAction::Fail);
    }

    #[test]
    fn test_error_retryable() {
        let transient = Error::LedgerUnavailable("down".into());
        assert!(transient.is_retryable());
        assert!(transient.is_transient());

        let cache_err = Error::CacheWrite {
            key: "GET https://app.test/".into(),
            reason: "quota".into(),
        };
        assert!(cache_err.is_retryable());
        assert!(!cache_err.is_transient());

        let config_err = Error::Configuration("invalid".into());
        assert!(!config_err.is_retryable());
        assert!(!config_err.is_transient());
    }
}
