//! Error types for the holiday calendar subsystem.

use thiserror::Error;

/// Errors that can occur while fetching public holidays.
#[derive(Debug, Error, Clone)]
pub enum HolidayError {
    /// Network/HTTP request failed
    #[error("Network error: {message}")]
    Network { message: String },

    /// Upstream did not answer within the configured timeout
    #[error("Holiday fetch timed out after {elapsed_secs:.1}s")]
    Timeout { elapsed_secs: f64 },

    /// Upstream returned a non-success status
    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },

    /// Payload could not be parsed
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// URL template produced an invalid URL
    #[error("URL error: {message}")]
    Url { message: String },

    /// Circuit breaker is open due to repeated failures
    #[error("Circuit breaker open - too many recent failures")]
    CircuitBreakerOpen,

    /// No year in the requested range produced any data
    #[error("No holiday data available for {start_year}-{end_year}")]
    HolidayFetchFailed { start_year: i32, end_year: i32 },
}

impl HolidayError {
    /// Returns true if this error is potentially transient and retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HolidayError::Network { .. }
                | HolidayError::Timeout { .. }
                | HolidayError::UnexpectedResponse { .. }
        )
    }
}

impl From<reqwest::Error> for HolidayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return HolidayError::Timeout { elapsed_secs: 0.0 };
        }
        HolidayError::Network {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for HolidayError {
    fn from(err: url::ParseError) -> Self {
        HolidayError::Url {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for HolidayError {
    fn from(err: serde_json::Error) -> Self {
        HolidayError::Parse {
            message: err.to_string(),
        }
    }
}
