//! Error types for the CFTC public reporting client.

use thiserror::Error;

/// Errors that can occur when fetching COT reports.
#[derive(Debug, Error)]
pub enum CftcError {
    /// The API answered with a non-success status.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Response body, if any.
        message: String,
    },

    /// Transport failure or timeout.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body was not a JSON array of rows.
    #[error("failed to decode {dataset} page at offset {offset}: {source}")]
    Decode {
        /// Dataset identifier.
        dataset: String,
        /// Row offset of the page.
        offset: u64,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl CftcError {
    /// Returns true if retrying the request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            CftcError::Api { status_code, .. } => *status_code == 429 || *status_code >= 500,
            CftcError::Network(e) => e.is_timeout() || e.is_connect(),
            CftcError::Decode { .. } => false,
        }
    }
}
