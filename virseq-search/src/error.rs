//! Remote search error types

use std::time::Duration;
use thiserror::Error;

/// Failure of one remote search attempt
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// Network trouble or an overloaded service; worth retrying
    #[error("Search service unavailable: {0}")]
    Transient(String),

    /// The service rejected the request or the search itself failed
    #[error("Search rejected: {0}")]
    Fatal(String),

    #[error("Search attempt timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Response body could not be understood
    #[error("Malformed search response: {0}")]
    Parse(String),
}

impl SearchError {
    /// Whether the dispatcher should retry after this error
    pub fn is_transient(&self) -> bool {
        !matches!(self, SearchError::Fatal(_))
    }
}

/// Result type for search service calls
pub type ServiceResult<T> = Result<T, SearchError>;
