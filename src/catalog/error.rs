//! Error types for catalog resolution.

use thiserror::Error;

/// Errors resolving a course's structural metadata.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The course reference is neither a recognizable URL nor a course id.
    #[error("invalid course reference: {reference}")]
    InvalidCourseRef {
        /// The offending input.
        reference: String,
    },

    /// The server rejected the session (401/403). Fatal, never retried:
    /// a stale session cannot recover by retrying.
    #[error("session rejected with HTTP {status}; refresh your credentials")]
    SessionRejected {
        /// The HTTP status code (401 or 403).
        status: u16,
    },

    /// Network-level failure fetching catalog metadata.
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Unexpected HTTP status from the catalog API.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The status code.
        status: u16,
    },

    /// Pagination stopped before the server-declared item count was reached.
    /// A truncated fetch is an error, not a partial success.
    #[error("curriculum pagination truncated: got {received} of {declared} items")]
    TruncatedPagination {
        /// Items received across all pages.
        received: usize,
        /// Item count declared by the server.
        declared: usize,
    },

    /// The response body did not match the expected schema.
    #[error("malformed catalog metadata from {url}: {reason}")]
    Malformed {
        /// The URL whose response was malformed.
        url: String,
        /// What was wrong.
        reason: String,
    },
}

impl CatalogError {
    /// Creates a network error with URL context.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a malformed-metadata error with URL context.
    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_rejected_display() {
        let msg = CatalogError::SessionRejected { status: 401 }.to_string();
        assert!(msg.contains("401"));
        assert!(msg.contains("credentials"));
    }

    #[test]
    fn test_truncated_pagination_display() {
        let msg = CatalogError::TruncatedPagination {
            received: 10,
            declared: 25,
        }
        .to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("25"));
    }
}
