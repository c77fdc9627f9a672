//! Error types for manifest resolution.

use thiserror::Error;

/// Errors resolving a lecture's media manifest.
///
/// All of these are fatal for the lecture only; sibling lectures continue.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The media endpoint returned no variants at all.
    #[error("no variants available for media '{media_id}'")]
    NoVariants {
        /// The lecture's media identifier.
        media_id: String,
    },

    /// Every variant is DRM-protected by a key-ID the session doesn't hold.
    #[error("no usable variant for media '{media_id}': all variants need content keys missing from the session (e.g. '{example_key_id}')")]
    MissingKeys {
        /// The lecture's media identifier.
        media_id: String,
        /// One of the missing key-IDs, for diagnostics.
        example_key_id: String,
    },

    /// The server rejected the session (401/403).
    #[error("session rejected with HTTP {status} while resolving manifest")]
    SessionRejected {
        /// The HTTP status code.
        status: u16,
    },

    /// Network-level failure fetching the variant list or a playlist.
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Unexpected HTTP status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The status code.
        status: u16,
    },

    /// The variant list or media playlist did not parse.
    #[error("malformed manifest from {url}: {reason}")]
    Malformed {
        /// The URL whose body was malformed.
        url: String,
        /// What was wrong.
        reason: String,
    },

    /// The playlist declares an encryption scheme other than AES-128 with a
    /// `drm://` key reference.
    #[error("unsupported encryption in {url}: {detail}")]
    UnsupportedEncryption {
        /// The playlist URL.
        url: String,
        /// The declared scheme.
        detail: String,
    },
}

impl ManifestError {
    /// Creates a network error with URL context.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a malformed-manifest error with URL context.
    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
