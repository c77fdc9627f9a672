//! Content-key mapping for DRM-protected lectures.
//!
//! The key file is a JSON object mapping key-ID strings to content keys.
//! Keys may be hex or base64 encoded; either way they must decode to exactly
//! 16 bytes (AES-128, the cipher used for `METHOD=AES-128` protected media).

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, instrument};

/// Size of an AES-128 content key in bytes.
pub const CONTENT_KEY_LEN: usize = 16;

/// A 16-byte AES-128 content key.
pub type ContentKey = [u8; CONTENT_KEY_LEN];

/// Errors for malformed key-file entries.
#[derive(Debug, thiserror::Error)]
pub enum KeyFormatError {
    /// The key file is not a JSON object of string-to-string entries.
    #[error("key file is not a JSON object of key-ID to key strings: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    /// A key value is neither valid hex nor valid base64.
    #[error("key for '{key_id}' is neither valid hex nor valid base64")]
    UndecodableKey {
        /// The key-ID whose value failed to decode.
        key_id: String,
    },

    /// A key decoded to the wrong length.
    #[error("key for '{key_id}' has invalid length: {actual} bytes (expected {CONTENT_KEY_LEN})")]
    InvalidKeyLength {
        /// The key-ID whose value had the wrong length.
        key_id: String,
        /// Decoded length in bytes.
        actual: usize,
    },

    /// A key-ID is empty or whitespace.
    #[error("key-ID '{key_id}' is empty")]
    EmptyKeyId {
        /// The offending entry's key-ID.
        key_id: String,
    },
}

/// Immutable key-ID → content-key mapping.
#[derive(Clone, Default)]
pub struct KeyMap {
    keys: HashMap<String, ContentKey>,
}

impl KeyMap {
    /// Parses a key map from JSON text.
    ///
    /// Accepts `{"<key-id>": "<hex-or-base64 key>", ...}`. Key-IDs are
    /// normalized to lowercase so lookups are case-insensitive against
    /// manifest-declared IDs.
    ///
    /// # Errors
    ///
    /// Returns [`KeyFormatError`] if the document is not a string map or any
    /// entry fails to decode to a 16-byte key.
    #[instrument(level = "debug", skip(json))]
    pub fn parse(json: &str) -> Result<Self, KeyFormatError> {
        let raw: HashMap<String, String> = serde_json::from_str(json)?;
        let mut keys = HashMap::with_capacity(raw.len());

        for (key_id, encoded) in raw {
            if key_id.trim().is_empty() {
                return Err(KeyFormatError::EmptyKeyId { key_id });
            }
            let key = decode_content_key(&key_id, &encoded)?;
            keys.insert(key_id.to_ascii_lowercase(), key);
        }

        debug!(count = keys.len(), "parsed content key map");
        Ok(Self { keys })
    }

    /// Looks up a content key by key-ID (case-insensitive).
    #[must_use]
    pub fn get(&self, key_id: &str) -> Option<&ContentKey> {
        self.keys.get(&key_id.to_ascii_lowercase())
    }

    /// Returns true when a key-ID is present.
    #[must_use]
    pub fn contains(&self, key_id: &str) -> bool {
        self.get(key_id).is_some()
    }

    /// Number of keys in the map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true when the map holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// Key material must never appear in logs.
impl std::fmt::Debug for KeyMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMap")
            .field("count", &self.keys.len())
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

/// Decodes a single key value, trying hex first and then base64.
fn decode_content_key(key_id: &str, encoded: &str) -> Result<ContentKey, KeyFormatError> {
    let trimmed = encoded.trim();

    let bytes = match hex::decode(trimmed) {
        Ok(bytes) => bytes,
        Err(_) => BASE64
            .decode(trimmed)
            .map_err(|_| KeyFormatError::UndecodableKey {
                key_id: key_id.to_string(),
            })?,
    };

    ContentKey::try_from(bytes.as_slice()).map_err(|_| KeyFormatError::InvalidKeyLength {
        key_id: key_id.to_string(),
        actual: bytes.len(),
    })
}
