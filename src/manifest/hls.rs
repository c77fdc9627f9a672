//! HLS media playlist expansion.
//!
//! Turns an m3u8 media playlist into the ordered [`SegmentRef`] list of a
//! segmented variant. Key-IDs ride in the `EXT-X-KEY` URI using the
//! `drm://<key-id>` form; the IV comes from the tag's IV attribute or, when
//! absent, from the media sequence number per the HLS AES-128 rule.

use m3u8_rs::{Key, KeyMethod, MediaPlaylist};
use tracing::{debug, instrument};
use url::Url;

use super::error::ManifestError;
use super::variant::{ByteRange, SegmentKey, SegmentRef};

/// URI scheme that carries a key-ID instead of a fetchable key URL.
const KEY_ID_SCHEME: &str = "drm://";

/// Parses a media playlist body into ordered segment references.
///
/// `playlist_url` anchors relative segment URIs.
///
/// # Errors
///
/// [`ManifestError::Malformed`] when the playlist does not parse, and
/// [`ManifestError::UnsupportedEncryption`] for key methods other than
/// `NONE`/`AES-128` or key URIs without the `drm://` scheme.
#[instrument(level = "debug", skip(body), fields(url = %playlist_url))]
pub(crate) fn expand_media_playlist(
    body: &[u8],
    playlist_url: &Url,
) -> Result<Vec<SegmentRef>, ManifestError> {
    let playlist: MediaPlaylist = m3u8_rs::parse_media_playlist_res(body)
        .map_err(|e| ManifestError::malformed(playlist_url.as_str(), e.to_string()))?;

    let mut segments = Vec::with_capacity(playlist.segments.len());

    // EXT-X-KEY applies to all following segments until replaced.
    let mut active_key: Option<Key> = None;
    // EXT-X-BYTERANGE without an offset continues from the previous range.
    let mut next_offset: u64 = 0;

    for (position, segment) in playlist.segments.iter().enumerate() {
        if let Some(key) = &segment.key {
            active_key = match key.method {
                KeyMethod::None => None,
                _ => Some(key.clone()),
            };
        }

        let sequence = playlist.media_sequence + position as u64;

        let key = match &active_key {
            None => None,
            Some(key) => Some(segment_key(key, sequence, playlist_url)?),
        };

        let byte_range = match segment.byte_range.as_ref() {
            None => None,
            Some(range) => {
                if range.length == 0 {
                    return Err(ManifestError::malformed(
                        playlist_url.as_str(),
                        format!("zero-length byte range for segment '{}'", segment.uri),
                    ));
                }
                let offset = range.offset.unwrap_or(next_offset);
                next_offset = offset + range.length;
                Some(ByteRange {
                    offset,
                    length: range.length,
                })
            }
        };

        let url = playlist_url
            .join(&segment.uri)
            .map_err(|_| {
                ManifestError::malformed(
                    playlist_url.as_str(),
                    format!("unresolvable segment URI: {}", segment.uri),
                )
            })?
            .to_string();

        segments.push(SegmentRef {
            sequence: position as u64,
            url,
            byte_range,
            key,
        });
    }

    debug!(segments = segments.len(), "expanded media playlist");
    Ok(segments)
}

/// Resolves one segment's decryption parameters from the active key tag.
fn segment_key(
    key: &Key,
    media_sequence: u64,
    playlist_url: &Url,
) -> Result<SegmentKey, ManifestError> {
    if key.method != KeyMethod::AES128 {
        return Err(ManifestError::UnsupportedEncryption {
            url: playlist_url.to_string(),
            detail: format!("key method {:?}", key.method),
        });
    }

    let uri = key.uri.as_deref().unwrap_or_default();
    let Some(key_id) = uri.strip_prefix(KEY_ID_SCHEME) else {
        return Err(ManifestError::UnsupportedEncryption {
            url: playlist_url.to_string(),
            detail: format!("key URI '{uri}' is not a {KEY_ID_SCHEME} reference"),
        });
    };
    if key_id.is_empty() {
        return Err(ManifestError::UnsupportedEncryption {
            url: playlist_url.to_string(),
            detail: "empty key-ID in key URI".to_string(),
        });
    }

    let iv = match &key.iv {
        Some(iv_hex) => parse_iv(iv_hex)
            .ok_or_else(|| ManifestError::malformed(playlist_url.as_str(), format!("bad IV '{iv_hex}'")))?,
        None => sequence_iv(media_sequence),
    };

    Ok(SegmentKey {
        key_id: key_id.to_string(),
        iv,
    })
}

/// Parses a `0x…` (or bare) 32-hex-digit IV.
fn parse_iv(iv_hex: &str) -> Option<[u8; 16]> {
    let trimmed = iv_hex.trim_start_matches("0x").trim_start_matches("0X");
    let mut iv = [0u8; 16];
    hex::decode_to_slice(trimmed, &mut iv).ok()?;
    Some(iv)
}

/// Derives the IV from the media sequence number (big-endian, per the HLS
/// rule for AES-128 when no IV attribute is present).
fn sequence_iv(media_sequence: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[8..].copy_from_slice(&media_sequence.to_be_bytes());
    iv
}
