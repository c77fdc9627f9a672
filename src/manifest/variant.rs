//! Manifest variant types and quality selection.
//!
//! A [`ManifestVariant`] is one selectable rendition of a lecture's media.
//! The progressive/segmented distinction is resolved once at parse time into
//! the [`VariantSource`] tag and never re-inspected ad hoc downstream.

use serde::Deserialize;

/// One selectable quality/codec rendition of a lecture's media.
#[derive(Debug, Clone)]
pub struct ManifestVariant {
    /// Resolution label, e.g. `720p`.
    pub label: String,
    /// Vertical resolution in pixels.
    pub height: u32,
    /// Bandwidth in bits per second.
    pub bitrate: u64,
    /// Where the media bytes come from.
    pub source: VariantSource,
}

impl ManifestVariant {
    /// Output container extension for this variant.
    #[must_use]
    pub fn container_ext(&self) -> &str {
        match &self.source {
            VariantSource::Progressive { .. } => "mp4",
            VariantSource::Segmented { .. } => "ts",
        }
    }

    /// Number of download units (1 for progressive).
    #[must_use]
    pub fn segment_count(&self) -> usize {
        match &self.source {
            VariantSource::Progressive { .. } => 1,
            VariantSource::Segmented { segments } => segments.len(),
        }
    }
}

/// Closed set of media source shapes, tagged at manifest-parse time.
#[derive(Debug, Clone)]
pub enum VariantSource {
    /// A single progressive file.
    Progressive {
        /// Absolute media URL.
        url: String,
    },
    /// An ordered list of independently fetchable segments.
    Segmented {
        /// Segments in playback order.
        segments: Vec<SegmentRef>,
    },
}

/// One segment of a segmented variant.
#[derive(Debug, Clone)]
pub struct SegmentRef {
    /// 0-based position in playback order.
    pub sequence: u64,
    /// Absolute segment URL.
    pub url: String,
    /// HTTP byte range within the URL, when the playlist uses ranges.
    pub byte_range: Option<ByteRange>,
    /// Encryption parameters; None for clear segments.
    pub key: Option<SegmentKey>,
}

/// A byte range within a shared media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Offset of the first byte.
    pub offset: u64,
    /// Number of bytes.
    pub length: u64,
}

impl ByteRange {
    /// Formats the range as an HTTP `Range` header value.
    #[must_use]
    pub fn header_value(&self) -> String {
        let end = self.offset + self.length - 1;
        format!("bytes={}-{end}", self.offset)
    }
}

/// Per-segment decryption parameters.
#[derive(Debug, Clone)]
pub struct SegmentKey {
    /// Key-ID looked up in the session's content-key map.
    pub key_id: String,
    /// AES-CBC initialization vector.
    pub iv: [u8; 16],
}

// ---- Wire schema for the variant list endpoint ----

/// Variant list as returned by the media endpoint, before expansion.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct VariantListDto {
    pub variants: Vec<VariantDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct VariantDto {
    pub label: String,
    pub height: u32,
    pub bitrate: u64,
    pub kind: VariantKind,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum VariantKind {
    Progressive,
    Hls,
}

/// Orders variant indices by selection preference for a quality constraint.
///
/// The head of the returned order is the variant the resolver should use:
/// the largest resolution not exceeding `quality_pref` (ties broken by
/// highest bitrate), or the globally best variant when no preference is set
/// or the preference exceeds everything available. The tail is the fallback
/// order used when a preferred variant turns out to be undecryptable.
pub(crate) fn preference_order(variants: &[VariantDto], quality_pref: Option<u32>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..variants.len()).collect();

    // Descending (height, bitrate): "globally best" order.
    order.sort_by(|&a, &b| {
        (variants[b].height, variants[b].bitrate).cmp(&(variants[a].height, variants[a].bitrate))
    });

    if let Some(pref) = quality_pref {
        let within = order.iter().any(|&i| variants[i].height <= pref);
        if within {
            // Partition: conforming variants first (already best-first),
            // oversized variants after as a last resort.
            let (fitting, oversized): (Vec<usize>, Vec<usize>) =
                order.into_iter().partition(|&i| variants[i].height <= pref);
            let mut result = fitting;
            result.extend(oversized);
            return result;
        }
        // Preference exceeds all variants: fall back to best available.
    }

    order
}
