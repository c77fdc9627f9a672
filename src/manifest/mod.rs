//! Adaptive-streaming manifest resolution.
//!
//! For each lecture the resolver fetches the variant list, picks the best
//! variant for the requested quality constraint, and expands segmented
//! variants into ordered segment lists with per-segment key-ID and IV.

mod error;
mod hls;
mod resolver;
mod variant;

pub use error::ManifestError;
pub use resolver::ManifestResolver;
pub use variant::{ByteRange, ManifestVariant, SegmentKey, SegmentRef, VariantSource};
