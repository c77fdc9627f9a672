//! Download task descriptions.
//!
//! The pipeline turns resolved manifests into a flat, ordered list of
//! [`DownloadTask`]s; the scheduler executes them without knowing anything
//! about courses or manifests beyond what the task carries.

use std::path::PathBuf;

use crate::manifest::{ByteRange, SegmentKey};

/// One unit of download work.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// Absolute URL to fetch.
    pub url: String,
    /// HTTP byte range within the URL, when the source uses ranges.
    pub byte_range: Option<ByteRange>,
    /// What the fetched bytes are and where they land.
    pub kind: TaskKind,
}

/// What a task's bytes are and how they reach disk.
#[derive(Debug, Clone)]
pub enum TaskKind {
    /// One segment of a lecture's media, reassembled in order.
    Segment {
        /// Final media path the reassembled lecture persists to.
        dest: PathBuf,
        /// 0-based position in playback order.
        sequence: u64,
        /// Total segments in the lecture, for completion detection.
        total: u64,
        /// Decryption parameters; None for clear segments.
        key: Option<SegmentKey>,
    },

    /// A caption track, written whole.
    Caption {
        /// Final caption path.
        dest: PathBuf,
    },

    /// A supplementary asset, written whole.
    Asset {
        /// Final asset path.
        dest: PathBuf,
    },
}

impl DownloadTask {
    /// Final destination path this task contributes to.
    #[must_use]
    pub fn dest(&self) -> &PathBuf {
        match &self.kind {
            TaskKind::Segment { dest, .. }
            | TaskKind::Caption { dest }
            | TaskKind::Asset { dest } => dest,
        }
    }

    /// Short human-readable label for progress reporting.
    #[must_use]
    pub fn label(&self) -> String {
        let name = self
            .dest()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.url.clone());
        match &self.kind {
            TaskKind::Segment { sequence, total, .. } => {
                format!("{name} [{}/{total}]", sequence + 1)
            }
            TaskKind::Caption { .. } | TaskKind::Asset { .. } => name,
        }
    }
}
