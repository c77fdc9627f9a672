//! Run configuration.

use std::path::PathBuf;

use url::Url;

use crate::scheduler::{DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS};
use crate::select::{ChapterSpec, ContentToggles};

/// Everything one download run needs, resolved before any network call.
///
/// Built by the CLI from arguments and defaults; the library takes it
/// as-is and performs no further environment lookups.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Raw course reference: a bare ID/slug or a full course URL.
    pub course: String,
    /// API base URL the catalog and manifest endpoints hang off.
    pub base_url: Url,
    /// Directory the course tree is written under.
    pub output_root: PathBuf,
    /// Maximum vertical resolution, when the user constrains quality.
    pub quality: Option<u32>,
    /// Which chapters to download.
    pub chapters: ChapterSpec,
    /// Which supplementary content to include.
    pub toggles: ContentToggles,
    /// Concurrent download limit (1-30).
    pub concurrency: usize,
    /// Attempt ceiling per task, including the initial attempt.
    pub max_attempts: u32,
}

impl DownloadConfig {
    /// Creates a config with defaults for everything but the course
    /// reference and base URL.
    #[must_use]
    pub fn new(course: impl Into<String>, base_url: Url) -> Self {
        Self {
            course: course.into(),
            base_url,
            output_root: PathBuf::from("."),
            quality: None,
            chapters: ChapterSpec::all(),
            toggles: ContentToggles::default(),
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}
