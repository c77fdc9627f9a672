//! In-memory course structure.
//!
//! Built once by the resolver, pruned by the selection filter, read-only
//! thereafter. Chapter and lecture ordering reflects the server-provided
//! sequence index and is preserved end-to-end into on-disk numbering.

use serde_json::Value;

/// Root of a resolved course: ordered chapters.
#[derive(Debug, Clone)]
pub struct CourseTree {
    /// Server-side course identifier.
    pub id: String,
    /// Course title (used as the output root directory name).
    pub title: String,
    /// Chapters in curriculum order.
    pub chapters: Vec<Chapter>,
}

impl CourseTree {
    /// Total number of lectures across all chapters.
    #[must_use]
    pub fn lecture_count(&self) -> usize {
        self.chapters.iter().map(|c| c.lectures.len()).sum()
    }
}

/// One chapter: ordered lectures plus chapter-level downloadable assets.
#[derive(Debug, Clone)]
pub struct Chapter {
    /// 1-based position within the course.
    pub index: usize,
    /// Chapter title.
    pub title: String,
    /// Lectures in curriculum order.
    pub lectures: Vec<Lecture>,
    /// Chapter-level assets.
    pub assets: Vec<AssetRef>,
}

/// One lecture: remote media reference plus optional captions, assets and
/// quiz payload.
#[derive(Debug, Clone)]
pub struct Lecture {
    /// Server-side lecture identifier.
    pub id: u64,
    /// 1-based position within its chapter.
    pub index: usize,
    /// Lecture title.
    pub title: String,
    /// Remote media identifier, resolved lazily into a manifest.
    pub media_id: String,
    /// Caption tracks by language code.
    pub captions: Vec<CaptionTrack>,
    /// Lecture-level assets.
    pub assets: Vec<AssetRef>,
    /// Structured quiz payload, written as a JSON sidecar when present.
    pub quiz: Option<Value>,
}

/// A downloadable supplementary file.
#[derive(Debug, Clone)]
pub struct AssetRef {
    /// Display filename.
    pub name: String,
    /// Source URL.
    pub url: String,
}

/// A caption track in one language.
#[derive(Debug, Clone)]
pub struct CaptionTrack {
    /// Language code (e.g. `en`, `hi`).
    pub lang: String,
    /// Source URL.
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lecture_count_sums_chapters() {
        let lecture = |index| Lecture {
            id: index as u64,
            index,
            title: format!("L{index}"),
            media_id: format!("m{index}"),
            captions: vec![],
            assets: vec![],
            quiz: None,
        };
        let tree = CourseTree {
            id: "c1".into(),
            title: "Course".into(),
            chapters: vec![
                Chapter {
                    index: 1,
                    title: "One".into(),
                    lectures: vec![lecture(1), lecture(2)],
                    assets: vec![],
                },
                Chapter {
                    index: 2,
                    title: "Two".into(),
                    lectures: vec![lecture(1)],
                    assets: vec![],
                },
            ],
        };
        assert_eq!(tree.lecture_count(), 3);
    }
}
