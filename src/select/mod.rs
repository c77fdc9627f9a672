//! Selection filter: chapter ranges and content-type toggles.
//!
//! Prunes a resolved [`CourseTree`] down to the chapters the user asked for
//! and strips caption/asset/quiz content that is toggled off. Indices that
//! don't exist in the course are ignored silently; course sizes vary and a
//! stale range should not abort the run.

use std::collections::BTreeSet;

use tracing::{debug, instrument};

use crate::catalog::CourseTree;

/// Errors parsing a chapter spec string.
#[derive(Debug, thiserror::Error)]
pub enum ChapterSpecError {
    /// A token was neither an integer nor an `a-b` range.
    #[error("invalid chapter spec token '{token}': expected an index or 'a-b' range")]
    InvalidToken {
        /// The offending token.
        token: String,
    },

    /// A range ran backwards (e.g. `5-3`).
    #[error("invalid chapter range '{token}': start exceeds end")]
    BackwardsRange {
        /// The offending token.
        token: String,
    },
}

/// A parsed chapter selection: a set of 1-based chapter indices.
///
/// An empty spec selects every chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterSpec {
    // None = select all; Some = explicit union of singles and ranges.
    selected: Option<BTreeSet<usize>>,
}

impl ChapterSpec {
    /// Selects every chapter.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Parses a comma-separated spec of singles and inclusive ranges,
    /// e.g. `"1,3-5,7"`. Empty or blank input selects all chapters.
    ///
    /// # Errors
    ///
    /// Returns [`ChapterSpecError`] for tokens that are not integers or
    /// `a-b` ranges, and for backwards ranges. Out-of-range indices are NOT
    /// an error; they are clipped at prune time.
    pub fn parse(spec: &str) -> Result<Self, ChapterSpecError> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return Ok(Self::all());
        }

        let mut selected = BTreeSet::new();
        for token in trimmed.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.split_once('-') {
                Some((start, end)) => {
                    let start = parse_index(start, token)?;
                    let end = parse_index(end, token)?;
                    if start > end {
                        return Err(ChapterSpecError::BackwardsRange {
                            token: token.to_string(),
                        });
                    }
                    selected.extend(start..=end);
                }
                None => {
                    selected.insert(parse_index(token, token)?);
                }
            }
        }

        Ok(Self {
            selected: Some(selected),
        })
    }

    /// Returns true when the 1-based chapter index is selected.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        match &self.selected {
            None => true,
            Some(set) => set.contains(&index),
        }
    }

    /// Returns true when this spec selects every chapter.
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.selected.is_none()
    }
}

fn parse_index(value: &str, token: &str) -> Result<usize, ChapterSpecError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ChapterSpecError::InvalidToken {
            token: token.to_string(),
        })
}

/// Per-lecture content-type toggles.
///
/// These enable or disable captions, assets and quizzes independently of
/// video selection. `caption_lang` narrows caption tracks to one language
/// code when set.
#[derive(Debug, Clone)]
pub struct ContentToggles {
    /// Download caption tracks.
    pub captions: bool,
    /// Download chapter- and lecture-level assets.
    pub assets: bool,
    /// Write quiz sidecar files.
    pub quizzes: bool,
    /// Restrict captions to this language code (e.g. `en`). None = all.
    pub caption_lang: Option<String>,
}

impl Default for ContentToggles {
    fn default() -> Self {
        Self {
            captions: true,
            assets: true,
            quizzes: true,
            caption_lang: None,
        }
    }
}

/// Prunes a course tree by chapter selection and content toggles.
///
/// Chapters keep their original indices so on-disk numbering matches the
/// full course layout. The input tree is consumed; the catalog is read-only
/// after this point.
#[must_use]
#[instrument(level = "debug", skip(tree, toggles), fields(course = %tree.id))]
pub fn prune(tree: CourseTree, spec: &ChapterSpec, toggles: &ContentToggles) -> CourseTree {
    let before = tree.chapters.len();
    let chapters = tree
        .chapters
        .into_iter()
        .filter(|chapter| spec.contains(chapter.index))
        .map(|mut chapter| {
            if !toggles.assets {
                chapter.assets.clear();
            }
            for lecture in &mut chapter.lectures {
                if !toggles.captions {
                    lecture.captions.clear();
                } else if let Some(lang) = &toggles.caption_lang {
                    lecture.captions.retain(|c| c.lang.eq_ignore_ascii_case(lang));
                }
                if !toggles.assets {
                    lecture.assets.clear();
                }
                if !toggles.quizzes {
                    lecture.quiz = None;
                }
            }
            chapter
        })
        .collect::<Vec<_>>();

    debug!(before, after = chapters.len(), "pruned chapters");

    CourseTree {
        id: tree.id,
        title: tree.title,
        chapters,
    }
}
