//! On-disk layout for downloaded courses.
//!
//! Layout: `<course>/<nn> <chapter>/<nnn> <lecture>.<ext>`, with captions,
//! assets, and quiz sidecars as siblings of the lecture media file. All
//! name components pass through [`sanitize_component`] so titles cannot
//! escape the output root or collide with filesystem-reserved characters.

use std::path::{Path, PathBuf};

use crate::catalog::{Chapter, Lecture};

/// Maximum length of a sanitized name component, in characters.
const MAX_COMPONENT_CHARS: usize = 120;

/// Path builder for one course under an output root.
#[derive(Debug, Clone)]
pub struct CourseLayout {
    course_dir: PathBuf,
}

impl CourseLayout {
    /// Creates a layout rooted at `<root>/<sanitized course title>`.
    #[must_use]
    pub fn new(root: &Path, course_title: &str) -> Self {
        Self {
            course_dir: root.join(sanitize_component(course_title)),
        }
    }

    /// The course directory itself.
    #[must_use]
    pub fn course_dir(&self) -> &Path {
        &self.course_dir
    }

    /// `<course>/<nn> <chapter>`.
    #[must_use]
    pub fn chapter_dir(&self, chapter: &Chapter) -> PathBuf {
        self.course_dir.join(format!(
            "{:02} {}",
            chapter.index,
            sanitize_component(&chapter.title)
        ))
    }

    /// `<chapter dir>/<nnn> <lecture>.<ext>`.
    #[must_use]
    pub fn lecture_media_path(&self, chapter: &Chapter, lecture: &Lecture, ext: &str) -> PathBuf {
        self.chapter_dir(chapter)
            .join(format!("{}.{ext}", self.lecture_stem(lecture)))
    }

    /// Caption sibling: `<nnn> <lecture>.<lang>.<ext>`.
    #[must_use]
    pub fn caption_path(
        &self,
        chapter: &Chapter,
        lecture: &Lecture,
        lang: &str,
        url: &str,
    ) -> PathBuf {
        let ext = extension_from_url(url).unwrap_or_else(|| "vtt".to_string());
        self.chapter_dir(chapter).join(format!(
            "{}.{}.{ext}",
            self.lecture_stem(lecture),
            sanitize_component(lang)
        ))
    }

    /// Lecture asset sibling: `<nnn> <lecture> - <asset name>`.
    #[must_use]
    pub fn lecture_asset_path(&self, chapter: &Chapter, lecture: &Lecture, name: &str) -> PathBuf {
        self.chapter_dir(chapter).join(format!(
            "{} - {}",
            self.lecture_stem(lecture),
            sanitize_component(name)
        ))
    }

    /// Chapter-level asset: directly inside the chapter directory.
    #[must_use]
    pub fn chapter_asset_path(&self, chapter: &Chapter, name: &str) -> PathBuf {
        self.chapter_dir(chapter).join(sanitize_component(name))
    }

    /// Quiz sidecar: `<nnn> <lecture>.quiz.json`.
    #[must_use]
    pub fn quiz_path(&self, chapter: &Chapter, lecture: &Lecture) -> PathBuf {
        self.chapter_dir(chapter)
            .join(format!("{}.quiz.json", self.lecture_stem(lecture)))
    }

    fn lecture_stem(&self, lecture: &Lecture) -> String {
        format!("{:03} {}", lecture.index, sanitize_component(&lecture.title))
    }
}

/// Sanitizes one path component: forbidden and control characters become
/// `_`, runs of whitespace collapse to a single space, and the result is
/// trimmed and length-capped. An empty result falls back to `untitled`.
#[must_use]
pub fn sanitize_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_space = false;
    for ch in value.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c if c.is_whitespace() => ' ',
            c => c,
        };
        if mapped == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(mapped);
            prev_space = false;
        }
    }
    let trimmed: String = out.trim_matches([' ', '.']).chars().take(MAX_COMPONENT_CHARS).collect();
    // ".." would climb out of the output root.
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_' || c == '.') {
        "untitled".to_string()
    } else {
        trimmed
    }
}

/// Extracts a short lowercase extension from a URL's last path segment.
fn extension_from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    let dot_index = last_segment.rfind('.')?;
    let ext = &last_segment[dot_index + 1..];
    if ext.is_empty() || ext.len() > 11 {
        return None;
    }
    Some(ext.to_lowercase())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::{CaptionTrack, Chapter, Lecture};

    fn chapter() -> Chapter {
        Chapter {
            index: 2,
            title: "Getting Started".to_string(),
            lectures: Vec::new(),
            assets: Vec::new(),
        }
    }

    fn lecture() -> Lecture {
        Lecture {
            id: 11,
            index: 3,
            title: "Hello, World".to_string(),
            media_id: "m-11".to_string(),
            captions: vec![CaptionTrack {
                lang: "en".to_string(),
                url: "https://cdn.example.com/caps/11/en.vtt".to_string(),
            }],
            assets: Vec::new(),
            quiz: None,
        }
    }

    #[test]
    fn test_media_path_shape() {
        let layout = CourseLayout::new(Path::new("/out"), "Rust Basics");
        let path = layout.lecture_media_path(&chapter(), &lecture(), "ts");
        assert_eq!(
            path,
            Path::new("/out/Rust Basics/02 Getting Started/003 Hello, World.ts")
        );
    }

    #[test]
    fn test_caption_path_uses_lang_and_url_extension() {
        let layout = CourseLayout::new(Path::new("/out"), "Rust Basics");
        let path = layout.caption_path(
            &chapter(),
            &lecture(),
            "en",
            "https://cdn.example.com/caps/11/en.srt",
        );
        assert!(path.ends_with("003 Hello, World.en.srt"), "{path:?}");
    }

    #[test]
    fn test_caption_path_defaults_to_vtt() {
        let layout = CourseLayout::new(Path::new("/out"), "C");
        let path = layout.caption_path(&chapter(), &lecture(), "en", "https://cdn.example.com/cap");
        assert!(path.ends_with("003 Hello, World.en.vtt"), "{path:?}");
    }

    #[test]
    fn test_quiz_sidecar_path() {
        let layout = CourseLayout::new(Path::new("/out"), "C");
        let path = layout.quiz_path(&chapter(), &lecture());
        assert!(path.ends_with("003 Hello, World.quiz.json"), "{path:?}");
    }

    #[test]
    fn test_sanitize_strips_forbidden_characters() {
        assert_eq!(sanitize_component("a/b:c*d?e"), "a_b_c_d_e");
        assert_eq!(sanitize_component("Intro <Part 1>"), "Intro _Part 1_");
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize_component("  spaced \t out  "), "spaced out");
    }

    #[test]
    fn test_sanitize_blocks_path_traversal() {
        assert_eq!(sanitize_component(".."), "untitled");
        assert_eq!(sanitize_component("../../etc"), "_.._etc");
    }

    #[test]
    fn test_sanitize_empty_falls_back() {
        assert_eq!(sanitize_component(""), "untitled");
        assert_eq!(sanitize_component("   "), "untitled");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_component(&long).chars().count(), MAX_COMPONENT_CHARS);
    }
}
