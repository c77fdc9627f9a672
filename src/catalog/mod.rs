//! Course catalog resolution.
//!
//! Fetches a course's structural metadata (chapters, lectures, assets,
//! captions, quizzes) over the authenticated API and aggregates the
//! paginated curriculum into a single in-memory [`CourseTree`].

mod error;
mod model;
mod resolver;

pub use error::CatalogError;
pub use model::{AssetRef, CaptionTrack, Chapter, CourseTree, Lecture};
pub use resolver::{CatalogResolver, CourseRef};
