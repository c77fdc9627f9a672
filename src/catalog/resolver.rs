//! Authenticated course catalog fetching.
//!
//! Resolves a course reference into a [`CourseTree`] by fetching the course
//! metadata endpoint and walking the paginated curriculum listing to
//! completion. Items are ordered by the server-provided sequence index, not
//! arrival order, so out-of-order pagination is tolerated.

use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::error::CatalogError;
use super::model::{AssetRef, CaptionTrack, Chapter, CourseTree, Lecture};
use crate::session::SessionContext;

/// A validated course reference: either a bare id or one extracted from a
/// course page URL (`…/course/<id>` or `…/learn/<id>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseRef {
    id: String,
}

impl CourseRef {
    /// Parses a course reference from user input.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidCourseRef`] when the input is neither
    /// a course URL nor a plausible course id.
    pub fn parse(input: &str) -> Result<Self, CatalogError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CatalogError::InvalidCourseRef {
                reference: input.to_string(),
            });
        }

        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let url = Url::parse(trimmed).map_err(|_| CatalogError::InvalidCourseRef {
                reference: input.to_string(),
            })?;
            let segments: Vec<&str> = url
                .path_segments()
                .map(|s| s.filter(|p| !p.is_empty()).collect())
                .unwrap_or_default();
            // The id follows a /course/ or /learn/ path segment.
            let id = segments
                .iter()
                .position(|s| *s == "course" || *s == "learn")
                .and_then(|pos| segments.get(pos + 1))
                .map(|s| (*s).to_string());
            return id.map(|id| Self { id }).ok_or(CatalogError::InvalidCourseRef {
                reference: input.to_string(),
            });
        }

        if trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        {
            return Ok(Self {
                id: trimmed.to_string(),
            });
        }

        Err(CatalogError::InvalidCourseRef {
            reference: input.to_string(),
        })
    }

    /// The course id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

// ---- Wire schema ----

#[derive(Debug, Deserialize)]
struct CourseInfoDto {
    id: u64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct CurriculumPageDto {
    count: usize,
    next: Option<String>,
    results: Vec<CurriculumItemDto>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CurriculumItemDto {
    Chapter {
        title: String,
        sort_order: i64,
        #[serde(default)]
        assets: Vec<AssetDto>,
    },
    Lecture {
        id: u64,
        title: String,
        sort_order: i64,
        media_id: String,
        #[serde(default)]
        assets: Vec<AssetDto>,
        #[serde(default)]
        captions: Vec<CaptionDto>,
        #[serde(default)]
        quiz: Option<Value>,
    },
    #[serde(other)]
    Unknown,
}

impl CurriculumItemDto {
    fn sort_order(&self) -> i64 {
        match self {
            Self::Chapter { sort_order, .. } | Self::Lecture { sort_order, .. } => *sort_order,
            Self::Unknown => i64::MAX,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AssetDto {
    name: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct CaptionDto {
    lang: String,
    url: String,
}

/// Fetches and aggregates course structure over the authenticated API.
#[derive(Debug, Clone)]
pub struct CatalogResolver {
    http: Client,
    base: Url,
}

impl CatalogResolver {
    /// Creates a resolver against an API base URL, reusing the shared client.
    #[must_use]
    pub fn new(http: Client, base: Url) -> Self {
        Self { http, base }
    }

    /// Resolves a course reference into a fully aggregated [`CourseTree`].
    ///
    /// Pagination is followed to completion; a fetch that stops short of the
    /// server-declared item count is a [`CatalogError::TruncatedPagination`],
    /// never a partial success.
    ///
    /// # Errors
    ///
    /// [`CatalogError::SessionRejected`] on 401/403 (propagated, not
    /// retried), [`CatalogError::Malformed`] on schema violations, and
    /// network/status errors with URL context.
    #[instrument(skip(self, session), fields(course = %course.id()))]
    pub async fn resolve(
        &self,
        course: &CourseRef,
        session: &SessionContext,
    ) -> Result<CourseTree, CatalogError> {
        let info_url = self.endpoint(&format!("api/courses/{}", course.id()))?;
        let info: CourseInfoDto = self.get_json(info_url.as_str(), session).await?;

        let mut items = Vec::new();
        let mut declared = 0usize;
        let mut next_url =
            Some(self.endpoint(&format!("api/courses/{}/curriculum?page=1", course.id()))?);

        while let Some(url) = next_url.take() {
            let page: CurriculumPageDto = self.get_json(url.as_str(), session).await?;
            declared = page.count;
            items.extend(page.results);
            next_url = match page.next {
                Some(next) => Some(Url::parse(&next).map_err(|_| {
                    CatalogError::malformed(url.as_str(), format!("unparseable next link: {next}"))
                })?),
                None => None,
            };
            debug!(received = items.len(), declared, "curriculum page aggregated");
        }

        if items.len() != declared {
            return Err(CatalogError::TruncatedPagination {
                received: items.len(),
                declared,
            });
        }

        let tree = build_tree(info.id.to_string(), info.title, items, info_url.as_str())?;
        info!(
            chapters = tree.chapters.len(),
            lectures = tree.lecture_count(),
            "course catalog resolved"
        );
        Ok(tree)
    }

    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        self.base.join(path).map_err(|_| CatalogError::malformed(
            self.base.as_str(),
            format!("cannot build endpoint for {path}"),
        ))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        session: &SessionContext,
    ) -> Result<T, CatalogError> {
        let mut request = self.http.get(url);
        if let Some(auth) = session.authorization() {
            request = request.header(AUTHORIZATION, auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CatalogError::network(url, e))?;

        let status = response.status().as_u16();
        if matches!(status, 401 | 403) {
            return Err(CatalogError::SessionRejected { status });
        }
        if !response.status().is_success() {
            return Err(CatalogError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::malformed(url, e.to_string()))
    }
}

/// Builds the ordered tree from aggregated curriculum items.
///
/// Items are sorted by their server sequence index first; chapters then own
/// the lectures that follow them.
fn build_tree(
    id: String,
    title: String,
    mut items: Vec<CurriculumItemDto>,
    source_url: &str,
) -> Result<CourseTree, CatalogError> {
    items.sort_by_key(CurriculumItemDto::sort_order);

    let mut chapters: Vec<Chapter> = Vec::new();

    for item in items {
        match item {
            CurriculumItemDto::Chapter { title, assets, .. } => {
                chapters.push(Chapter {
                    index: chapters.len() + 1,
                    title,
                    lectures: Vec::new(),
                    assets: assets.into_iter().map(asset_ref).collect(),
                });
            }
            CurriculumItemDto::Lecture {
                id,
                title,
                media_id,
                assets,
                captions,
                quiz,
                ..
            } => {
                let Some(chapter) = chapters.last_mut() else {
                    return Err(CatalogError::malformed(
                        source_url,
                        format!("lecture '{title}' appears before the first chapter"),
                    ));
                };
                chapter.lectures.push(Lecture {
                    id,
                    index: chapter.lectures.len() + 1,
                    title,
                    media_id,
                    captions: captions
                        .into_iter()
                        .map(|c| CaptionTrack {
                            lang: c.lang,
                            url: c.url,
                        })
                        .collect(),
                    assets: assets.into_iter().map(asset_ref).collect(),
                    quiz,
                });
            }
            CurriculumItemDto::Unknown => {
                warn!("skipping unrecognized curriculum item kind");
            }
        }
    }

    Ok(CourseTree {
        id,
        title,
        chapters,
    })
}

fn asset_ref(dto: AssetDto) -> AssetRef {
    AssetRef {
        name: dto.name,
        url: dto.url,
    }
}
