//! End-to-end download pipeline.
//!
//! Orchestrates one run: catalog resolution, chapter/content selection,
//! per-lecture manifest resolution, task generation, and the scheduler.
//! Lecture failures are isolated; one undecryptable or missing lecture
//! never takes the run down.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::assemble::{Assembler, CourseLayout};
use crate::catalog::{CatalogError, CatalogResolver, Chapter, CourseRef, Lecture};
use crate::config::DownloadConfig;
use crate::manifest::{ManifestResolver, ManifestVariant, VariantSource};
use crate::scheduler::{
    DownloadTask, ProgressSink, RetryPolicy, RunStats, Scheduler, SchedulerError, TaskKind,
};
use crate::select::prune;
use crate::session::SessionContext;

/// User agent sent on every request.
const USER_AGENT: &str = concat!("coursedl/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout for API and media fetches.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Fatal pipeline errors. Per-lecture problems are reported in the
/// [`RunSummary`] instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Course reference or catalog failure.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Scheduler-level failure.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// The selection matched no lectures at all.
    #[error("selection matched no lectures in course '{course}'")]
    EmptySelection {
        /// Course title.
        course: String,
    },
}

/// A lecture that could not be planned (manifest or quiz failure).
#[derive(Debug, Clone)]
pub struct LectureFailure {
    /// Lecture title with its chapter context.
    pub lecture: String,
    /// Error rendered for display.
    pub reason: String,
}

/// End-of-run report.
#[derive(Debug)]
pub struct RunSummary {
    /// Resolved course title.
    pub course_title: String,
    /// Lectures that had tasks scheduled this run.
    pub lectures_planned: usize,
    /// Lectures skipped because their media file already exists.
    pub lectures_skipped: usize,
    /// Lectures that failed before any download task was created.
    pub lecture_failures: Vec<LectureFailure>,
    /// Task-level statistics from the scheduler.
    pub stats: RunStats,
}

impl RunSummary {
    /// True when nothing failed anywhere in the run.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.lecture_failures.is_empty() && self.stats.failed() == 0
    }
}

/// Builds the shared HTTP client: cookie jar from the session, gzip,
/// a request timeout, and the tool's user agent.
///
/// # Errors
///
/// Propagates reqwest builder failures.
pub fn build_http_client(session: &SessionContext) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .cookie_provider(session.cookie_jar())
        .gzip(true)
        .timeout(REQUEST_TIMEOUT)
        .build()
}

/// Runs one complete download.
///
/// # Errors
///
/// Fatal setup failures only (bad course reference, catalog rejection,
/// invalid concurrency, empty selection). Per-lecture and per-task
/// failures land in the returned [`RunSummary`].
#[instrument(skip_all, fields(course = %config.course))]
pub async fn run(
    config: &DownloadConfig,
    session: &Arc<SessionContext>,
    progress: &ProgressSink,
    cancel: &CancellationToken,
) -> Result<RunSummary, PipelineError> {
    let client = build_http_client(session)?;

    let course_ref = CourseRef::parse(&config.course)?;
    let catalog = CatalogResolver::new(client.clone(), config.base_url.clone());
    let tree = catalog.resolve(&course_ref, session).await?;
    info!(
        course = %tree.title,
        chapters = tree.chapters.len(),
        lectures = tree.lecture_count(),
        "course resolved"
    );

    let tree = prune(tree, &config.chapters, &config.toggles);
    if tree.lecture_count() == 0 {
        return Err(PipelineError::EmptySelection {
            course: tree.title,
        });
    }

    let layout = CourseLayout::new(&config.output_root, &tree.title);
    let manifests = ManifestResolver::new(client.clone(), config.base_url.clone());
    let assembler = Arc::new(Assembler::new());

    let mut tasks: Vec<DownloadTask> = Vec::new();
    let mut lecture_failures = Vec::new();
    let mut lectures_planned = 0usize;
    let mut lectures_skipped = 0usize;

    for chapter in &tree.chapters {
        for asset in &chapter.assets {
            push_if_absent(&mut tasks, &asset.url, layout.chapter_asset_path(chapter, &asset.name));
        }

        for lecture in &chapter.lectures {
            if cancel.is_cancelled() {
                break;
            }
            let context = format!("{:02}/{:03} {}", chapter.index, lecture.index, lecture.title);

            match manifests.resolve(lecture, session, config.quality).await {
                Ok(variant) => {
                    let dest = layout.lecture_media_path(chapter, lecture, variant.container_ext());
                    if dest.exists() {
                        debug!(dest = %dest.display(), "media already present, skipping lecture");
                        lectures_skipped += 1;
                    } else {
                        push_media_tasks(&mut tasks, &variant, &dest);
                        lectures_planned += 1;
                    }
                }
                Err(e) => {
                    warn!(lecture = %context, error = %e, "lecture skipped");
                    lecture_failures.push(LectureFailure {
                        lecture: context.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            }

            push_side_tasks(&mut tasks, chapter, lecture, &layout);

            if let Some(quiz) = &lecture.quiz {
                if let Err(e) = write_quiz_sidecar(&assembler, &layout.quiz_path(chapter, lecture), quiz) {
                    warn!(lecture = %context, error = %e, "quiz sidecar failed");
                    lecture_failures.push(LectureFailure {
                        lecture: context,
                        reason: e,
                    });
                }
            }
        }
    }

    debug!(tasks = tasks.len(), "task list built");

    let scheduler = Scheduler::new(
        config.concurrency,
        RetryPolicy::with_max_attempts(config.max_attempts),
    )?;
    let stats = scheduler
        .run(tasks, &client, session, &assembler, progress, cancel)
        .await?;

    Ok(RunSummary {
        course_title: tree.title,
        lectures_planned,
        lectures_skipped,
        lecture_failures,
        stats,
    })
}

/// Expands a resolved variant into segment tasks for `dest`.
fn push_media_tasks(tasks: &mut Vec<DownloadTask>, variant: &ManifestVariant, dest: &Path) {
    match &variant.source {
        VariantSource::Progressive { url } => tasks.push(DownloadTask {
            url: url.clone(),
            byte_range: None,
            kind: TaskKind::Segment {
                dest: dest.to_path_buf(),
                sequence: 0,
                total: 1,
                key: None,
            },
        }),
        VariantSource::Segmented { segments } => {
            let total = segments.len() as u64;
            for segment in segments {
                tasks.push(DownloadTask {
                    url: segment.url.clone(),
                    byte_range: segment.byte_range,
                    kind: TaskKind::Segment {
                        dest: dest.to_path_buf(),
                        sequence: segment.sequence,
                        total,
                        key: segment.key.clone(),
                    },
                });
            }
        }
    }
}

/// Queues caption and asset tasks for one lecture. Selection already
/// stripped anything the toggles exclude.
fn push_side_tasks(
    tasks: &mut Vec<DownloadTask>,
    chapter: &Chapter,
    lecture: &Lecture,
    layout: &CourseLayout,
) {
    for caption in &lecture.captions {
        let dest = layout.caption_path(chapter, lecture, &caption.lang, &caption.url);
        if !dest.exists() {
            tasks.push(DownloadTask {
                url: caption.url.clone(),
                byte_range: None,
                kind: TaskKind::Caption { dest },
            });
        }
    }
    for asset in &lecture.assets {
        push_if_absent(
            tasks,
            &asset.url,
            layout.lecture_asset_path(chapter, lecture, &asset.name),
        );
    }
}

fn push_if_absent(tasks: &mut Vec<DownloadTask>, url: &str, dest: std::path::PathBuf) {
    if !dest.exists() {
        tasks.push(DownloadTask {
            url: url.to_string(),
            byte_range: None,
            kind: TaskKind::Asset { dest },
        });
    }
}

/// Serializes and atomically writes a lecture's quiz JSON sidecar.
fn write_quiz_sidecar(
    assembler: &Assembler,
    dest: &Path,
    quiz: &serde_json::Value,
) -> Result<(), String> {
    if dest.exists() {
        return Ok(());
    }
    let body = serde_json::to_vec_pretty(quiz).map_err(|e| e.to_string())?;
    assembler.write_whole(dest, &body).map_err(|e| e.to_string())
}
