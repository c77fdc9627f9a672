//! CLI entry point for the course downloader.

use std::fs::File;
use std::io::{BufReader, IsTerminal};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use coursedl_core::{
    ChapterSpec, ContentToggles, DownloadConfig, ProgressSink, SessionContext, pipeline,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

mod cli;
mod report;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Log level priority: RUST_LOG env var > quiet flag > verbose flag > default
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let base_url = Url::parse(&args.base_url)
        .with_context(|| format!("invalid base URL '{}'", args.base_url))?;

    let cookie_source = match &args.cookies {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("cannot open cookie file {}", path.display()))?;
            Some(BufReader::new(file))
        }
        None => None,
    };
    let key_source = match &args.keys {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("cannot read key file {}", path.display()))?,
        ),
        None => None,
    };

    let session = SessionContext::load(cookie_source, key_source.as_deref(), args.bearer.clone())
        .context("failed to build session")?;
    let session = Arc::new(session);

    let chapters = match &args.chapters {
        Some(spec) => ChapterSpec::parse(spec).context("invalid --chapters value")?,
        None => ChapterSpec::all(),
    };
    let toggles = ContentToggles {
        captions: !args.no_captions,
        assets: !args.no_assets,
        quizzes: !args.no_quizzes,
        caption_lang: args.caption_lang.clone(),
    };

    let mut config = DownloadConfig::new(&args.course, base_url);
    config.output_root = args.output.clone();
    config.quality = args.quality;
    config.chapters = chapters;
    config.toggles = toggles;
    config.concurrency = usize::from(args.concurrency);
    config.max_attempts = u32::from(args.max_attempts);

    // Progress bar on a terminal unless quiet; logs go to stderr either way.
    let use_bar = !args.quiet && std::io::stderr().is_terminal();
    let (progress, rx) = ProgressSink::channel();
    let ui = report::spawn_progress_ui(use_bar, rx);

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight downloads");
            ctrl_c_cancel.cancel();
        }
    });

    let summary = pipeline::run(&config, &session, &progress, &cancel).await?;
    drop(progress);
    if let Some(ui) = ui {
        let _ = ui.await;
    }

    info!(
        course = %summary.course_title,
        lectures = summary.lectures_planned,
        skipped = summary.lectures_skipped,
        completed = summary.stats.completed(),
        failed = summary.stats.failed(),
        retried = summary.stats.retried(),
        bytes = summary.stats.bytes(),
        "run complete"
    );

    for failure in &summary.lecture_failures {
        warn!(lecture = %failure.lecture, reason = %failure.reason, "lecture not downloaded");
    }
    for failure in summary.stats.failures() {
        warn!(task = %failure.label, reason = %failure.reason, "task failed");
    }

    if !summary.is_clean() {
        anyhow::bail!(
            "{} lecture(s) and {} task(s) failed",
            summary.lecture_failures.len(),
            summary.stats.failed()
        );
    }
    Ok(())
}
