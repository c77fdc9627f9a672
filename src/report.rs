//! Progress UI for download runs.

use std::time::Duration;

use coursedl_core::ProgressEvent;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;

/// Spawns the progress UI task consuming scheduler events.
///
/// Returns `None` when the bar is disabled; the receiver is dropped and
/// the scheduler's sink silently discards events. The task ends when the
/// sending side closes.
pub(crate) fn spawn_progress_ui(
    use_bar: bool,
    rx: UnboundedReceiver<ProgressEvent>,
) -> Option<tokio::task::JoinHandle<()>> {
    if !use_bar {
        return None;
    }
    Some(spawn_bar_inner(rx))
}

fn spawn_bar_inner(mut rx: UnboundedReceiver<ProgressEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        let mut failed = 0u64;
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::RunStarted { total_tasks } => {
                    bar.set_length(total_tasks as u64);
                    bar.set_position(0);
                }
                ProgressEvent::Started { label } => {
                    bar.set_message(label);
                }
                ProgressEvent::Retried { label, attempt, .. } => {
                    bar.set_message(format!("{label} (retry {attempt})"));
                }
                ProgressEvent::Completed { .. } => {
                    bar.inc(1);
                }
                ProgressEvent::Failed { label, .. } => {
                    failed += 1;
                    bar.inc(1);
                    bar.set_message(format!("{label} FAILED ({failed} so far)"));
                }
                ProgressEvent::LecturePersisted { path } => {
                    if let Some(name) = path.file_name() {
                        bar.println(format!("done: {}", name.to_string_lossy()));
                    }
                }
            }
        }

        bar.finish_and_clear();
    })
}
