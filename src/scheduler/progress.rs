//! Progress events emitted by the scheduler.
//!
//! Events flow over an unbounded channel to whatever front end is
//! listening; a closed or absent receiver never stalls a download.

use std::time::Duration;

use tokio::sync::mpsc;

/// One observable step in a run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The run has been sized: total task count is known.
    RunStarted {
        /// Number of tasks the scheduler will execute.
        total_tasks: usize,
    },

    /// A task started its first attempt.
    Started {
        /// Task label.
        label: String,
    },

    /// A task failed transiently and will be retried.
    Retried {
        /// Task label.
        label: String,
        /// Attempt number about to run (1-indexed).
        attempt: u32,
        /// Backoff delay before the attempt.
        delay: Duration,
    },

    /// A task finished successfully.
    Completed {
        /// Task label.
        label: String,
        /// Bytes written for this task.
        bytes: u64,
    },

    /// A task failed for good.
    Failed {
        /// Task label.
        label: String,
        /// Final error rendered for display.
        reason: String,
    },

    /// A lecture's media file was fully reassembled and persisted.
    LecturePersisted {
        /// Final media path.
        path: std::path::PathBuf,
    },
}

/// Sending half for progress events.
///
/// Cloneable and infallible: if nobody is listening, events are dropped.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    /// Creates a connected sink and its receiving end.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Creates a sink that discards every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emits an event, ignoring a closed receiver.
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_delivers_events() {
        let (sink, mut rx) = ProgressSink::channel();
        sink.emit(ProgressEvent::Started {
            label: "a".to_string(),
        });
        sink.emit(ProgressEvent::Completed {
            label: "a".to_string(),
            bytes: 42,
        });

        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::Started { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::Completed { bytes: 42, .. }
        ));
    }

    #[tokio::test]
    async fn test_disabled_sink_swallows_events() {
        let sink = ProgressSink::disabled();
        sink.emit(ProgressEvent::RunStarted { total_tasks: 3 });
    }

    #[tokio::test]
    async fn test_closed_receiver_does_not_error() {
        let (sink, rx) = ProgressSink::channel();
        drop(rx);
        sink.emit(ProgressEvent::RunStarted { total_tasks: 1 });
    }
}
