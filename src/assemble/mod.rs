//! Ordered output assembly.
//!
//! Segments arrive in whatever order the scheduler completes them; the
//! [`Assembler`] buffers out-of-order arrivals per lecture and writes only
//! contiguous prefixes to a temp file next to the destination. The final
//! media file appears under its real name only via an atomic rename after
//! the last segment lands, so a crash can never leave a truncated file
//! masquerading as a finished lecture.

mod layout;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;
use dashmap::DashMap;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, instrument};

pub use layout::{CourseLayout, sanitize_component};

/// Errors assembling output files.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// Filesystem failure while writing or renaming.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Segment sequence outside the declared total.
    #[error("segment {sequence} out of range for {path} (total {total})")]
    OutOfRange {
        /// Destination the segment was aimed at.
        path: PathBuf,
        /// The offending sequence number.
        sequence: u64,
        /// Declared segment total.
        total: u64,
    },

    /// A destination path has no parent directory.
    #[error("destination {path} has no parent directory")]
    NoParent {
        /// The offending destination.
        path: PathBuf,
    },
}

impl AssembleError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Outcome of accepting one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssembleOutcome {
    /// The segment was buffered or written; the lecture is still incomplete.
    Pending,
    /// The last segment landed; the final file now exists under `dest`.
    Persisted {
        /// Total media bytes written.
        bytes: u64,
    },
}

/// Per-lecture reassembly state.
#[derive(Debug)]
struct LectureBuffer {
    total: u64,
    next_write: u64,
    pending: BTreeMap<u64, Bytes>,
    file: Option<NamedTempFile>,
    bytes_written: u64,
}

/// Reassembles segment streams into final files, in order, atomically.
///
/// Thread-safe: the scheduler calls in from many tasks at once. State for
/// a lecture exists only between its first segment and its persist.
#[derive(Debug, Default)]
pub struct Assembler {
    lectures: DashMap<PathBuf, Mutex<LectureBuffer>>,
}

impl Assembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts one decrypted segment for `dest`.
    ///
    /// Duplicate deliveries of an already-written sequence are ignored.
    ///
    /// # Errors
    ///
    /// [`AssembleError::OutOfRange`] for a sequence at or past `total`,
    /// plus I/O errors creating, writing, or renaming the temp file.
    #[instrument(level = "debug", skip(self, data), fields(dest = %dest.display(), sequence, len = data.len()))]
    pub fn accept_segment(
        &self,
        dest: &Path,
        total: u64,
        sequence: u64,
        data: Bytes,
    ) -> Result<AssembleOutcome, AssembleError> {
        if sequence >= total {
            return Err(AssembleError::OutOfRange {
                path: dest.to_path_buf(),
                sequence,
                total,
            });
        }

        let entry = self
            .lectures
            .entry(dest.to_path_buf())
            .or_insert_with(|| {
                Mutex::new(LectureBuffer {
                    total,
                    next_write: 0,
                    pending: BTreeMap::new(),
                    file: None,
                    bytes_written: 0,
                })
            });

        let mut buffer = match entry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if sequence < buffer.next_write || buffer.pending.contains_key(&sequence) {
            debug!("duplicate segment delivery ignored");
            return Ok(AssembleOutcome::Pending);
        }
        buffer.pending.insert(sequence, data);

        // Flush the contiguous prefix.
        while let Some(chunk) = {
            let next = buffer.next_write;
            buffer.pending.remove(&next)
        } {
            if buffer.file.is_none() {
                buffer.file = Some(create_temp_beside(dest)?);
            }
            if let Some(file) = buffer.file.as_mut() {
                file.write_all(&chunk)
                    .map_err(|e| AssembleError::io(dest, e))?;
            }
            buffer.bytes_written += chunk.len() as u64;
            buffer.next_write += 1;
        }

        if buffer.next_write == buffer.total {
            let bytes = buffer.bytes_written;
            let file = buffer.file.take();
            drop(buffer);
            drop(entry);
            self.lectures.remove(dest);

            if let Some(file) = file {
                file.persist(dest)
                    .map_err(|e| AssembleError::io(dest, e.error))?;
            }
            debug!(bytes, "lecture media persisted");
            return Ok(AssembleOutcome::Persisted { bytes });
        }

        Ok(AssembleOutcome::Pending)
    }

    /// Writes a single-blob file (caption, asset, progressive media treated
    /// as one segment goes through [`Self::accept_segment`] instead) via a
    /// temp file and atomic rename.
    ///
    /// # Errors
    ///
    /// I/O errors creating, writing, or renaming the temp file.
    #[instrument(level = "debug", skip(self, data), fields(dest = %dest.display(), len = data.len()))]
    pub fn write_whole(&self, dest: &Path, data: &[u8]) -> Result<(), AssembleError> {
        let mut file = create_temp_beside(dest)?;
        file.write_all(data)
            .map_err(|e| AssembleError::io(dest, e))?;
        file.persist(dest)
            .map_err(|e| AssembleError::io(dest, e.error))?;
        Ok(())
    }

    /// Number of lectures with in-flight reassembly state.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lectures.len()
    }
}

/// Creates a temp file in the destination's own directory, so the final
/// rename never crosses a filesystem boundary.
fn create_temp_beside(dest: &Path) -> Result<NamedTempFile, AssembleError> {
    let parent = dest.parent().ok_or_else(|| AssembleError::NoParent {
        path: dest.to_path_buf(),
    })?;
    std::fs::create_dir_all(parent).map_err(|e| AssembleError::io(parent, e))?;
    NamedTempFile::new_in(parent).map_err(|e| AssembleError::io(parent, e))
}
