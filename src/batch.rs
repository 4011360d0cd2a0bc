//! Batch job driver.
//!
//! A batch walks the supported images of one folder in file-name order and
//! writes a watermarked copy of each into an output folder. Per-file failures
//! are recorded and never stop the run; failures while preparing the
//! watermark stop it before any file is touched.
//!
//! [`run`] drives a batch on the calling thread. [`spawn`] runs the same loop
//! on a dedicated worker thread and hands back a [`BatchHandle`] for
//! progress, cancellation and the final [`BatchReport`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::{is_supported_image, ProcessOptions, WatermarkEngine};
use crate::error::{Error, ErrorKind, Result};
use crate::geometry::SizePercent;
use crate::opacity::OpacityPercent;
use crate::watermark::WatermarkSpec;

/// Everything needed to run one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    /// Folder to read source images from.
    pub input_dir: PathBuf,
    /// Folder to write watermarked images to.
    pub output_dir: PathBuf,
    /// The watermark to apply.
    pub watermark: WatermarkSpec,
    /// Watermark size relative to each image.
    pub size: SizePercent,
    /// Requested watermark opacity.
    pub opacity: OpacityPercent,
    /// Engine knobs.
    #[serde(default)]
    pub options: ProcessOptions,
}

/// Lifecycle of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BatchState {
    /// Not started yet.
    Idle = 0,
    /// Processing files.
    Running = 1,
    /// Every file was visited.
    Completed = 2,
    /// Stopped early on request.
    Cancelled = 3,
}

impl BatchState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Cancelled,
            _ => Self::Idle,
        }
    }
}

/// Outcome of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    /// Watermarked and written.
    Success,
    /// Skipped because of an error.
    Failed {
        /// Error classification.
        kind: ErrorKind,
        /// Human-readable reason.
        reason: String,
    },
}

/// Result of processing a single image file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobResult {
    /// Path of the source file.
    pub path: PathBuf,
    /// What happened to it.
    #[serde(flatten)]
    pub status: JobStatus,
}

impl JobResult {
    /// The file name, or the full path if it has none.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path.file_name().map_or_else(
            || self.path.display().to_string(),
            |f| f.to_string_lossy().to_string(),
        )
    }

    /// Whether the file was written.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}

/// Aggregate outcome of a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// `Completed` or `Cancelled`.
    pub state: BatchState,
    /// Number of supported files found in the input folder.
    pub total: usize,
    /// Number of files written successfully.
    pub succeeded: usize,
    /// One entry per visited file, in processing order.
    pub results: Vec<JobResult>,
}

impl BatchReport {
    /// Number of visited files that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded
    }

    /// `(file name, reason)` for every failed file.
    #[must_use]
    pub fn failures(&self) -> Vec<(String, String)> {
        self.results
            .iter()
            .filter_map(|r| match &r.status {
                JobStatus::Failed { reason, .. } => Some((r.file_name(), reason.clone())),
                JobStatus::Success => None,
            })
            .collect()
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = format!(
            "Processed {} of {} file(s): {} succeeded, {} failed",
            self.results.len(),
            self.total,
            self.succeeded,
            self.failed()
        );
        if self.state == BatchState::Cancelled {
            line.push_str(" (cancelled)");
        }
        line
    }
}

/// Progress update, sent after each file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// 1-based index of the file just processed.
    pub current: usize,
    /// Total number of files in the batch.
    pub total: usize,
    /// The file just processed.
    pub path: PathBuf,
}

/// Poll-based cancellation flag shared between a caller and a running batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the batch to stop after the current file.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run a batch on the calling thread.
///
/// `progress` is called after every file. Cancellation is checked between
/// files; a cancelled run returns the results gathered so far.
///
/// # Errors
///
/// Returns watermark preparation errors and [`Error::Directory`] if the input
/// folder cannot be listed or the output folder created.
pub fn run(
    job: &JobDescription,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<BatchReport> {
    run_with_state(job, cancel, progress, &AtomicU8::new(BatchState::Idle as u8))
}

fn run_with_state(
    job: &JobDescription,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(Progress),
    state: &AtomicU8,
) -> Result<BatchReport> {
    let engine = WatermarkEngine::new(&job.watermark, job.size, job.opacity, job.options)?;
    let files = list_images(&job.input_dir)?;
    std::fs::create_dir_all(&job.output_dir).map_err(|source| Error::Directory {
        path: job.output_dir.clone(),
        source,
    })?;

    let total = files.len();
    info!(
        input = %job.input_dir.display(),
        output = %job.output_dir.display(),
        total,
        "starting batch"
    );
    state.store(BatchState::Running as u8, Ordering::SeqCst);

    let mut report = BatchReport {
        state: BatchState::Running,
        total,
        succeeded: 0,
        results: Vec::with_capacity(total),
    };

    for (i, input) in files.into_iter().enumerate() {
        if cancel.is_cancelled() {
            info!(processed = i, total, "batch cancelled");
            report.state = BatchState::Cancelled;
            break;
        }

        let output = match input.file_name() {
            Some(name) => job.output_dir.join(name),
            None => continue,
        };
        let status = match engine.process_file(&input, &output) {
            Ok(()) => {
                debug!(file = %input.display(), "watermarked");
                report.succeeded += 1;
                JobStatus::Success
            }
            Err(e) => {
                warn!(file = %input.display(), "failed: {e}");
                JobStatus::Failed {
                    kind: e.kind(),
                    reason: e.to_string(),
                }
            }
        };
        report.results.push(JobResult {
            path: input.clone(),
            status,
        });
        progress(Progress {
            current: i + 1,
            total,
            path: input,
        });
    }

    if report.state == BatchState::Running {
        report.state = BatchState::Completed;
    }
    state.store(report.state as u8, Ordering::SeqCst);
    info!(
        succeeded = report.succeeded,
        failed = report.failed(),
        "batch finished"
    );
    Ok(report)
}

/// Supported image files directly inside `dir`, sorted by file name.
///
/// # Errors
///
/// Returns [`Error::Directory`] if `dir` cannot be read.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|source| Error::Directory {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_ok_and(|ft| ft.is_file()))
        .map(|e| e.path())
        .filter(|p| is_supported_image(p))
        .collect();
    files.sort();
    Ok(files)
}

/// A batch running on its own worker thread.
pub struct BatchHandle {
    cancel: CancelToken,
    progress: Receiver<Progress>,
    state: Arc<AtomicU8>,
    worker: JoinHandle<Result<BatchReport>>,
}

impl BatchHandle {
    /// Request cancellation; the worker stops before its next file.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Progress updates, in order. Disconnects when the worker finishes.
    #[must_use]
    pub fn progress(&self) -> &Receiver<Progress> {
        &self.progress
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BatchState {
        BatchState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether the worker has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker and return its report.
    ///
    /// # Errors
    ///
    /// Returns the batch-fatal error, or [`Error::Io`] if the worker panicked.
    pub fn join(self) -> Result<BatchReport> {
        self.worker
            .join()
            .unwrap_or_else(|_| Err(Error::Io(std::io::Error::other("batch worker panicked"))))
    }
}

/// Start a batch on a dedicated worker thread.
///
/// # Errors
///
/// Returns [`Error::Io`] if the thread cannot be spawned.
pub fn spawn(job: JobDescription) -> Result<BatchHandle> {
    let cancel = CancelToken::new();
    let state = Arc::new(AtomicU8::new(BatchState::Idle as u8));
    let (tx, rx) = mpsc::channel();

    let worker = {
        let cancel = cancel.clone();
        let state = Arc::clone(&state);
        thread::Builder::new()
            .name("watermark-batch".to_string())
            .spawn(move || {
                run_with_state(
                    &job,
                    &cancel,
                    &mut |p| {
                        // receiver may already be gone
                        let _ = tx.send(p);
                    },
                    &state,
                )
            })?
    };

    Ok(BatchHandle {
        cancel,
        progress: rx,
        state,
        worker,
    })
}
