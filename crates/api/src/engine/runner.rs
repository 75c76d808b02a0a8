//! Drives one admitted job through the engine.

use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use semi_core::job_status::{JobMode, JobStatus};
use semi_pipeline::{BatchObserver, BatchRequest, EngineError, InputFailure, InputOutcome, ProcessingEngine};
use tokio::task::JoinError;

use super::packager::{self, DownloadLease};
use super::record::{is_downloadable, JobEntry, JobResult, SharedEntry};

/// Writes each input's outcome into the job record as it happens.
struct RecordObserver<'a> {
    entry: &'a JobEntry,
}

impl BatchObserver for RecordObserver<'_> {
    fn on_progress(&mut self, outcome: InputOutcome<'_>) -> ControlFlow<()> {
        let result = JobResult {
            input: display_name(outcome.input),
            error: outcome.error.map(str::to_owned),
            output: outcome.output.map(Path::to_path_buf),
        };
        tracing::debug!(
            job_id = %self.entry.id,
            input = %result.input,
            index = outcome.index,
            total = outcome.total,
            ok = result.succeeded(),
            "Input finished",
        );
        self.entry.lock().record_result(result, Utc::now())
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Run `entry` to a terminal status.
///
/// The job must be `waiting`; anything else means it was cancelled after
/// admission and the runner returns without touching it. `slot` is dropped
/// as soon as the job is terminal, before its bundle is built.
pub async fn run<S: Send>(entry: SharedEntry, engine: Arc<dyn ProcessingEngine>, slot: S) {
    {
        let mut record = entry.lock();
        if record.status != JobStatus::Waiting {
            tracing::debug!(job_id = %entry.id, status = %record.status, "Job not started");
            return;
        }
        if let Err(e) = record.transition(JobStatus::Running, Utc::now()) {
            tracing::error!(job_id = %entry.id, error = %e, "Cannot start job");
            return;
        }
        record.message = "Processing".to_string();
    }

    tracing::info!(
        job_id = %entry.id,
        mode = entry.mode.as_str(),
        inputs = entry.total(),
        "Job started",
    );

    let job = entry.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let request = BatchRequest {
            inputs: &job.inputs,
            config: &job.config,
            output_dir: job.workspace.engine_output_dir(),
            preview: job.preview,
        };
        let mut observer = RecordObserver { entry: &job };
        engine.process_batch(&request, &job.cancel, &mut observer)
    })
    .await;

    finish(&entry, outcome, slot).await;
}

/// Final transition, then packaging for jobs that have something to
/// download. A lease is held from before the transition until the bundle is
/// written; the admission slot only until the transition.
async fn finish<S>(
    entry: &SharedEntry,
    outcome: Result<Result<Vec<InputFailure>, EngineError>, JoinError>,
    slot: S,
) {
    let lease = match DownloadLease::acquire(entry) {
        Ok(lease) => lease,
        Err(e) => {
            tracing::error!(job_id = %entry.id, error = %e, "Job vanished while running");
            return;
        }
    };

    let downloadable = {
        let mut record = entry.lock();
        let (next, message, failure) = match outcome {
            Ok(Ok(_)) if record.results.len() == entry.total() => {
                (JobStatus::Done, "Completed".to_string(), None)
            }
            Ok(Ok(_)) if record.cancel_requested => (JobStatus::Cancelled, "Cancelled".to_string(), None),
            Ok(Ok(_)) => {
                let reason = "Engine stopped before all inputs were processed".to_string();
                (JobStatus::Error, format!("Processing failed: {reason}"), Some(reason))
            }
            Ok(Err(e)) => (JobStatus::Error, format!("Processing failed: {e}"), Some(e.to_string())),
            Err(e) => {
                let reason = if e.is_panic() {
                    "Engine panicked".to_string()
                } else {
                    format!("Engine task failed: {e}")
                };
                (JobStatus::Error, format!("Processing failed: {reason}"), Some(reason))
            }
        };

        if let Err(e) = record.transition(next, Utc::now()) {
            tracing::error!(job_id = %entry.id, error = %e, "Cannot finish job");
            return;
        }
        record.message = message;
        record.failure = failure;

        match next {
            JobStatus::Error => tracing::error!(
                job_id = %entry.id,
                error = record.failure.as_deref().unwrap_or_default(),
                processed = record.results.len(),
                "Job failed",
            ),
            _ => tracing::info!(
                job_id = %entry.id,
                status = %next,
                outputs = record.output_count(),
                errors = record.error_count(),
                "Job finished",
            ),
        }

        is_downloadable(entry.mode, &record)
    };
    drop(slot);

    if downloadable {
        // Failure is logged by the packager; the download retries the build.
        let _ = packager::ensure_artifact(entry).await;
    } else if entry.mode == JobMode::Normal {
        tracing::debug!(job_id = %entry.id, "Nothing to package");
    }
    drop(lease);
}
