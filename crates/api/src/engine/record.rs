//! One submission's state.
//!
//! [`JobEntry`] holds what never changes after submission (inputs, config,
//! workspace) next to a mutex-protected [`JobRecord`] with everything that
//! does. Every mutation goes through the record lock, so readers always see
//! a consistent snapshot.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use semi_core::error::CoreError;
use semi_core::job_status::{JobMode, JobStatus};
use semi_core::processing_config::{PreviewOptions, ProcessingConfig};
use semi_core::types::{JobId, Timestamp};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::packager::Artifact;

/// Staging directories of one job.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Removed by the reaper, together with everything below it.
    pub root: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Preview outputs live outside `root` and are cleaned up by the caller.
    pub preview_dir: Option<PathBuf>,
}

impl Workspace {
    pub fn bundle_path(&self) -> PathBuf {
        self.root.join("bundle.zip")
    }

    /// Where the engine writes for this job.
    pub fn engine_output_dir(&self) -> &Path {
        self.preview_dir.as_deref().unwrap_or(&self.output_dir)
    }
}

/// Per-input outcome, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobResult {
    pub input: String,
    pub error: Option<String>,
    #[serde(skip)]
    pub output: Option<PathBuf>,
}

impl JobResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Mutable part of a job. Only reachable through [`JobEntry::lock`].
#[derive(Debug)]
pub struct JobRecord {
    pub status: JobStatus,
    pub message: String,
    pub results: Vec<JobResult>,
    /// Set at most once, never cleared.
    pub cancel_requested: bool,
    /// Engine fault retained for diagnostics.
    pub failure: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    /// Outstanding download leases. A job with leases is never reaped.
    pub leases: usize,
    /// Set by the reaper when the job is removed from the store.
    pub reaped: bool,
    pub previews_cleared: bool,
}

impl JobRecord {
    fn new(now: Timestamp) -> Self {
        Self {
            status: JobStatus::Queued,
            message: "Queued".to_string(),
            results: Vec::new(),
            cancel_requested: false,
            failure: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            leases: 0,
            reaped: false,
            previews_cleared: false,
        }
    }

    /// Move to `next`, stamping `started_at`/`finished_at` as appropriate.
    pub fn transition(&mut self, next: JobStatus, now: Timestamp) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Job cannot move from {} to {next}",
                self.status
            )));
        }
        self.status = next;
        self.updated_at = now;
        if next == JobStatus::Waiting {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    /// Append one input's outcome and report whether the batch may continue.
    ///
    /// Appending and reading `cancel_requested` happen under the same lock,
    /// which is what makes cancellation resolve at input boundaries.
    pub fn record_result(&mut self, result: JobResult, now: Timestamp) -> ControlFlow<()> {
        self.message = match &result.error {
            None => format!("Processed {}", result.input),
            Some(err) => format!("Failed {}: {err}", result.input),
        };
        self.results.push(result);
        self.updated_at = now;
        if self.cancel_requested {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    pub fn output_count(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    pub fn error_count(&self) -> usize {
        self.results.len() - self.output_count()
    }

    /// Terminal, past `ttl` and not leased.
    pub fn is_reapable(&self, now: Timestamp, ttl: chrono::Duration) -> bool {
        self.status.is_terminal()
            && self.leases == 0
            && self
                .finished_at
                .is_some_and(|finished| now - finished > ttl)
    }
}

/// A job as held by the store.
#[derive(Debug)]
pub struct JobEntry {
    pub id: JobId,
    pub mode: JobMode,
    pub inputs: Vec<PathBuf>,
    pub config: ProcessingConfig,
    pub preview: Option<PreviewOptions>,
    pub workspace: Workspace,
    /// Fired when a running job is cancelled; the engine checks it between
    /// inputs.
    pub cancel: CancellationToken,
    /// The download bundle, built at most once.
    pub artifact: OnceCell<Artifact>,
    record: Mutex<JobRecord>,
}

impl JobEntry {
    pub fn new(
        id: JobId,
        inputs: Vec<PathBuf>,
        config: ProcessingConfig,
        preview: Option<PreviewOptions>,
        workspace: Workspace,
    ) -> Self {
        let mode = if preview.is_some() {
            JobMode::Preview
        } else {
            JobMode::Normal
        };
        Self {
            id,
            mode,
            inputs,
            config,
            preview,
            workspace,
            cancel: CancellationToken::new(),
            artifact: OnceCell::new(),
            record: Mutex::new(JobRecord::new(Utc::now())),
        }
    }

    /// Lock the record. A panic while holding the lock leaves the record
    /// as it was at the panic, which is still a valid state.
    pub fn lock(&self) -> MutexGuard<'_, JobRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn total(&self) -> usize {
        self.inputs.len()
    }

    /// Consistent snapshot for API responses.
    pub fn view(&self) -> JobView {
        let record = self.lock();
        JobView::build(self, &record)
    }
}

/// Handle to share entries between the store, runners and handlers.
pub type SharedEntry = Arc<JobEntry>;

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub percent: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewLink {
    pub index: usize,
    pub input: String,
    pub url: String,
}

/// Client-facing job status.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub mode: JobMode,
    pub message: String,
    pub progress: Progress,
    pub results: Vec<JobResult>,
    pub output_count: usize,
    pub error_count: usize,
    pub cancel_requested: bool,
    pub can_cancel: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub failure: Option<String>,
    /// Present once a bundle can be downloaded.
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub previews: Vec<PreviewLink>,
}

impl JobView {
    fn build(entry: &JobEntry, record: &JobRecord) -> Self {
        let current = record.results.len();
        let total = entry.total();
        let percent = if total == 0 {
            0
        } else {
            (current * 100 / total) as u32
        };

        let download_url = is_downloadable(entry.mode, record)
            .then(|| urls::download(entry.id));

        let previews = if entry.mode == JobMode::Preview && !record.previews_cleared {
            record
                .results
                .iter()
                .enumerate()
                .filter(|(_, r)| r.output.is_some())
                .map(|(index, r)| PreviewLink {
                    index,
                    input: r.input.clone(),
                    url: urls::preview(entry.id, index),
                })
                .collect()
        } else {
            Vec::new()
        };

        Self {
            job_id: entry.id,
            status: record.status,
            mode: entry.mode,
            message: record.message.clone(),
            progress: Progress {
                current,
                total,
                percent,
            },
            results: record.results.clone(),
            output_count: record.output_count(),
            error_count: record.error_count(),
            cancel_requested: record.cancel_requested,
            can_cancel: record.status.can_cancel(),
            queue_position: None,
            created_at: record.created_at,
            updated_at: record.updated_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
            failure: record.failure.clone(),
            download_url,
            previews,
        }
    }
}

/// `done`, or `cancelled` with at least one result, for normal jobs.
pub fn is_downloadable(mode: JobMode, record: &JobRecord) -> bool {
    mode == JobMode::Normal
        && match record.status {
            JobStatus::Done => true,
            JobStatus::Cancelled => !record.results.is_empty(),
            _ => false,
        }
}

/// Client-facing URLs for a job.
pub mod urls {
    use semi_core::types::JobId;

    pub fn status(id: JobId) -> String {
        format!("/api/jobs/{id}")
    }

    pub fn cancel(id: JobId) -> String {
        format!("/api/jobs/{id}/cancel")
    }

    pub fn download(id: JobId) -> String {
        format!("/api/jobs/{id}/download")
    }

    pub fn preview(id: JobId, index: usize) -> String {
        format!("/api/jobs/{id}/previews/{index}")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;

    pub(crate) fn entry(inputs: &[&str], preview: Option<PreviewOptions>) -> JobEntry {
        let root = PathBuf::from("/tmp/semi_web_job_test");
        JobEntry::new(
            JobId::new(),
            inputs.iter().map(|n| root.join("input").join(n)).collect(),
            ProcessingConfig::default(),
            preview,
            Workspace {
                input_dir: root.join("input"),
                output_dir: root.join("output"),
                preview_dir: None,
                root,
            },
        )
    }

    fn ok(name: &str) -> JobResult {
        JobResult {
            input: name.to_string(),
            error: None,
            output: Some(PathBuf::from(name)),
        }
    }

    fn failed(name: &str) -> JobResult {
        JobResult {
            input: name.to_string(),
            error: Some("cannot decode".to_string()),
            output: None,
        }
    }

    #[test]
    fn new_job_is_queued_with_empty_progress() {
        let view = entry(&["a.jpg", "b.jpg"], None).view();
        assert_eq!(view.status, JobStatus::Queued);
        assert_eq!(view.progress.current, 0);
        assert_eq!(view.progress.total, 2);
        assert!(view.can_cancel);
        assert!(view.download_url.is_none());
    }

    #[test]
    fn admission_stamps_started_at() {
        let entry = entry(&["a.jpg"], None);
        let mut record = entry.lock();
        record.transition(JobStatus::Waiting, Utc::now()).unwrap();
        assert!(record.started_at.is_some());
        assert!(record.finished_at.is_none());
    }

    #[test]
    fn terminal_transition_stamps_finished_at() {
        let entry = entry(&["a.jpg"], None);
        let mut record = entry.lock();
        record.transition(JobStatus::Cancelled, Utc::now()).unwrap();
        assert!(record.finished_at.is_some());
        assert_matches!(
            record.transition(JobStatus::Waiting, Utc::now()),
            Err(CoreError::Conflict(_))
        );
    }

    #[test]
    fn results_track_current() {
        let entry = entry(&["a.jpg", "b.jpg", "c.jpg"], None);
        let mut record = entry.lock();
        let now = Utc::now();
        assert!(record.record_result(ok("a.jpg"), now).is_continue());
        assert!(record.record_result(failed("b.jpg"), now).is_continue());
        assert_eq!(record.results.len(), 2);
        assert_eq!(record.output_count(), 1);
        assert_eq!(record.error_count(), 1);
        assert_eq!(record.message, "Failed b.jpg: cannot decode");
    }

    #[test]
    fn cancel_flag_breaks_after_recording() {
        let entry = entry(&["a.jpg", "b.jpg"], None);
        let mut record = entry.lock();
        record.cancel_requested = true;
        assert!(record.record_result(ok("a.jpg"), Utc::now()).is_break());
        assert_eq!(record.results.len(), 1);
    }

    #[test]
    fn download_readiness() {
        let entry = entry(&["a.jpg"], None);
        let mut record = entry.lock();
        let now = Utc::now();
        record.transition(JobStatus::Waiting, now).unwrap();
        record.transition(JobStatus::Running, now).unwrap();
        assert!(!is_downloadable(JobMode::Normal, &record));

        record.transition(JobStatus::Cancelling, now).unwrap();
        record.transition(JobStatus::Cancelled, now).unwrap();
        assert!(!is_downloadable(JobMode::Normal, &record), "no results yet");

        record.results.push(ok("a.jpg"));
        assert!(is_downloadable(JobMode::Normal, &record));
        assert!(!is_downloadable(JobMode::Preview, &record));
    }

    #[test]
    fn reapable_only_when_terminal_expired_and_unleased() {
        let entry = entry(&["a.jpg"], None);
        let mut record = entry.lock();
        let ttl = chrono::Duration::seconds(60);
        let finished = Utc::now();
        assert!(!record.is_reapable(finished + chrono::Duration::hours(1), ttl));

        record.transition(JobStatus::Cancelled, finished).unwrap();
        assert!(!record.is_reapable(finished + chrono::Duration::seconds(60), ttl));
        assert!(record.is_reapable(finished + chrono::Duration::seconds(61), ttl));

        record.leases = 1;
        assert!(!record.is_reapable(finished + chrono::Duration::hours(1), ttl));
    }

    #[test]
    fn preview_view_lists_outputs() {
        let entry = entry(&["a.jpg", "b.jpg"], Some(PreviewOptions::default()));
        {
            let mut record = entry.lock();
            let now = Utc::now();
            let _ = record.record_result(ok("a.jpg"), now);
            let _ = record.record_result(failed("b.jpg"), now);
        }
        let view = entry.view();
        assert_eq!(view.mode, JobMode::Preview);
        assert_eq!(view.previews.len(), 1);
        assert_eq!(view.previews[0].url, urls::preview(entry.id, 0));
    }

    #[test]
    fn view_serializes_results_without_paths() {
        let entry = entry(&["a.jpg"], None);
        let _ = entry.lock().record_result(ok("a.jpg"), Utc::now());
        let json = serde_json::to_value(entry.view()).unwrap();
        assert_eq!(json["results"][0], serde_json::json!({"input": "a.jpg", "error": null}));
        assert_eq!(json["progress"]["percent"], 100);
        assert_eq!(json["status"], "queued");
    }
}
