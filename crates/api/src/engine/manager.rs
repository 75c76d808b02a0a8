//! Entry point for everything the HTTP layer does with jobs.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use semi_core::config_schema::ConfigSchema;
use semi_core::error::CoreError;
use semi_core::job_status::{JobMode, JobStatus};
use semi_core::processing_config::Submission;
use semi_core::types::JobId;
use semi_pipeline::ProcessingEngine;

use super::admission::AdmissionQueue;
use super::cancel::{self, CancelOutcome};
use super::packager::{self, Artifact, DownloadLease};
use super::record::{is_downloadable, JobEntry, JobView, SharedEntry, Workspace};
use super::runner;
use super::store::JobStore;
use crate::config::JobLimits;

/// A validated submission whose files are already staged.
#[derive(Debug)]
pub struct NewJob {
    pub id: JobId,
    pub inputs: Vec<PathBuf>,
    pub submission: Submission,
    pub workspace: Workspace,
}

/// An opened bundle, ready to stream. The lease lives as long as the value
/// (or the stream it is turned into).
#[derive(Debug)]
pub struct Download {
    pub job_id: JobId,
    pub artifact: Artifact,
    pub file: tokio::fs::File,
    pub lease: DownloadLease,
}

struct Inner {
    store: JobStore,
    admission: AdmissionQueue,
    engine: Arc<dyn ProcessingEngine>,
    limits: JobLimits,
}

/// Shared handle to the job store, admission queue and engine.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

/// Held by a runner until its job is terminal; gives the admission slot back
/// and admits the next queued job when dropped.
struct SlotGuard {
    inner: Arc<Inner>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.inner.admission.release();
        Inner::pump(&self.inner);
    }
}

impl Inner {
    /// Admit queued jobs while slots are free and spawn their runners.
    fn pump(this: &Arc<Self>) {
        let admitted = this.admission.admit(|id| {
            let entry = this.store.get(id)?;
            let mut record = entry.lock();
            if record.status != JobStatus::Queued {
                return None;
            }
            record.transition(JobStatus::Waiting, Utc::now()).ok()?;
            record.message = "Waiting for a worker".to_string();
            drop(record);
            Some(entry)
        });

        for entry in admitted {
            tracing::debug!(job_id = %entry.id, "Job admitted");
            let slot = SlotGuard {
                inner: Arc::clone(this),
            };
            let engine = Arc::clone(&this.engine);
            tokio::spawn(runner::run(entry, engine, slot));
        }
    }
}

impl JobManager {
    pub fn new(engine: Arc<dyn ProcessingEngine>, limits: JobLimits) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: JobStore::new(),
                admission: AdmissionQueue::new(limits.max_concurrent_jobs, limits.max_queued_jobs),
                engine,
                limits,
            }),
        }
    }

    pub fn limits(&self) -> &JobLimits {
        &self.inner.limits
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    pub fn config_schema(&self) -> ConfigSchema {
        self.inner.engine.config_schema()
    }

    /// Number of jobs holding an admission slot.
    pub fn running(&self) -> usize {
        self.inner.admission.running()
    }

    /// Number of jobs waiting for a slot.
    pub fn queued(&self) -> usize {
        self.inner.admission.queued()
    }

    /// Reject early when a submission could not be queued anyway.
    pub fn check_capacity(&self) -> Result<(), CoreError> {
        if self.inner.admission.has_capacity() {
            Ok(())
        } else {
            Err(CoreError::Unavailable(
                "Job queue is full, retry later".to_string(),
            ))
        }
    }

    /// Create `<work_dir>/semi_web_job_<id>/{input,output}`.
    pub async fn allocate_workspace(&self, id: JobId) -> io::Result<Workspace> {
        let root = self.inner.limits.work_dir.join(format!("semi_web_job_{id}"));
        let workspace = Workspace {
            input_dir: root.join("input"),
            output_dir: root.join("output"),
            preview_dir: None,
            root,
        };
        tokio::fs::create_dir_all(&workspace.input_dir).await?;
        tokio::fs::create_dir_all(&workspace.output_dir).await?;
        Ok(workspace)
    }

    /// Directory for a preview job's outputs. Survives the reaper.
    pub fn preview_dir(&self, id: JobId) -> PathBuf {
        self.inner.limits.work_dir.join("previews").join(id.to_string())
    }

    /// Remove a workspace. Missing directories are not an error.
    pub async fn discard_workspace(&self, workspace: &Workspace) {
        remove_dir(&workspace.root).await;
    }

    /// Register a staged submission and queue it.
    ///
    /// On error nothing is registered; the caller still owns the workspace.
    pub fn submit(&self, job: NewJob) -> Result<JobView, CoreError> {
        let NewJob {
            id,
            inputs,
            submission,
            mut workspace,
        } = job;
        if submission.preview.is_some() {
            workspace.preview_dir = Some(self.preview_dir(id));
        }

        let entry: SharedEntry = Arc::new(JobEntry::new(
            id,
            inputs,
            submission.config,
            submission.preview,
            workspace,
        ));

        self.inner.store.insert(entry.clone());
        if let Err(e) = self.inner.admission.enqueue(id) {
            self.inner.store.remove(id);
            tracing::warn!(job_id = %id, error = %e, "Job rejected");
            return Err(e);
        }

        tracing::info!(
            job_id = %id,
            mode = entry.mode.as_str(),
            inputs = entry.total(),
            "Job queued",
        );
        Inner::pump(&self.inner);
        Ok(self.view(&entry))
    }

    fn entry(&self, id: JobId) -> Result<SharedEntry, CoreError> {
        self.inner
            .store
            .get(id)
            .ok_or_else(|| CoreError::job_not_found(id))
    }

    fn view(&self, entry: &JobEntry) -> JobView {
        let mut view = entry.view();
        if view.status == JobStatus::Queued {
            view.queue_position = self.inner.admission.position(entry.id);
        }
        view
    }

    pub fn status(&self, id: JobId) -> Result<JobView, CoreError> {
        let entry = self.entry(id)?;
        Ok(self.view(&entry))
    }

    pub fn cancel(&self, id: JobId) -> Result<JobView, CoreError> {
        let entry = self.entry(id)?;
        match cancel::request_cancel(&entry)? {
            CancelOutcome::CancelledBeforeStart => {
                self.inner.admission.forget(id);
                tracing::info!(job_id = %id, "Job cancelled before start");
            }
            CancelOutcome::Requested => tracing::info!(job_id = %id, "Cancellation requested"),
            CancelOutcome::AlreadyRequested => {}
        }
        Ok(self.view(&entry))
    }

    /// Lease and open the job's bundle, building it if needed.
    pub async fn open_download(&self, id: JobId) -> Result<Download, CoreError> {
        let entry = self.entry(id)?;
        {
            let record = entry.lock();
            if entry.mode == JobMode::Preview {
                return Err(CoreError::Conflict(
                    "Preview jobs have no download bundle".to_string(),
                ));
            }
            if !is_downloadable(entry.mode, &record) {
                return Err(CoreError::Conflict(format!(
                    "Job is {} and has no results to download yet",
                    record.status
                )));
            }
        }

        let lease = DownloadLease::acquire(&entry)?;
        let artifact = packager::ensure_artifact(&entry).await?;
        let file = tokio::fs::File::open(&artifact.path).await.map_err(|e| {
            CoreError::Internal(format!(
                "Cannot open bundle {}: {e}",
                artifact.path.display()
            ))
        })?;

        tracing::debug!(job_id = %id, bytes = artifact.len, "Download started");
        Ok(Download {
            job_id: id,
            artifact,
            file,
            lease,
        })
    }

    /// Path of the preview image for input `index`.
    pub fn preview_output(&self, id: JobId, index: usize) -> Result<PathBuf, CoreError> {
        let entry = self.entry(id)?;
        if entry.mode != JobMode::Preview {
            return Err(CoreError::Conflict("Job is not a preview job".to_string()));
        }
        let record = entry.lock();
        let output = (!record.previews_cleared)
            .then(|| record.results.get(index))
            .flatten()
            .and_then(|result| result.output.clone());
        output.ok_or_else(|| CoreError::NotFound {
            entity: "Preview",
            id: format!("{id}/{index}"),
        })
    }

    /// Delete a finished preview job's outputs.
    pub async fn clear_previews(&self, id: JobId) -> Result<(), CoreError> {
        let entry = self.entry(id)?;
        if entry.mode != JobMode::Preview {
            return Err(CoreError::Conflict("Job is not a preview job".to_string()));
        }
        {
            let mut record = entry.lock();
            if !record.status.is_terminal() {
                return Err(CoreError::Conflict(format!(
                    "Job is {}; previews can be cleared once it has finished",
                    record.status
                )));
            }
            record.previews_cleared = true;
            record.updated_at = Utc::now();
        }
        if let Some(dir) = &entry.workspace.preview_dir {
            remove_dir(dir).await;
        }
        tracing::info!(job_id = %id, "Previews cleared");
        Ok(())
    }
}

pub(crate) async fn remove_dir(dir: &std::path::Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %dir.display(), error = %e, "Failed to remove directory"),
    }
}
