//! Periodic removal of finished jobs past their TTL.
//!
//! A job is removed once it is terminal, `now - finished_at > ttl`, and no
//! download lease is held. Its workspace (inputs, outputs, bundle) goes with
//! it, and so does a preview job's output directory: once the record is gone
//! nothing can reach or clear it.

use std::time::Duration;

use chrono::Utc;
use semi_core::types::Timestamp;
use tokio_util::sync::CancellationToken;

use crate::engine::manager::remove_dir;
use crate::engine::JobManager;

pub struct ExpiryReaper {
    jobs: JobManager,
    ttl: chrono::Duration,
    interval: Duration,
}

impl ExpiryReaper {
    pub fn new(jobs: JobManager) -> Self {
        let limits = jobs.limits();
        let ttl = chrono::Duration::from_std(limits.job_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        let interval = limits.cleanup_interval;
        Self {
            jobs,
            ttl,
            interval,
        }
    }

    /// Remove every expired job as of `now`. Returns how many were removed.
    ///
    /// Records are marked reaped under the store lock, so a download racing
    /// the sweep either gets its lease first (and the job survives) or sees
    /// the job as gone.
    pub async fn sweep(&self, now: Timestamp) -> usize {
        let ttl = self.ttl;
        let removed = self.jobs.store().remove_if(|record| {
            let expired = record.is_reapable(now, ttl);
            if expired {
                record.reaped = true;
            }
            expired
        });

        for entry in &removed {
            remove_dir(&entry.workspace.root).await;
            if let Some(previews) = &entry.workspace.preview_dir {
                remove_dir(previews).await;
            }
            tracing::debug!(job_id = %entry.id, "Expired job removed");
        }
        removed.len()
    }

    /// Sweep every `cleanup_interval` until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            ttl_secs = self.ttl.num_seconds(),
            interval_secs = self.interval.as_secs(),
            "Expiry reaper started"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Expiry reaper stopping");
                    break;
                }
                _ = interval.tick() => {
                    let removed = self.sweep(Utc::now()).await;
                    if removed > 0 {
                        tracing::info!(removed, "Expiry reaper: removed finished jobs");
                    } else {
                        tracing::debug!("Expiry reaper: nothing to remove");
                    }
                }
            }
        }
    }
}
