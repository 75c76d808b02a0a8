//! Turns cancel requests into state transitions.

use chrono::Utc;
use semi_core::error::CoreError;
use semi_core::job_status::JobStatus;

use super::record::JobEntry;

/// What a cancel request did to the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job had not started; it is now `cancelled` with no results and
    /// must be dropped from the admission queue.
    CancelledBeforeStart,
    /// The job was running; it is now `cancelling` and its runner finalizes
    /// it at the next input boundary.
    Requested,
    /// A cancel was already in flight.
    AlreadyRequested,
}

/// Apply a cancel request to `entry` under its record lock.
///
/// Only the record lock is taken here. Callers that need to touch the
/// admission queue do so after this returns.
pub fn request_cancel(entry: &JobEntry) -> Result<CancelOutcome, CoreError> {
    let mut record = entry.lock();
    let now = Utc::now();

    let outcome = match record.status {
        status if status.is_pending() => {
            record.cancel_requested = true;
            record.transition(JobStatus::Cancelled, now)?;
            record.message = "Cancelled before start".to_string();
            CancelOutcome::CancelledBeforeStart
        }
        JobStatus::Running => {
            record.cancel_requested = true;
            record.transition(JobStatus::Cancelling, now)?;
            record.message = "Cancellation requested, waiting for current step".to_string();
            CancelOutcome::Requested
        }
        JobStatus::Cancelling => return Ok(CancelOutcome::AlreadyRequested),
        status => {
            return Err(CoreError::Conflict(format!(
                "Job is already {status} and cannot be cancelled"
            )))
        }
    };
    drop(record);

    entry.cancel.cancel();
    Ok(outcome)
}
