//! Job lifecycle status and processing mode.
//!
//! ```text
//! queued --(admitted)--> waiting --(runner starts)--> running
//! queued | waiting --(cancel)--> cancelled
//! running --(cancel)--> cancelling --(boundary)--> cancelled
//! running | cancelling --(all inputs processed)--> done
//! running | cancelling --(engine fault)--> error
//! ```

use serde::{Deserialize, Serialize};

/// Status of a submitted batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Waiting,
    Running,
    Cancelling,
    Cancelled,
    Done,
    Error,
}

impl JobStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Waiting => "waiting",
            JobStatus::Running => "running",
            JobStatus::Cancelling => "cancelling",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Cancelled | JobStatus::Done | JobStatus::Error
        )
    }

    /// Whether the job has not started processing its first input yet.
    pub fn is_pending(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Waiting)
    }

    /// Whether a cancel request is still meaningful for this status.
    pub fn can_cancel(self) -> bool {
        !self.is_terminal()
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Waiting)
                | (Queued, Cancelled)
                | (Waiting, Running)
                | (Waiting, Cancelled)
                | (Running, Cancelling)
                | (Running, Done)
                | (Running, Error)
                | (Cancelling, Cancelled)
                | (Cancelling, Done)
                | (Cancelling, Error)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a job produces full outputs or disposable previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    Normal,
    Preview,
}

impl JobMode {
    pub fn as_str(self) -> &'static str {
        match self {
            JobMode::Normal => "normal",
            JobMode::Preview => "preview",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobStatus; 7] = [
        JobStatus::Queued,
        JobStatus::Waiting,
        JobStatus::Running,
        JobStatus::Cancelling,
        JobStatus::Cancelled,
        JobStatus::Done,
        JobStatus::Error,
    ];

    #[test]
    fn terminal_statuses_have_no_outgoing_transitions() {
        for from in ALL.iter().copied().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(
                    !from.can_transition_to(to),
                    "{from} must not transition to {to}"
                );
            }
        }
    }

    #[test]
    fn pending_jobs_cancel_directly() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Waiting.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn running_job_goes_through_cancelling() {
        assert!(JobStatus::Running.can_transition_to(JobStatus::Cancelling));
        assert!(JobStatus::Cancelling.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn finished_batch_wins_over_late_cancel() {
        assert!(JobStatus::Cancelling.can_transition_to(JobStatus::Done));
    }

    #[test]
    fn queued_cannot_skip_admission() {
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Done));
    }

    #[test]
    fn can_cancel_matches_non_terminal() {
        for status in ALL {
            assert_eq!(status.can_cancel(), !status.is_terminal());
        }
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Cancelling).unwrap();
        assert_eq!(json, "\"cancelling\"");
        assert_eq!(JobStatus::Done.to_string(), "done");
    }
}
