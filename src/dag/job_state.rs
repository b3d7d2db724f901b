// src/dag/job_state.rs

//! Per-run job states.

use std::fmt;

/// Internal state of a job during one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Not scheduled; prior outputs are reused.
    Clean,
    /// Scheduled, waiting on prerequisites or a free slot.
    Pending,
    /// Dispatched to a worker.
    Running,
    Succeeded,
    Failed,
    /// A prerequisite failed or was blocked.
    Blocked,
    /// Never started because the run was halted or cancelled.
    Cancelled,
}

impl JobState {
    /// Whether the job will not change state again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Pending | JobState::Running)
    }

    /// Whether dependents may treat this job as done.
    pub fn satisfies_dependents(self) -> bool {
        matches!(self, JobState::Clean | JobState::Succeeded)
    }

    /// Whether dependents can never run.
    pub fn poisons_dependents(self) -> bool {
        matches!(
            self,
            JobState::Failed | JobState::Blocked | JobState::Cancelled
        )
    }
}

/// Reported status of a job once execution is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Skipped,
    Succeeded,
    Failed,
    Blocked,
    Cancelled,
}

impl JobStatus {
    pub fn is_success(self) -> bool {
        matches!(self, JobStatus::Skipped | JobStatus::Succeeded)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Skipped => "skipped",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Blocked => "blocked",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl JobState {
    /// Reported status, or `None` while the job is still in flight.
    pub fn status(self) -> Option<JobStatus> {
        match self {
            JobState::Clean => Some(JobStatus::Skipped),
            JobState::Succeeded => Some(JobStatus::Succeeded),
            JobState::Failed => Some(JobStatus::Failed),
            JobState::Blocked => Some(JobStatus::Blocked),
            JobState::Cancelled => Some(JobStatus::Cancelled),
            JobState::Pending | JobState::Running => None,
        }
    }
}
