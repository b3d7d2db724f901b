// src/dag/scheduler_step.rs

//! Step-by-step result type for the scheduler.

use crate::plan::JobId;

/// Structured result of a single scheduler step.
///
/// Tests use this to step the scheduler by hand and assert on what changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStep {
    /// Jobs whose prerequisites are now all satisfied.
    pub newly_ready: Vec<JobId>,
    /// Jobs newly blocked by this step.
    pub newly_blocked: Vec<JobId>,
    /// Clean jobs brought back into the run.
    pub revived: Vec<JobId>,
    /// Whether this step halted dispatch under the fail-fast policy.
    pub halted: bool,
}
