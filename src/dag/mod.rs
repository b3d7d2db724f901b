// src/dag/mod.rs

//! Per-run scheduling over a [`BuildPlan`](crate::plan::BuildPlan).
//!
//! - [`scheduler`] contains the per-run state machine that decides which
//!   jobs are ready to run, and when dependents can be scheduled.
//! - [`job_state`] defines the internal and reported job states.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod job_state;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;

pub use job_state::{JobState, JobStatus};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
