// src/engine/mod.rs

//! Execution engine for a [`BuildPlan`](crate::plan::BuildPlan).
//!
//! This module ties together:
//! - the per-run scheduler
//! - the completion observer that feeds compile results back into the
//!   dependency state
//! - the event loop that reacts to job completions and cancellation
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::fmt;

use crate::plan::JobId;
use crate::types::FailurePolicy;

/// Why a job did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The tool could not be launched.
    Spawn(String),
    /// The tool exited with a non-zero code, `-1` when killed by a signal.
    Exit(i32),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Spawn(message) => write!(f, "could not spawn: {message}"),
            FailureKind::Exit(code) => write!(f, "exit code {code}"),
        }
    }
}

/// Outcome of a job process for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(FailureKind),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

/// Options that shape one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Maximum number of jobs running at once.
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
}

/// Events flowing into the runtime from workers and cancel handles.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A job process finished with a concrete outcome.
    JobFinished { job: JobId, outcome: JobOutcome },
    /// Stop dispatching (e.g. Ctrl-C).
    CancelRequested,
}

pub mod core;
pub mod event_handlers;
pub mod observer;
pub mod report;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use observer::{CompletionObserver, NoopObserver};
pub use report::{
    Diagnostic, DiagnosticOrigin, ExecutionReport, JobReport, ReportAccumulator, RunOutcome,
    Severity,
};
pub use runtime::{execute, CancelHandle, Executor};
