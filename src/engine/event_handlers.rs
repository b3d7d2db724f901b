// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::debug;

use crate::dag::Scheduler;
use crate::engine::observer::CompletionObserver;
use crate::engine::{ExecutionOptions, JobOutcome};
use crate::plan::JobId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Start these jobs.
    Dispatch(Vec<JobId>),
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer loop should keep waiting for events.
    pub keep_running: bool,
}

/// Fill free worker slots and decide whether the loop continues.
pub fn dispatch_ready(scheduler: &mut Scheduler, options: &ExecutionOptions) -> CoreStep {
    let mut commands = Vec::new();
    let jobs = scheduler.dispatch(options.concurrency);
    if !jobs.is_empty() {
        commands.push(CoreCommand::Dispatch(jobs));
    }
    CoreStep {
        commands,
        keep_running: !scheduler.is_finished(),
    }
}

/// Handle a job completion.
///
/// On success the observer runs first and may revive clean jobs; the
/// scheduler then hands out whatever became ready.
pub fn handle_job_finished(
    scheduler: &mut Scheduler,
    observer: &mut dyn CompletionObserver,
    options: &ExecutionOptions,
    job: JobId,
    outcome: JobOutcome,
) -> CoreStep {
    let step = scheduler.complete(job, &outcome);
    debug!(job = %job, ready = step.newly_ready.len(), blocked = step.newly_blocked.len(), "job finished");

    if outcome.is_success() {
        let plan = scheduler.plan().clone();
        let revive = observer.job_succeeded(plan.graph.job(job));
        if !revive.is_empty() {
            let revived = scheduler.revive(&revive);
            debug!(
                revived = revived.revived.len(),
                blocked = revived.newly_blocked.len(),
                "observer revived clean jobs"
            );
        }
    }

    dispatch_ready(scheduler, options)
}

/// Handle an external cancellation request.
pub fn handle_cancel(scheduler: &mut Scheduler) -> CoreStep {
    scheduler.cancel();
    CoreStep {
        commands: Vec::new(),
        keep_running: !scheduler.is_finished(),
    }
}
