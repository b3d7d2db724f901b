// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::{JobStatus, Scheduler};
use crate::deps::DirtySet;
use crate::engine::core::CoreRuntime;
use crate::engine::observer::CompletionObserver;
use crate::engine::report::{ExecutionReport, JobReport, ReportAccumulator, RunOutcome};
use crate::engine::{CoreCommand, ExecutionOptions, RuntimeEvent};
use crate::exec::{run_job, ProcessRunner};
use crate::plan::BuildPlan;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Requests cancellation of a running [`Executor`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl CancelHandle {
    /// Stop dispatching new jobs. Jobs already running finish.
    pub async fn cancel(&self) {
        if self.tx.send(RuntimeEvent::CancelRequested).await.is_err() {
            debug!("executor already finished; cancel request dropped");
        }
    }
}

/// Drives the scheduler in response to `RuntimeEvent`s and runs dispatched
/// jobs on Tokio tasks through a [`ProcessRunner`].
///
/// This is a pure IO shell around [`CoreRuntime`], which contains all the
/// scheduling semantics. The coordinator loop is the only place that touches
/// the scheduler and the observer; workers only append to the shared
/// [`ReportAccumulator`] and send completion events.
pub struct Executor<R: ProcessRunner + 'static> {
    runner: Arc<R>,
    options: ExecutionOptions,
    event_tx: mpsc::Sender<RuntimeEvent>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
}

impl<R: ProcessRunner + 'static> fmt::Debug for Executor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<R: ProcessRunner + 'static> Executor<R> {
    pub fn new(runner: Arc<R>, options: ExecutionOptions) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            runner,
            options,
            event_tx,
            event_rx,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.event_tx.clone(),
        }
    }

    /// Run every scheduled job of `plan` and report the result.
    ///
    /// The report carries no dirty set or state; the caller attaches those.
    pub async fn execute(
        mut self,
        plan: Arc<BuildPlan>,
        observer: &mut dyn CompletionObserver,
    ) -> ExecutionReport {
        info!(
            jobs = plan.len(),
            scheduled = plan.scheduled_count(),
            concurrency = self.options.concurrency,
            "executor started"
        );

        let accumulator = ReportAccumulator::new();
        let mut core = CoreRuntime::new(Arc::clone(&plan), self.options);
        let mut cancel_requested = false;

        let mut step = core.start();
        loop {
            for command in step.commands {
                self.execute_command(&plan, &accumulator, command);
            }
            if !step.keep_running {
                break;
            }

            let Some(event) = self.event_rx.recv().await else {
                warn!("runtime event channel closed; stopping executor");
                break;
            };
            debug!(?event, "executor received event");
            if matches!(event, RuntimeEvent::CancelRequested) {
                cancel_requested = true;
            }
            step = core.step(event, observer);
        }

        let scheduler = core.finish();
        let report = build_report(&plan, &scheduler, &accumulator, cancel_requested);
        info!(
            outcome = %report.outcome,
            succeeded = report.count(JobStatus::Succeeded),
            skipped = report.count(JobStatus::Skipped),
            failed = report.count(JobStatus::Failed),
            blocked = report.count(JobStatus::Blocked),
            cancelled = report.count(JobStatus::Cancelled),
            "executor finished"
        );
        report
    }

    fn execute_command(
        &self,
        plan: &BuildPlan,
        accumulator: &ReportAccumulator,
        command: CoreCommand,
    ) {
        match command {
            CoreCommand::Dispatch(jobs) => {
                debug!(?jobs, "spawning ready jobs");
                for id in jobs {
                    let job = plan.graph.shared(id);
                    tokio::spawn(run_job(
                        job,
                        Arc::clone(&self.runner),
                        accumulator.clone(),
                        self.event_tx.clone(),
                    ));
                }
            }
        }
    }
}

fn build_report(
    plan: &BuildPlan,
    scheduler: &Scheduler,
    accumulator: &ReportAccumulator,
    cancel_requested: bool,
) -> ExecutionReport {
    let jobs: Vec<JobReport> = plan
        .graph
        .jobs()
        .map(|job| {
            let status = scheduler.status_of(job.id).unwrap_or_else(|| {
                warn!(job = %job.key, "job still in flight after the executor finished");
                JobStatus::Cancelled
            });
            JobReport {
                id: job.id,
                key: job.key.clone(),
                status,
                failure: accumulator.failure_of(job.id),
            }
        })
        .collect();

    let outcome = if cancel_requested {
        RunOutcome::Cancelled
    } else if jobs.iter().all(|j| j.status.is_success()) {
        RunOutcome::Succeeded
    } else {
        RunOutcome::Failed
    };

    ExecutionReport {
        outcome,
        jobs,
        diagnostics: accumulator.take_diagnostics(),
        dirty: DirtySet::new(),
        state: None,
    }
}

/// Convenience wrapper: execute `plan` with a fresh [`Executor`].
pub async fn execute<R: ProcessRunner + 'static>(
    plan: Arc<BuildPlan>,
    options: ExecutionOptions,
    runner: Arc<R>,
    observer: &mut dyn CompletionObserver,
) -> ExecutionReport {
    Executor::new(runner, options).execute(plan, observer).await
}
