// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated scheduler state
//! - a list of commands describing which jobs the IO shell should start
//!
//! The async shell ([`Executor`](crate::engine::runtime::Executor)) is
//! responsible for reading events from the channel, spawning workers and
//! building the final report. The core is unit tested without any Tokio,
//! channels, filesystem, or processes.

use std::sync::Arc;

use tracing::warn;

use crate::dag::Scheduler;
use crate::engine::event_handlers::{dispatch_ready, handle_cancel, handle_job_finished, CoreStep};
use crate::engine::observer::CompletionObserver;
use crate::engine::{ExecutionOptions, RuntimeEvent};
use crate::plan::BuildPlan;

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    options: ExecutionOptions,
}

impl CoreRuntime {
    /// A concurrency of zero is raised to one, otherwise ready jobs could
    /// never start.
    pub fn new(plan: Arc<BuildPlan>, mut options: ExecutionOptions) -> Self {
        if options.concurrency == 0 {
            warn!("concurrency of 0 requested; running one job at a time");
            options.concurrency = 1;
        }
        Self {
            scheduler: Scheduler::new(plan, options.failure_policy),
            options,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Initial dispatch.
    pub fn start(&mut self) -> CoreStep {
        dispatch_ready(&mut self.scheduler, &self.options)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent, observer: &mut dyn CompletionObserver) -> CoreStep {
        match event {
            RuntimeEvent::JobFinished { job, outcome } => handle_job_finished(
                &mut self.scheduler,
                observer,
                &self.options,
                job,
                outcome,
            ),
            RuntimeEvent::CancelRequested => handle_cancel(&mut self.scheduler),
        }
    }

    /// Cancel whatever never ran and hand back the final scheduler state.
    pub fn finish(mut self) -> Scheduler {
        self.scheduler.finalize();
        self.scheduler
    }
}
