// src/engine/observer.rs

use crate::plan::{Job, JobId};

/// Hook run on the coordinator after every successful job.
///
/// Returns clean jobs that must run after all, e.g. compile jobs whose
/// inputs were invalidated by an interface change the finished job
/// revealed. The scheduler revives them and their clean dependents.
pub trait CompletionObserver: Send {
    fn job_succeeded(&mut self, job: &Job) -> Vec<JobId>;
}

/// Observer that never revives anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CompletionObserver for NoopObserver {
    fn job_succeeded(&mut self, _job: &Job) -> Vec<JobId> {
        Vec::new()
    }
}
