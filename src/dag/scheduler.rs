// src/dag/scheduler.rs

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::job_state::{JobState, JobStatus};
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::engine::JobOutcome;
use crate::plan::{BuildPlan, JobId};
use crate::types::FailurePolicy;

/// Scheduler holds the immutable plan plus mutable per-run state.
///
/// It is responsible for:
/// - tracking which jobs are pending, running and done
/// - deciding when a job is ready (every prerequisite succeeded or clean)
/// - handing out ready jobs in `JobId` order, bounded by a caller-supplied
///   limit
/// - blocking dependents when a job fails, and halting under fail-fast
/// - reviving clean jobs invalidated mid-run
#[derive(Debug)]
pub struct Scheduler {
    plan: Arc<BuildPlan>,
    states: Vec<JobState>,
    remaining: Vec<usize>,
    ready: BTreeSet<JobId>,
    policy: FailurePolicy,
    halted: bool,
    cancelled: bool,
    running: usize,
}

impl Scheduler {
    pub fn new(plan: Arc<BuildPlan>, policy: FailurePolicy) -> Self {
        let states: Vec<JobState> = plan
            .dispositions()
            .iter()
            .map(|d| {
                if d.is_scheduled() {
                    JobState::Pending
                } else {
                    JobState::Clean
                }
            })
            .collect();
        let remaining = vec![0; states.len()];

        let mut scheduler = Self {
            plan,
            states,
            remaining,
            ready: BTreeSet::new(),
            policy,
            halted: false,
            cancelled: false,
            running: 0,
        };
        scheduler.manager().initialize();
        debug!(
            jobs = scheduler.states.len(),
            ready = scheduler.ready.len(),
            "scheduler initialized"
        );
        scheduler
    }

    fn manager(&mut self) -> StateManager<'_> {
        StateManager::new(
            &self.plan.graph,
            &mut self.states,
            &mut self.remaining,
            &mut self.ready,
        )
    }

    pub fn plan(&self) -> &Arc<BuildPlan> {
        &self.plan
    }

    pub fn state_of(&self, id: JobId) -> Option<JobState> {
        self.states.get(id.index()).copied()
    }

    /// Final status of `id`, or `None` while it is pending or running.
    pub fn status_of(&self, id: JobId) -> Option<JobStatus> {
        self.state_of(id).and_then(JobState::status)
    }

    pub fn running(&self) -> usize {
        self.running
    }

    pub fn ready(&self) -> impl Iterator<Item = JobId> + '_ {
        self.ready.iter().copied()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Mark up to `limit - running` ready jobs as running and return them.
    pub fn dispatch(&mut self, limit: usize) -> Vec<JobId> {
        if self.halted || self.cancelled {
            return Vec::new();
        }
        let mut dispatched = Vec::new();
        while self.running < limit {
            let Some(id) = self.ready.pop_first() else {
                break;
            };
            self.states[id.index()] = JobState::Running;
            self.running += 1;
            info!(job = %self.plan.graph.job(id).key, "dispatching job");
            dispatched.push(id);
        }
        dispatched
    }

    /// Record the outcome of a running job.
    pub fn complete(&mut self, id: JobId, outcome: &JobOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.state_of(id) != Some(JobState::Running) {
            warn!(job = %id, "completion for a job that is not running; ignoring");
            return step;
        }
        self.running -= 1;

        match outcome {
            JobOutcome::Succeeded => {
                self.states[id.index()] = JobState::Succeeded;
                debug!(job = %self.plan.graph.job(id).key, "job succeeded");
                step.newly_ready = self.manager().release_dependents(id);
            }
            JobOutcome::Failed(kind) => {
                self.states[id.index()] = JobState::Failed;
                warn!(
                    job = %self.plan.graph.job(id).key,
                    failure = %kind,
                    "job failed; blocking dependents"
                );
                step.newly_blocked = self.manager().block_dependents(id);
                if self.policy == FailurePolicy::FailFast && !self.halted {
                    info!("fail-fast: no further jobs will be started");
                    self.halted = true;
                    step.halted = true;
                }
            }
        }
        step
    }

    /// Bring clean jobs back into the run.
    pub fn revive(&mut self, ids: &[JobId]) -> SchedulerStep {
        let (revived, newly_blocked, newly_ready) = self.manager().revive(ids);
        SchedulerStep {
            newly_ready,
            newly_blocked,
            revived,
            halted: false,
        }
    }

    /// Stop dispatching; jobs already running are left to finish.
    pub fn cancel(&mut self) {
        if !self.cancelled {
            info!(running = self.running, "cancellation requested; no further jobs will be started");
        }
        self.cancelled = true;
    }

    /// Nothing is running and nothing more will be dispatched.
    pub fn is_finished(&self) -> bool {
        self.running == 0 && (self.halted || self.cancelled || self.ready.is_empty())
    }

    /// Cancel whatever never got to run. Call once [`is_finished`] holds.
    ///
    /// [`is_finished`]: Scheduler::is_finished
    pub fn finalize(&mut self) -> Vec<JobId> {
        let cancelled = self.manager().cancel_pending();
        if !cancelled.is_empty() {
            info!(count = cancelled.len(), "pending jobs cancelled");
        }
        cancelled
    }

    pub fn all_terminal(&mut self) -> bool {
        self.manager().all_terminal()
    }
}
