// src/dag/state_manager.rs

//! Per-run state transitions for jobs in the scheduler.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::dag::job_state::JobState;
use crate::plan::{JobGraph, JobId};

/// Mutable view over the scheduler's per-run bookkeeping.
pub struct StateManager<'a> {
    graph: &'a JobGraph,
    states: &'a mut [JobState],
    /// Prerequisites each job is still waiting on.
    remaining: &'a mut [usize],
    ready: &'a mut BTreeSet<JobId>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a JobGraph,
        states: &'a mut [JobState],
        remaining: &'a mut [usize],
        ready: &'a mut BTreeSet<JobId>,
    ) -> Self {
        Self {
            graph,
            states,
            remaining,
            ready,
        }
    }

    /// Pending prerequisites of `id` that have not finished yet.
    fn unfinished_prerequisites(&self, id: JobId) -> usize {
        self.graph
            .job(id)
            .prerequisites
            .iter()
            .filter(|p| !self.states[p.index()].is_terminal())
            .count()
    }

    /// Seed counters and the ready set from the initial states.
    pub fn initialize(&mut self) {
        for id in self.graph.topological_order() {
            if self.states[id.index()] != JobState::Pending {
                continue;
            }
            let waiting = self.unfinished_prerequisites(*id);
            self.remaining[id.index()] = waiting;
            if waiting == 0 {
                self.ready.insert(*id);
            }
        }
    }

    /// A prerequisite of each pending dependent of `id` has succeeded.
    ///
    /// Returns the dependents that became ready.
    pub fn release_dependents(&mut self, id: JobId) -> Vec<JobId> {
        let mut newly_ready = Vec::new();
        for dependent in self.graph.dependents_of(id) {
            let index = dependent.index();
            if self.states[index] != JobState::Pending {
                continue;
            }
            self.remaining[index] = self.remaining[index].saturating_sub(1);
            if self.remaining[index] == 0 && self.ready.insert(*dependent) {
                debug!(job = %self.graph.job(*dependent).key, "prerequisites satisfied; job is ready");
                newly_ready.push(*dependent);
            }
        }
        newly_ready
    }

    /// Mark every pending job downstream of `failed` as blocked.
    pub fn block_dependents(&mut self, failed: JobId) -> Vec<JobId> {
        let mut blocked = Vec::new();
        for dependent in self.graph.transitive_dependents(failed) {
            let index = dependent.index();
            if self.states[index] == JobState::Pending {
                self.states[index] = JobState::Blocked;
                self.ready.remove(&dependent);
                debug!(
                    job = %self.graph.job(dependent).key,
                    "marking dependent as Blocked due to upstream failure"
                );
                blocked.push(dependent);
            }
        }
        blocked
    }

    /// Bring clean jobs back into the run, together with their clean
    /// dependents.
    ///
    /// Jobs that are not clean are left alone. A revived job behind a failed,
    /// blocked or cancelled prerequisite is blocked straight away. Pending
    /// dependents of revived jobs wait for them.
    pub fn revive(&mut self, roots: &[JobId]) -> (Vec<JobId>, Vec<JobId>, Vec<JobId>) {
        let mut selected: BTreeSet<JobId> = BTreeSet::new();
        let mut stack: Vec<JobId> = roots
            .iter()
            .copied()
            .filter(|id| self.states.get(id.index()) == Some(&JobState::Clean))
            .collect();
        while let Some(id) = stack.pop() {
            if self.states[id.index()] != JobState::Clean || !selected.insert(id) {
                continue;
            }
            stack.extend(self.graph.dependents_of(id).iter().copied());
        }

        let mut revived = Vec::new();
        let mut blocked = Vec::new();
        let mut newly_ready = Vec::new();

        let order: Vec<JobId> = self
            .graph
            .topological_order()
            .iter()
            .copied()
            .filter(|id| selected.contains(id))
            .collect();

        for id in order {
            let index = id.index();
            let poisoned = self
                .graph
                .job(id)
                .prerequisites
                .iter()
                .any(|p| self.states[p.index()].poisons_dependents());
            if poisoned {
                self.states[index] = JobState::Blocked;
                debug!(job = %self.graph.job(id).key, "revived job is blocked by an upstream failure");
                blocked.push(id);
                continue;
            }

            self.states[index] = JobState::Pending;
            let waiting = self.unfinished_prerequisites(id);
            self.remaining[index] = waiting;
            if waiting == 0 {
                self.ready.insert(id);
                newly_ready.push(id);
            }
            info!(job = %self.graph.job(id).key, "job revived for this run");
            revived.push(id);

            for dependent in self.graph.dependents_of(id) {
                if selected.contains(dependent) {
                    continue;
                }
                let dep_index = dependent.index();
                match self.states[dep_index] {
                    JobState::Pending => {
                        self.remaining[dep_index] += 1;
                        self.ready.remove(dependent);
                    }
                    JobState::Running | JobState::Succeeded => {
                        warn!(
                            job = %self.graph.job(*dependent).key,
                            prerequisite = %self.graph.job(id).key,
                            "dependent already started before its prerequisite was revived"
                        );
                    }
                    _ => {}
                }
            }
        }

        newly_ready.retain(|id| self.ready.contains(id));
        (revived, blocked, newly_ready)
    }

    /// Cancel every job still pending.
    pub fn cancel_pending(&mut self) -> Vec<JobId> {
        let mut cancelled = Vec::new();
        for (index, state) in self.states.iter_mut().enumerate() {
            if *state == JobState::Pending {
                *state = JobState::Cancelled;
                cancelled.push(JobId(index as u32));
            }
        }
        self.ready.clear();
        cancelled
    }

    pub fn all_terminal(&self) -> bool {
        self.states.iter().all(|s| s.is_terminal())
    }
}
