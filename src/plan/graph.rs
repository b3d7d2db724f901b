// src/plan/graph.rs

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::PlanningError;
use crate::plan::job::{Job, JobId, JobKey, JobSpec};

/// Immutable job DAG.
///
/// Jobs are shared behind `Arc` so workers can hold them while the
/// coordinator keeps the graph. Acyclicity is established at construction,
/// either by [`JobGraphBuilder`] (prerequisites must already exist) or by
/// [`JobGraph::from_jobs`] (explicit topological sort).
#[derive(Debug, Clone, Default)]
pub struct JobGraph {
    jobs: Vec<Arc<Job>>,
    /// Direct dependents of each job, ascending.
    dependents: Vec<Vec<JobId>>,
    /// Prerequisites before dependents, ties broken by id.
    order: Vec<JobId>,
}

impl JobGraph {
    /// Validate an arbitrary list of jobs and build a graph from it.
    ///
    /// Ids must be dense and match their position.
    pub fn from_jobs(jobs: Vec<Job>) -> Result<Self, PlanningError> {
        let mut keys: HashMap<&JobKey, JobId> = HashMap::new();
        for (index, job) in jobs.iter().enumerate() {
            if job.id.index() != index {
                return Err(PlanningError::MalformedRequest(format!(
                    "job '{}' has id {} but sits at position {}",
                    job.key, job.id, index
                )));
            }
            if keys.insert(&job.key, job.id).is_some() {
                return Err(PlanningError::DuplicateJob(job.key.to_string()));
            }
            for prerequisite in &job.prerequisites {
                if *prerequisite == job.id {
                    return Err(PlanningError::SelfDependency(job.key.to_string()));
                }
                if prerequisite.index() >= jobs.len() {
                    return Err(PlanningError::UnknownPrerequisite {
                        job: job.key.to_string(),
                        prerequisite: prerequisite.0,
                    });
                }
            }
        }

        let mut graph: DiGraphMap<u32, ()> = DiGraphMap::new();
        for job in &jobs {
            graph.add_node(job.id.0);
            for prerequisite in &job.prerequisites {
                graph.add_edge(prerequisite.0, job.id.0, ());
            }
        }
        if let Err(cycle) = toposort(&graph, None) {
            let job = &jobs[cycle.node_id() as usize];
            return Err(PlanningError::JobCycle(job.key.to_string()));
        }

        Ok(Self::assemble(jobs))
    }

    fn assemble(jobs: Vec<Job>) -> Self {
        let mut dependents: Vec<Vec<JobId>> = vec![Vec::new(); jobs.len()];
        for job in &jobs {
            for prerequisite in &job.prerequisites {
                dependents[prerequisite.index()].push(job.id);
            }
        }
        for list in &mut dependents {
            list.sort();
        }

        let jobs: Vec<Arc<Job>> = jobs.into_iter().map(Arc::new).collect();
        let order = kahn_order(&jobs, &dependents);
        Self {
            jobs,
            dependents,
            order,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    pub fn job(&self, id: JobId) -> &Job {
        &self.jobs[id.index()]
    }

    pub fn shared(&self, id: JobId) -> Arc<Job> {
        Arc::clone(&self.jobs[id.index()])
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().map(|j| j.as_ref())
    }

    pub fn find(&self, key: &str) -> Option<JobId> {
        self.jobs
            .iter()
            .find(|job| job.key.as_str() == key)
            .map(|job| job.id)
    }

    pub fn dependents_of(&self, id: JobId) -> &[JobId] {
        self.dependents
            .get(id.index())
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    /// Every job reachable from `id` through dependent edges.
    pub fn transitive_dependents(&self, id: JobId) -> BTreeSet<JobId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<JobId> = self.dependents_of(id).to_vec();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.dependents_of(next).iter().copied());
            }
        }
        seen
    }

    pub fn topological_order(&self) -> &[JobId] {
        &self.order
    }

    /// Give up the jobs, e.g. to rebuild a graph from them.
    pub fn into_jobs(self) -> Vec<Job> {
        self.jobs
            .into_iter()
            .map(|job| Arc::try_unwrap(job).unwrap_or_else(|shared| (*shared).clone()))
            .collect()
    }
}

fn kahn_order(jobs: &[Arc<Job>], dependents: &[Vec<JobId>]) -> Vec<JobId> {
    let mut remaining: Vec<usize> = jobs.iter().map(|j| j.prerequisites.len()).collect();
    let mut ready: BTreeSet<JobId> = jobs
        .iter()
        .filter(|j| j.prerequisites.is_empty())
        .map(|j| j.id)
        .collect();

    let mut order = Vec::with_capacity(jobs.len());
    while let Some(id) = ready.pop_first() {
        order.push(id);
        for dependent in &dependents[id.index()] {
            remaining[dependent.index()] -= 1;
            if remaining[dependent.index()] == 0 {
                ready.insert(*dependent);
            }
        }
    }
    order
}

/// Incremental construction of a [`JobGraph`] in plan order.
///
/// A job may only depend on jobs added before it, which keeps the graph
/// acyclic without a separate check.
#[derive(Debug, Default)]
pub struct JobGraphBuilder {
    jobs: Vec<Job>,
    keys: HashMap<JobKey, JobId>,
}

impl JobGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, spec: JobSpec) -> Result<JobId, PlanningError> {
        let id = JobId(self.jobs.len() as u32);

        if self.keys.contains_key(&spec.key) {
            return Err(PlanningError::DuplicateJob(spec.key.to_string()));
        }
        for prerequisite in &spec.prerequisites {
            if *prerequisite == id {
                return Err(PlanningError::SelfDependency(spec.key.to_string()));
            }
            if prerequisite.index() >= self.jobs.len() {
                return Err(PlanningError::UnknownPrerequisite {
                    job: spec.key.to_string(),
                    prerequisite: prerequisite.0,
                });
            }
        }

        self.keys.insert(spec.key.clone(), id);
        self.jobs.push(spec.into_job(id));
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn build(self) -> JobGraph {
        JobGraph::assemble(self.jobs)
    }
}
