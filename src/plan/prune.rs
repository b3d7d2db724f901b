// src/plan/prune.rs

//! Decides which planned jobs actually run.

use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, info};

use crate::deps::DirtySet;
use crate::fs::FileSystem;
use crate::plan::graph::JobGraph;
use crate::plan::job::{JobId, JobKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduleReason {
    /// One of the job's inputs is in the dirty set.
    DirtyInput,
    /// The job's command differs from the one it last ran with.
    CommandChanged,
    /// One of the job's outputs does not exist.
    MissingOutput,
    /// The job did not succeed last time.
    Stale,
    /// Explicit module builds always run.
    ExternalModule,
    /// A prerequisite is scheduled.
    Upstream,
}

impl fmt::Display for ScheduleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScheduleReason::DirtyInput => "dirty input",
            ScheduleReason::CommandChanged => "command changed",
            ScheduleReason::MissingOutput => "missing output",
            ScheduleReason::Stale => "stale",
            ScheduleReason::ExternalModule => "external module",
            ScheduleReason::Upstream => "upstream",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    Scheduled(ScheduleReason),
    Clean,
}

impl Disposition {
    pub fn is_scheduled(self) -> bool {
        matches!(self, Disposition::Scheduled(_))
    }
}

/// A job graph plus the disposition of every job.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub graph: JobGraph,
    dispositions: Vec<Disposition>,
}

impl BuildPlan {
    /// # Panics
    ///
    /// Panics if there is not exactly one disposition per job.
    pub fn new(graph: JobGraph, dispositions: Vec<Disposition>) -> Self {
        assert_eq!(
            graph.len(),
            dispositions.len(),
            "one disposition per job is required"
        );
        Self {
            graph,
            dispositions,
        }
    }

    /// Schedule every job, e.g. for a forced rebuild.
    pub fn all_scheduled(graph: JobGraph) -> Self {
        let dispositions = vec![Disposition::Scheduled(ScheduleReason::DirtyInput); graph.len()];
        Self::new(graph, dispositions)
    }

    pub fn disposition(&self, id: JobId) -> Disposition {
        self.dispositions
            .get(id.index())
            .copied()
            .unwrap_or(Disposition::Clean)
    }

    pub fn dispositions(&self) -> &[Disposition] {
        &self.dispositions
    }

    pub fn scheduled_count(&self) -> usize {
        self.dispositions.iter().filter(|d| d.is_scheduled()).count()
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }
}

/// Compute the disposition of every job in `graph`.
///
/// Seeds are jobs reading a dirty input, jobs whose key is in
/// `changed_commands`, jobs answering for a stale key and jobs with a missing
/// output. Everything downstream of a seed is scheduled
/// too. Explicit module builds always run but do not schedule their
/// dependents.
pub fn prune(
    graph: JobGraph,
    dirty: &DirtySet,
    stale_jobs: &BTreeSet<String>,
    changed_commands: &BTreeSet<String>,
    fs: &dyn FileSystem,
) -> BuildPlan {
    let mut dispositions = vec![Disposition::Clean; graph.len()];
    let mut propagates = vec![false; graph.len()];

    for job in graph.jobs() {
        let index = job.id.index();
        if matches!(job.kind, JobKind::BuildModule { .. }) {
            dispositions[index] = Disposition::Scheduled(ScheduleReason::ExternalModule);
            continue;
        }

        let reason = if job.inputs.iter().any(|a| dirty.contains(&a.path)) {
            Some(ScheduleReason::DirtyInput)
        } else if changed_commands.contains(job.key.as_str()) {
            Some(ScheduleReason::CommandChanged)
        } else if job
            .origin_keys()
            .iter()
            .any(|k| stale_jobs.contains(k.as_str()))
        {
            Some(ScheduleReason::Stale)
        } else if job.outputs.iter().any(|a| !fs.exists(&a.path)) {
            Some(ScheduleReason::MissingOutput)
        } else {
            None
        };

        if let Some(reason) = reason {
            debug!(job = %job.key, %reason, "job scheduled");
            dispositions[index] = Disposition::Scheduled(reason);
            propagates[index] = true;
        }
    }

    for id in graph.topological_order() {
        let index = id.index();
        let job = graph.job(*id);
        if dispositions[index] == Disposition::Clean
            && job.prerequisites.iter().any(|p| propagates[p.index()])
        {
            debug!(job = %job.key, "job scheduled behind a scheduled prerequisite");
            dispositions[index] = Disposition::Scheduled(ScheduleReason::Upstream);
        }
        if dispositions[index].is_scheduled()
            && !matches!(job.kind, JobKind::BuildModule { .. })
        {
            propagates[index] = true;
        }
    }

    let plan = BuildPlan::new(graph, dispositions);
    info!(
        jobs = plan.len(),
        scheduled = plan.scheduled_count(),
        "pruned job graph"
    );
    plan
}
