// src/driver/tracker.rs

//! Feeds job results back into the dependency state while a build runs.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::JobStatus;
use crate::deps::{
    integrate_record, mark_needs_rebuild, read_record, record_fingerprint, DirtyReason, DirtySet,
    PriorBuildState,
};
use crate::engine::{CompletionObserver, ExecutionReport};
use crate::fingerprint::Fingerprint;
use crate::fs::FileSystem;
use crate::plan::{BuildPlan, Job, JobId, JobKind};

/// [`CompletionObserver`] that integrates dependency records as compile
/// jobs finish and revives clean compile jobs their interface changes
/// invalidate.
pub struct IncrementalTracker {
    plan: Arc<BuildPlan>,
    fs: Arc<dyn FileSystem>,
    state: PriorBuildState,
    dirty: DirtySet,
    /// Current fingerprint of every tracked input.
    fingerprints: BTreeMap<PathBuf, Fingerprint>,
    /// Compile job holding each primary.
    compile_of: BTreeMap<PathBuf, JobId>,
}

impl IncrementalTracker {
    pub fn new(
        plan: Arc<BuildPlan>,
        fs: Arc<dyn FileSystem>,
        state: PriorBuildState,
        dirty: DirtySet,
        fingerprints: BTreeMap<PathBuf, Fingerprint>,
    ) -> Self {
        let mut compile_of = BTreeMap::new();
        for job in plan.graph.jobs() {
            for primary in job.primaries() {
                compile_of.insert(primary.to_path_buf(), job.id);
            }
        }
        Self {
            plan,
            fs,
            state,
            dirty,
            fingerprints,
            compile_of,
        }
    }

    pub fn state(&self) -> &PriorBuildState {
        &self.state
    }

    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    fn integrate_units(&mut self, job: &Job) -> BTreeSet<PathBuf> {
        let mut invalidated = BTreeSet::new();
        for unit in job.units() {
            let Some(fingerprint) = self.fingerprints.get(&unit.primary).cloned() else {
                warn!(file = ?unit.primary, "compiled primary is not a tracked input");
                continue;
            };
            let record = unit.record.as_ref().and_then(|artifact| {
                match read_record(self.fs.as_ref(), &artifact.path) {
                    Ok(record) => Some(record),
                    Err(err) => {
                        warn!(
                            file = ?unit.primary,
                            record = ?artifact.path,
                            error = %err,
                            "dependency record unreadable; treating every declaration as changed"
                        );
                        None
                    }
                }
            });
            let invalidation =
                integrate_record(&mut self.state, &unit.primary, &fingerprint, record.as_ref());
            invalidated.extend(invalidation.invalidated);
        }
        invalidated
    }

    /// Clean compile jobs of `invalidated` inputs, to be revived.
    fn second_wave(&mut self, invalidated: BTreeSet<PathBuf>) -> Vec<JobId> {
        let mut revive = BTreeSet::new();
        for path in invalidated {
            let Some(&job) = self.compile_of.get(&path) else {
                continue;
            };
            if self.plan.disposition(job).is_scheduled() || self.dirty.contains(&path) {
                continue;
            }
            self.dirty.insert(path.clone(), DirtyReason::InterfaceChanged);
            mark_needs_rebuild(&mut self.state, &path);
            info!(file = ?path, "interface change invalidated input; recompiling");
            revive.insert(job);
        }
        revive.into_iter().collect()
    }

    /// Settle stale job keys and hand back the final state and dirty set.
    pub fn finish(mut self, report: &ExecutionReport) -> (PriorBuildState, DirtySet) {
        for entry in &report.jobs {
            let job = self.plan.graph.job(entry.id);
            match entry.status {
                JobStatus::Skipped => {}
                JobStatus::Succeeded => {
                    for key in job.origin_keys() {
                        self.state.stale_jobs.remove(key.as_str());
                    }
                }
                JobStatus::Failed | JobStatus::Blocked | JobStatus::Cancelled => {
                    for key in job.origin_keys() {
                        self.state.stale_jobs.insert(key.to_string());
                    }
                    if job.is_compile() {
                        for source in job.source_inputs() {
                            mark_needs_rebuild(&mut self.state, source);
                        }
                    }
                }
            }
        }

        let planned: BTreeSet<String> = self
            .plan
            .graph
            .jobs()
            .flat_map(|job| job.origin_keys())
            .map(|key| key.to_string())
            .collect();
        let before = self.state.stale_jobs.len();
        self.state.stale_jobs.retain(|key| planned.contains(key));
        if self.state.stale_jobs.len() != before {
            debug!(
                dropped = before - self.state.stale_jobs.len(),
                "dropped stale keys of jobs no longer planned"
            );
        }

        (self.state, self.dirty)
    }
}

impl CompletionObserver for IncrementalTracker {
    fn job_succeeded(&mut self, job: &Job) -> Vec<JobId> {
        match &job.kind {
            JobKind::Compile(compile) if compile.whole_module => {
                for source in job.source_inputs() {
                    if let Some(fingerprint) = self.fingerprints.get(source).cloned() {
                        record_fingerprint(&mut self.state, source, fingerprint);
                    }
                }
                Vec::new()
            }
            JobKind::Compile(_) => {
                let invalidated = self.integrate_units(job);
                self.second_wave(invalidated)
            }
            JobKind::GeneratePch { header } => {
                if let Some(fingerprint) = self.fingerprints.get(header).cloned() {
                    record_fingerprint(&mut self.state, header, fingerprint);
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}
