// src/driver/mod.rs

//! One incremental build, start to finish.
//!
//! [`Driver::prepare`] loads the prior state, computes the dirty set, scans
//! module dependencies when asked to, plans, prunes and batches. Everything
//! up to here is synchronous and completes before any job starts.
//! [`Driver::run`] then executes the plan with an [`IncrementalTracker`]
//! observing completions, and persists the resulting state.

pub mod tracker;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::BuildRequest;
use crate::deps::{
    compute_dirty_set, DirtyComputation, DirtySet, PriorBuildState, StateLoad, StateStore,
};
use crate::engine::{CancelHandle, ExecutionOptions, ExecutionReport, Executor};
use crate::errors::PlanningError;
use crate::exec::ProcessRunner;
use crate::fingerprint::Fingerprint;
use crate::fs::FileSystem;
use crate::plan::{
    partition, plan, prune, BuildPlan, DependencyScanner, JobGraph, JobKind, ToolScanner,
};

pub use tracker::IncrementalTracker;

/// Result of the planning phase.
#[derive(Debug, Clone)]
pub struct PlannedBuild {
    pub plan: BuildPlan,
    pub dirty: DirtySet,
    /// State carried into execution.
    pub state: PriorBuildState,
    /// Inputs that left the input set since the last build.
    pub removed: Vec<PathBuf>,
}

pub struct Driver<R: ProcessRunner + 'static> {
    request: BuildRequest,
    fs: Arc<dyn FileSystem>,
    runner: Arc<R>,
    scanner: Option<Box<dyn DependencyScanner>>,
    store: StateStore,
}

impl<R: ProcessRunner + 'static> std::fmt::Debug for Driver<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("module", &self.request.module_name)
            .field("state", &self.store.path())
            .finish_non_exhaustive()
    }
}

impl<R: ProcessRunner + 'static> Driver<R> {
    /// A driver for `request`. When the request names a scanner tool it is
    /// used for explicit module builds.
    pub fn new(request: BuildRequest, fs: Arc<dyn FileSystem>, runner: Arc<R>) -> Self {
        let store = StateStore::new(Arc::clone(&fs), request.state_path.clone());
        let scanner = request
            .tools
            .scanner
            .as_ref()
            .map(|tool| Box::new(ToolScanner::new(tool.clone())) as Box<dyn DependencyScanner>);
        Self {
            request,
            fs,
            runner,
            scanner,
            store,
        }
    }

    pub fn with_scanner(mut self, scanner: impl DependencyScanner + 'static) -> Self {
        self.scanner = Some(Box::new(scanner));
        self
    }

    pub fn request(&self) -> &BuildRequest {
        &self.request
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    fn load_state(&self) -> StateLoad {
        let options = self.request.options_fingerprint();
        match self.store.load() {
            StateLoad::Loaded(state) if state.options.as_ref() != Some(&options) => {
                info!("build options changed since the last build; rebuilding everything");
                StateLoad::Missing
            }
            other => other,
        }
    }

    /// Plan the build without running anything.
    pub fn prepare(&self) -> Result<PlannedBuild, PlanningError> {
        let request = &self.request;
        let DirtyComputation {
            dirty,
            mut state,
            removed,
        } = compute_dirty_set(self.load_state(), &request.tracked_inputs())?;
        state.options = Some(request.options_fingerprint());

        let modules = if request.explicit_modules {
            let scanner = self.scanner.as_ref().ok_or_else(|| {
                PlanningError::MalformedRequest(
                    "explicit modules requested but no dependency scanner is configured"
                        .to_string(),
                )
            })?;
            Some(scanner.scan(&request.source_paths())?)
        } else {
            None
        };

        let graph = plan(request, modules.as_ref())?;
        let stale = stale_keys(&graph, &state, &removed);
        let commands = command_fingerprints(&graph, request);
        let changed = changed_commands(&commands, &state.commands);
        let pruned = prune(graph, &dirty, &stale, &changed, self.fs.as_ref());
        state.commands = commands;
        let plan = partition(pruned, request.batch_size)?;

        Ok(PlannedBuild {
            plan,
            dirty,
            state,
            removed,
        })
    }

    pub async fn run(&self) -> Result<ExecutionReport, PlanningError> {
        self.run_with(|_| {}).await
    }

    /// Like [`run`](Driver::run), handing a [`CancelHandle`] to `on_start`
    /// before the first job is dispatched.
    pub async fn run_with<F>(&self, on_start: F) -> Result<ExecutionReport, PlanningError>
    where
        F: FnOnce(CancelHandle),
    {
        let PlannedBuild {
            plan, dirty, state, ..
        } = self.prepare()?;
        let plan = Arc::new(plan);

        let fingerprints: BTreeMap<PathBuf, _> = self
            .request
            .tracked_inputs()
            .into_iter()
            .map(|input| (input.path, input.fingerprint))
            .collect();
        let mut tracker = IncrementalTracker::new(
            Arc::clone(&plan),
            Arc::clone(&self.fs),
            state,
            dirty,
            fingerprints,
        );

        let executor = Executor::new(
            Arc::clone(&self.runner),
            ExecutionOptions {
                concurrency: self.request.concurrency,
                failure_policy: self.request.failure_policy,
            },
        );
        on_start(executor.cancel_handle());
        let mut report = executor.execute(Arc::clone(&plan), &mut tracker).await;

        let (state, dirty) = tracker.finish(&report);
        if let Err(err) = self.store.save(&state) {
            warn!(error = %err, path = ?self.store.path(), "failed to save build state");
        }
        report.dirty = dirty;
        report.state = Some(state);
        Ok(report)
    }
}

/// Command fingerprint of every job in `graph`, by key. Computed before
/// batching, so the keys are the per-file ones.
fn command_fingerprints(
    graph: &JobGraph,
    request: &BuildRequest,
) -> BTreeMap<String, Fingerprint> {
    let sources: BTreeSet<String> = request
        .source_paths()
        .iter()
        .map(|path| path.display().to_string())
        .collect();
    let none = BTreeSet::new();
    graph
        .jobs()
        .map(|job| {
            let ignored = if job.is_compile() { &sources } else { &none };
            (job.key.to_string(), job.command_fingerprint(ignored))
        })
        .collect()
}

/// Keys whose command differs from the one recorded last time. Jobs without
/// a recorded command are left to the other scheduling rules.
fn changed_commands(
    current: &BTreeMap<String, Fingerprint>,
    prior: &BTreeMap<String, Fingerprint>,
) -> BTreeSet<String> {
    let changed: BTreeSet<String> = current
        .iter()
        .filter(|(key, fingerprint)| prior.get(*key).is_some_and(|old| old != *fingerprint))
        .map(|(key, _)| key.clone())
        .collect();
    if !changed.is_empty() {
        info!(jobs = changed.len(), "job commands changed since the last build");
    }
    changed
}

/// Stale keys for pruning: the persisted ones, plus every aggregate job when
/// inputs left the build, since their input lists shrank without any
/// remaining input being dirty.
fn stale_keys(graph: &JobGraph, state: &PriorBuildState, removed: &[PathBuf]) -> BTreeSet<String> {
    let mut stale = state.stale_jobs.clone();
    if removed.is_empty() {
        return stale;
    }
    info!(removed = removed.len(), "inputs left the build; re-running aggregate jobs");
    for job in graph.jobs() {
        let aggregate = match &job.kind {
            JobKind::Compile(compile) => compile.whole_module,
            JobKind::MergeModule { .. } | JobKind::GenerateInterface { .. } | JobKind::Link { .. } => {
                true
            }
            JobKind::GeneratePch { .. } | JobKind::BuildModule { .. } => false,
        };
        if aggregate {
            stale.insert(job.key.to_string());
        }
    }
    stale
}
