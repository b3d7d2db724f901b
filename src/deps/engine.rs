// src/deps/engine.rs

//! Dirty-set computation and post-build integration.
//!
//! Before planning, [`compute_dirty_set`] compares the current inputs with the
//! prior state and decides which inputs must be recompiled. After each
//! successful compile, [`integrate_record`] folds the job's dependency record
//! back into the graph and reports which other inputs it invalidated.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::InputFile;
use crate::deps::graph::{KeyChange, KeyChangeKind};
use crate::deps::record::DependencyRecord;
use crate::deps::state::{InputRecord, PriorBuildState, StateLoad};
use crate::errors::PlanningError;
use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DirtyReason {
    /// No usable prior state; everything rebuilds.
    NoPriorState,
    /// Input was not part of the previous build.
    New,
    /// Content fingerprint differs from the recorded one.
    Modified,
    /// Input has no recorded fingerprint, usually after a failed run.
    MissingRecord,
    /// A declaration this input depends on disappeared with a deleted input.
    DependencyRemoved,
    /// An interface this input depends on changed during the current build.
    InterfaceChanged,
}

impl fmt::Display for DirtyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DirtyReason::NoPriorState => "no prior state",
            DirtyReason::New => "new input",
            DirtyReason::Modified => "modified",
            DirtyReason::MissingRecord => "no usable record",
            DirtyReason::DependencyRemoved => "dependency removed",
            DirtyReason::InterfaceChanged => "interface changed",
        };
        f.write_str(s)
    }
}

/// Inputs that must be recompiled, each with the first reason found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet {
    entries: BTreeMap<PathBuf, DirtyReason>,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path` as dirty. Returns `false` if it already was.
    pub fn insert(&mut self, path: impl Into<PathBuf>, reason: DirtyReason) -> bool {
        let path = path.into();
        if self.entries.contains_key(&path) {
            return false;
        }
        self.entries.insert(path, reason);
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn reason(&self, path: &Path) -> Option<DirtyReason> {
        self.entries.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, DirtyReason)> {
        self.entries.iter().map(|(p, r)| (p.as_path(), *r))
    }
}

#[derive(Debug, Clone)]
pub struct DirtyComputation {
    pub dirty: DirtySet,
    /// State to carry into the build: deleted inputs dropped, dirty inputs
    /// with their fingerprints cleared.
    pub state: PriorBuildState,
    /// Inputs present in the prior state but not in the current input set.
    pub removed: Vec<PathBuf>,
}

/// Decide which of `inputs` must be recompiled.
pub fn compute_dirty_set(
    prior: StateLoad,
    inputs: &[InputFile],
) -> Result<DirtyComputation, PlanningError> {
    let mut dirty = DirtySet::new();

    let mut state = match prior {
        StateLoad::Loaded(state) => state,
        StateLoad::Missing => {
            info!("no prior build state; every input is dirty");
            return Ok(fresh_computation(inputs));
        }
        StateLoad::Corrupt(reason) => {
            warn!(%reason, "prior build state is unusable; rebuilding everything");
            return Ok(fresh_computation(inputs));
        }
    };

    let current: BTreeSet<&Path> = inputs.iter().map(|i| i.path.as_path()).collect();

    let mut removed: BTreeSet<PathBuf> = state
        .inputs
        .keys()
        .filter(|p| !current.contains(p.as_path()))
        .cloned()
        .collect();
    removed.extend(
        state
            .graph
            .files()
            .into_iter()
            .filter(|p| !current.contains(p.as_path())),
    );

    let mut dependents_of_removed = BTreeSet::new();
    for path in &removed {
        let changes = state.graph.remove_file(path);
        dependents_of_removed.extend(state.graph.files_affected_by(&changes, path));
        state.inputs.remove(path);
        debug!(file = ?path, "input removed since last build");
    }

    for input in inputs {
        let reason = match state.inputs.get(&input.path) {
            None => Some(DirtyReason::New),
            Some(InputRecord { fingerprint: None }) => Some(DirtyReason::MissingRecord),
            Some(InputRecord {
                fingerprint: Some(previous),
            }) if *previous != input.fingerprint => Some(DirtyReason::Modified),
            Some(_) if dependents_of_removed.contains(&input.path) => {
                Some(DirtyReason::DependencyRemoved)
            }
            Some(_) => None,
        };
        if let Some(reason) = reason {
            debug!(file = ?input.path, %reason, "input is dirty");
            dirty.insert(input.path.clone(), reason);
        }
    }

    if let Some(key) = state.graph.find_interface_cycle() {
        return Err(PlanningError::DependencyCycle(key));
    }

    for input in inputs {
        let record = state.inputs.entry(input.path.clone()).or_default();
        if dirty.contains(&input.path) {
            record.fingerprint = None;
        }
    }

    info!(
        inputs = inputs.len(),
        dirty = dirty.len(),
        removed = removed.len(),
        "computed dirty set"
    );

    Ok(DirtyComputation {
        dirty,
        state,
        removed: removed.into_iter().collect(),
    })
}

fn fresh_computation(inputs: &[InputFile]) -> DirtyComputation {
    let mut dirty = DirtySet::new();
    let mut state = PriorBuildState::new();
    for input in inputs {
        dirty.insert(input.path.clone(), DirtyReason::NoPriorState);
        state.inputs.insert(input.path.clone(), InputRecord::default());
    }
    DirtyComputation {
        dirty,
        state,
        removed: Vec::new(),
    }
}

/// Effect of integrating one dependency record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidation {
    pub changed_keys: Vec<KeyChange>,
    /// Other inputs whose compiled output no longer matches.
    pub invalidated: BTreeSet<PathBuf>,
}

/// Fold the record of a freshly compiled `file` into `state`.
///
/// `record` is `None` when the record could not be read. That case, and a
/// record describing another file, count as every old declaration having
/// changed, and `file` keeps no fingerprint so it rebuilds next time.
pub fn integrate_record(
    state: &mut PriorBuildState,
    file: &Path,
    fingerprint: &Fingerprint,
    record: Option<&DependencyRecord>,
) -> Invalidation {
    let usable = record.filter(|r| r.source == file);

    let changed_keys = match usable {
        Some(record) => {
            let changes = state.graph.replace_declarations(file, &record.declarations);
            record_fingerprint(state, file, fingerprint.clone());
            changes
        }
        None => {
            if let Some(record) = record {
                warn!(
                    file = ?file,
                    recorded = ?record.source,
                    "dependency record describes a different source; ignoring it"
                );
            }
            mark_needs_rebuild(state, file);
            state
                .graph
                .declarations_of(file)
                .into_iter()
                .map(|decl| KeyChange {
                    key: decl.key,
                    kind: KeyChangeKind::Modified,
                })
                .collect()
        }
    };

    let invalidated = state.graph.files_affected_by(&changed_keys, file);
    if !invalidated.is_empty() {
        debug!(
            file = ?file,
            invalidated = ?invalidated,
            "integration invalidated dependents"
        );
    }

    Invalidation {
        changed_keys,
        invalidated,
    }
}

/// Clear the recorded fingerprint of `path` so it rebuilds next time.
pub fn mark_needs_rebuild(state: &mut PriorBuildState, path: &Path) {
    state.inputs.entry(path.to_path_buf()).or_default().fingerprint = None;
}

pub fn record_fingerprint(state: &mut PriorBuildState, path: &Path, fingerprint: Fingerprint) {
    state.inputs.entry(path.to_path_buf()).or_default().fingerprint = Some(fingerprint);
}
