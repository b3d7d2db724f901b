// src/deps/mod.rs

//! Incremental dependency engine.
//!
//! - [`record`] is the JSON dependency record a compile job writes.
//! - [`graph`] is the declaration-level graph built from those records.
//! - [`state`] persists the graph and per-input fingerprints between runs.
//! - [`engine`] computes the dirty set and integrates new records.

pub mod engine;
pub mod graph;
pub mod record;
pub mod state;

pub use engine::{
    compute_dirty_set, integrate_record, mark_needs_rebuild, record_fingerprint,
    DirtyComputation, DirtyReason, DirtySet, Invalidation,
};
pub use graph::{DependencyGraph, KeyChange, KeyChangeKind};
pub use record::{read_record, DeclarationRecord, DependencyRecord};
pub use state::{PriorBuildState, StateLoad, StateStore, STATE_FILE};
