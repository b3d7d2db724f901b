// src/plan/mod.rs

//! Job planning: build the job graph for a request, decide what runs, and
//! batch compile jobs.

pub mod batch;
pub mod builder;
pub mod graph;
pub mod job;
pub mod modules;
pub mod prune;

pub use batch::partition;
pub use builder::plan;
pub use graph::{JobGraph, JobGraphBuilder};
pub use job::{CommandLine, CompileJob, CompileUnit, Job, JobId, JobKey, JobKind, JobSpec};
pub use modules::{DependencyScanner, ExternalModule, ModuleDependencyGraph, ToolScanner};
pub use prune::{prune, BuildPlan, Disposition, ScheduleReason};
