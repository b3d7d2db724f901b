// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running job commands and
//! reporting back to the coordinator via `RuntimeEvent`s.
//!
//! - [`backend`] provides the `ProcessRunner` trait and the concrete
//!   `TokioProcessRunner` the binary uses, which tests replace with a fake.
//! - [`job_runner`] runs one job and reports its outcome.
//! - [`diagnostics`] turns captured tool output into per-input diagnostics.

pub mod backend;
pub mod diagnostics;
pub mod job_runner;

pub use backend::{ProcessOutput, ProcessRunner, SpawnError, TokioProcessRunner};
pub use job_runner::run_job;
