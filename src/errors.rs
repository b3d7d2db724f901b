// src/errors.rs

//! Crate-wide error types.
//!
//! Planning errors are fatal and surface before any job runs. Everything that
//! goes wrong while jobs execute is recorded per job in the execution report
//! instead of being returned from here.

use thiserror::Error;

/// A request or graph that cannot be turned into a valid job plan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("no rule can produce the requested output: {0}")]
    MissingOutputRule(String),

    #[error("job '{0}' cannot depend on itself")]
    SelfDependency(String),

    #[error("job '{job}' depends on job #{prerequisite}, which has not been added")]
    UnknownPrerequisite { job: String, prerequisite: u32 },

    #[error("job '{0}' was added twice")]
    DuplicateJob(String),

    #[error("cycle detected in job graph involving job '{0}'")]
    JobCycle(String),

    #[error("cycle detected in module dependency graph involving module '{0}'")]
    ModuleCycle(String),

    #[error("module '{module}' depends on unknown module '{dependency}'")]
    UnknownModule { module: String, dependency: String },

    #[error("cycle detected in declaration interface edges involving '{0}'")]
    DependencyCycle(String),

    #[error("module dependency scan failed: {0}")]
    ScanFailed(String),
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Planning error: {0}")]
    Planning(#[from] PlanningError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DriverError>;
