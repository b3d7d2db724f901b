// src/engine/report.rs

//! Execution reports and the shared accumulator workers append to.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::dag::JobStatus;
use crate::deps::{DirtySet, PriorBuildState};
use crate::engine::FailureKind;
use crate::plan::{JobId, JobKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
            Severity::Note => f.write_str("note"),
        }
    }
}

/// One message emitted by a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{line}:{column}: ")?,
            (Some(line), None) => write!(f, "{line}: ")?,
            _ => {}
        }
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Where a diagnostic is filed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiagnosticOrigin {
    /// The input the diagnostic is about.
    Input(PathBuf),
    /// The job that emitted it, when no input can be named.
    Job(JobKey),
}

impl fmt::Display for DiagnosticOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticOrigin::Input(path) => write!(f, "{}", path.display()),
            DiagnosticOrigin::Job(key) => write!(f, "{key}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub id: JobId,
    pub key: JobKey,
    pub status: JobStatus,
    pub failure: Option<FailureKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every job succeeded or was skipped.
    Succeeded,
    /// At least one job failed, was blocked or was cancelled by fail-fast.
    Failed,
    /// Cancellation was requested from outside.
    Cancelled,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Succeeded => f.write_str("succeeded"),
            RunOutcome::Failed => f.write_str("failed"),
            RunOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub outcome: RunOutcome,
    /// One entry per job, in plan order.
    pub jobs: Vec<JobReport>,
    pub diagnostics: BTreeMap<DiagnosticOrigin, Vec<Diagnostic>>,
    /// Inputs that were recompiled, with the reason. Includes inputs
    /// invalidated while the build ran.
    pub dirty: DirtySet,
    /// Dependency state after this run, ready to persist.
    pub state: Option<PriorBuildState>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }

    pub fn job(&self, key: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.key.as_str() == key)
    }

    pub fn status_of(&self, key: &str) -> Option<JobStatus> {
        self.job(key).map(|j| j.status)
    }

    /// Keys of jobs that actually ran, in plan order.
    pub fn executed_keys(&self) -> Vec<&str> {
        self.jobs
            .iter()
            .filter(|j| matches!(j.status, JobStatus::Succeeded | JobStatus::Failed))
            .map(|j| j.key.as_str())
            .collect()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    pub fn diagnostics_for_input(&self, path: &Path) -> &[Diagnostic] {
        self.diagnostics
            .get(&DiagnosticOrigin::Input(path.to_path_buf()))
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Default)]
struct Accumulated {
    diagnostics: BTreeMap<DiagnosticOrigin, Vec<Diagnostic>>,
    failures: BTreeMap<JobId, FailureKind>,
}

/// Report state shared by every worker. Appends happen under a mutex.
#[derive(Debug, Clone, Default)]
pub struct ReportAccumulator {
    inner: Arc<Mutex<Accumulated>>,
}

impl ReportAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Accumulated> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_diagnostics(&self, origin: DiagnosticOrigin, diagnostics: Vec<Diagnostic>) {
        if diagnostics.is_empty() {
            return;
        }
        self.lock()
            .diagnostics
            .entry(origin)
            .or_default()
            .extend(diagnostics);
    }

    pub fn record_failure(&self, job: JobId, failure: FailureKind) {
        self.lock().failures.insert(job, failure);
    }

    pub fn failure_of(&self, job: JobId) -> Option<FailureKind> {
        self.lock().failures.get(&job).cloned()
    }

    pub fn take_diagnostics(&self) -> BTreeMap<DiagnosticOrigin, Vec<Diagnostic>> {
        std::mem::take(&mut self.lock().diagnostics)
    }
}
