// src/plan/job.rs

//! Job descriptions produced by the planner.
//!
//! A [`Job`] is immutable once planned. The scheduler only looks at ids and
//! prerequisites; runners only look at the [`CommandLine`]; the incremental
//! tracker looks at the [`JobKind`].

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::artifact::{Artifact, FileType};
use crate::fingerprint::{compute_aggregate_fingerprint, Fingerprint};
use crate::types::LinkOutput;

/// Every output path is passed as `-o <path>`.
pub const OUTPUT_FLAG: &str = "-o";
/// The primary input of a compile unit.
pub const PRIMARY_FLAG: &str = "--primary";
/// Where a compile unit writes its dependency record.
pub const EMIT_DEPS_FLAG: &str = "--emit-deps";

/// Dense index of a job in plan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u32);

impl JobId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable textual identity of a job, e.g. `compile:/proj/a.src`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey(String);

impl JobKey {
    pub fn compile(primary: &Path) -> Self {
        JobKey(format!("compile:{}", primary.display()))
    }

    pub fn whole_module(module_name: &str) -> Self {
        JobKey(format!("compile:{module_name}"))
    }

    pub fn batch(first: &Path, last: &Path) -> Self {
        JobKey(format!("batch:{}..{}", first.display(), last.display()))
    }

    pub fn merge_module(module_name: &str) -> Self {
        JobKey(format!("merge-module:{module_name}"))
    }

    pub fn generate_interface(module_name: &str) -> Self {
        JobKey(format!("generate-interface:{module_name}"))
    }

    pub fn generate_pch(header: &Path) -> Self {
        JobKey(format!("generate-pch:{}", header.display()))
    }

    pub fn build_module(module_name: &str) -> Self {
        JobKey(format!("build-module:{module_name}"))
    }

    pub fn link(output: &Path) -> Self {
        JobKey(format!("link:{}", output.display()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobKey {
    fn from(s: &str) -> Self {
        JobKey(s.to_string())
    }
}

/// Tool invocation. Opaque to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandLine {
    pub tool: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    pub fn flag_path(self, flag: &str, path: &Path) -> Self {
        self.arg(flag).path_arg(path)
    }

    /// Values that follow each occurrence of `flag`, in order.
    pub fn values_of(&self, flag: &str) -> Vec<&str> {
        self.args
            .windows(2)
            .filter(|pair| pair[0] == flag)
            .map(|pair| pair[1].as_str())
            .collect()
    }

    /// Arguments with every per-unit flag pair removed.
    ///
    /// Two compile commands with equal shared args differ only in which
    /// primaries they compile.
    pub fn shared_args(&self) -> Vec<String> {
        let mut shared = Vec::with_capacity(self.args.len());
        let mut iter = self.args.iter();
        while let Some(arg) = iter.next() {
            if is_unit_flag(arg) {
                iter.next();
            } else {
                shared.push(arg.clone());
            }
        }
        shared
    }

    /// One command compiling the units of every member.
    ///
    /// Shared args come from the first member; unit flags from each member
    /// are appended in member order.
    pub fn merge_batch(members: &[&CommandLine]) -> Option<CommandLine> {
        let first = members.first()?;
        let mut merged = CommandLine {
            tool: first.tool.clone(),
            args: first.shared_args(),
        };
        for member in members {
            let mut iter = member.args.iter();
            while let Some(arg) = iter.next() {
                if is_unit_flag(arg) {
                    if let Some(value) = iter.next() {
                        merged.args.push(arg.clone());
                        merged.args.push(value.clone());
                    }
                }
            }
        }
        Some(merged)
    }
}

fn is_unit_flag(arg: &str) -> bool {
    arg == OUTPUT_FLAG || arg == PRIMARY_FLAG || arg == EMIT_DEPS_FLAG
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tool)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// One primary input compiled by a compile job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileUnit {
    pub primary: PathBuf,
    pub outputs: Vec<Artifact>,
    /// Dependency record written for this primary.
    pub record: Option<Artifact>,
    /// Key of the per-file job this unit was planned as.
    pub origin: JobKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileJob {
    /// Empty for a whole-module compile.
    pub units: Vec<CompileUnit>,
    pub whole_module: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    Compile(CompileJob),
    MergeModule { module_name: String },
    GenerateInterface { module_name: String },
    GeneratePch { header: PathBuf },
    BuildModule { module_name: String },
    Link { output: LinkOutput },
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Compile(c) if c.whole_module => "compile-module",
            JobKind::Compile(c) if c.units.len() > 1 => "batch-compile",
            JobKind::Compile(_) => "compile",
            JobKind::MergeModule { .. } => "merge-module",
            JobKind::GenerateInterface { .. } => "generate-interface",
            JobKind::GeneratePch { .. } => "generate-pch",
            JobKind::BuildModule { .. } => "build-module",
            JobKind::Link { .. } => "link",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub key: JobKey,
    pub kind: JobKind,
    pub inputs: Vec<Artifact>,
    pub outputs: Vec<Artifact>,
    pub command: CommandLine,
    pub prerequisites: BTreeSet<JobId>,
}

impl Job {
    /// Compile units of this job; empty for non-compile jobs.
    pub fn units(&self) -> &[CompileUnit] {
        match &self.kind {
            JobKind::Compile(c) => &c.units,
            _ => &[],
        }
    }

    pub fn primaries(&self) -> impl Iterator<Item = &Path> {
        self.units().iter().map(|u| u.primary.as_path())
    }

    /// Keys this job answers for in persisted state.
    ///
    /// A batch job answers for the per-file jobs it replaced.
    pub fn origin_keys(&self) -> Vec<JobKey> {
        match &self.kind {
            JobKind::Compile(c) if !c.units.is_empty() => {
                c.units.iter().map(|u| u.origin.clone()).collect()
            }
            _ => vec![self.key.clone()],
        }
    }

    pub fn source_inputs(&self) -> impl Iterator<Item = &Path> {
        self.inputs
            .iter()
            .filter(|a| a.file_type == FileType::Source)
            .map(|a| a.path.as_path())
    }

    pub fn is_compile(&self) -> bool {
        matches!(self.kind, JobKind::Compile(_))
    }

    /// Fingerprint of the tool and its arguments, leaving out any argument
    /// in `ignored`.
    ///
    /// Compile commands list every input of the module; callers pass those
    /// paths here so that adding a sibling input keeps the fingerprint.
    pub fn command_fingerprint(&self, ignored: &BTreeSet<String>) -> Fingerprint {
        let parts: Vec<Fingerprint> = std::iter::once(self.command.tool.as_str())
            .chain(
                self.command
                    .args
                    .iter()
                    .map(String::as_str)
                    .filter(|arg| !ignored.contains(*arg)),
            )
            .map(|part| Fingerprint::of_bytes(part.as_bytes()))
            .collect();
        compute_aggregate_fingerprint(parts.iter())
    }
}

/// A job before it has been assigned an id.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub key: JobKey,
    pub kind: JobKind,
    pub inputs: Vec<Artifact>,
    pub outputs: Vec<Artifact>,
    pub command: CommandLine,
    pub prerequisites: BTreeSet<JobId>,
}

impl JobSpec {
    pub fn into_job(self, id: JobId) -> Job {
        Job {
            id,
            key: self.key,
            kind: self.kind,
            inputs: self.inputs,
            outputs: self.outputs,
            command: self.command,
            prerequisites: self.prerequisites,
        }
    }
}
