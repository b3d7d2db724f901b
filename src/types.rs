// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How compile jobs are laid out over the inputs of a request.
///
/// - `PerFile` (default): one compile job per input, which is what makes
///   per-file incremental skipping possible.
/// - `WholeModule`: a single compile job covering every input. There is no
///   incremental granularity below the module boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompilationMode {
    #[default]
    PerFile,
    WholeModule,
}

impl FromStr for CompilationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "per-file" | "perfile" | "incremental" => Ok(CompilationMode::PerFile),
            "whole-module" | "wholemodule" | "wmo" => Ok(CompilationMode::WholeModule),
            other => Err(format!(
                "invalid compilation mode: {other} (expected \"per-file\" or \"whole-module\")"
            )),
        }
    }
}

impl fmt::Display for CompilationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilationMode::PerFile => f.write_str("per-file"),
            CompilationMode::WholeModule => f.write_str("whole-module"),
        }
    }
}

/// What the executor does once a job fails.
///
/// - `FailFast`: stop dispatching new jobs immediately; jobs already running
///   are allowed to finish.
/// - `ContinueOnFailure` (default): keep running every branch that does not
///   depend on the failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    FailFast,
    #[default]
    ContinueOnFailure,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail-fast" | "failfast" => Ok(FailurePolicy::FailFast),
            "continue" | "continue-on-failure" | "keep-going" => {
                Ok(FailurePolicy::ContinueOnFailure)
            }
            other => Err(format!(
                "invalid failure policy: {other} (expected \"fail-fast\" or \"continue-on-failure\")"
            )),
        }
    }
}

/// Kind of linked product a link job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkOutput {
    Executable,
    DynamicLibrary,
    StaticLibrary,
}

impl fmt::Display for LinkOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkOutput::Executable => f.write_str("executable"),
            LinkOutput::DynamicLibrary => f.write_str("dynamic-library"),
            LinkOutput::StaticLibrary => f.write_str("static-library"),
        }
    }
}

/// An output the caller asked the driver to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    /// Object files for every input.
    Object,
    /// A single merged module for the whole input set.
    Module,
    /// A textual module interface generated from the merged module.
    Interface,
    Executable,
    DynamicLibrary,
    StaticLibrary,
}

impl OutputKind {
    /// The link product this output corresponds to, if it is one.
    pub fn link_output(self) -> Option<LinkOutput> {
        match self {
            OutputKind::Executable => Some(LinkOutput::Executable),
            OutputKind::DynamicLibrary => Some(LinkOutput::DynamicLibrary),
            OutputKind::StaticLibrary => Some(LinkOutput::StaticLibrary),
            OutputKind::Object | OutputKind::Module | OutputKind::Interface => None,
        }
    }
}

impl FromStr for OutputKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "object" | "obj" => Ok(OutputKind::Object),
            "module" => Ok(OutputKind::Module),
            "interface" => Ok(OutputKind::Interface),
            "executable" | "exe" => Ok(OutputKind::Executable),
            "dynamic-library" | "dylib" => Ok(OutputKind::DynamicLibrary),
            "static-library" | "staticlib" => Ok(OutputKind::StaticLibrary),
            other => Err(format!("invalid output kind: {other}")),
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputKind::Object => "object",
            OutputKind::Module => "module",
            OutputKind::Interface => "interface",
            OutputKind::Executable => "executable",
            OutputKind::DynamicLibrary => "dynamic-library",
            OutputKind::StaticLibrary => "static-library",
        };
        f.write_str(s)
    }
}
