// src/config/request.rs

//! The fully resolved compilation request handed to the driver.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;

use crate::fingerprint::{compute_aggregate_fingerprint, compute_file_fingerprint, Fingerprint};
use crate::fs::FileSystem;
use crate::types::{CompilationMode, FailurePolicy, LinkOutput, OutputKind};

/// A source input together with its current content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
}

impl InputFile {
    pub fn read(fs: &dyn FileSystem, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let fingerprint = compute_file_fingerprint(fs, &path)?;
        Ok(Self { path, fingerprint })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub compiler: String,
    pub linker: Option<String>,
    pub scanner: Option<String>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            compiler: "cc".to_string(),
            linker: None,
            scanner: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub module_name: String,
    pub inputs: Vec<InputFile>,
    pub outputs: BTreeSet<OutputKind>,
    pub mode: CompilationMode,
    /// Maximum number of jobs running at once.
    pub concurrency: usize,
    /// Compile jobs per batch. `None`, 0 and 1 disable batching.
    pub batch_size: Option<usize>,
    pub failure_policy: FailurePolicy,
    pub libraries: Vec<PathBuf>,
    pub bridging_header: Option<InputFile>,
    pub explicit_modules: bool,
    pub compiler_args: Vec<String>,
    pub output_dir: PathBuf,
    pub state_path: PathBuf,
    pub tools: Toolchain,
}

impl BuildRequest {
    /// Every input whose fingerprint the dependency engine tracks.
    pub fn tracked_inputs(&self) -> Vec<InputFile> {
        let mut inputs = self.inputs.clone();
        if let Some(header) = &self.bridging_header {
            inputs.push(header.clone());
        }
        inputs
    }

    pub fn source_paths(&self) -> Vec<PathBuf> {
        self.inputs.iter().map(|i| i.path.clone()).collect()
    }

    pub fn needs_objects(&self) -> bool {
        self.outputs.contains(&OutputKind::Object) || self.link_outputs().next().is_some()
    }

    pub fn needs_module(&self) -> bool {
        self.outputs.contains(&OutputKind::Module) || self.outputs.contains(&OutputKind::Interface)
    }

    pub fn wants_interface(&self) -> bool {
        self.outputs.contains(&OutputKind::Interface)
    }

    pub fn link_outputs(&self) -> impl Iterator<Item = LinkOutput> + '_ {
        self.outputs.iter().filter_map(|o| o.link_output())
    }

    /// Fingerprint of the options every compile and dependency record
    /// depends on. A change invalidates the whole prior state; narrower
    /// command changes are caught per job by the driver.
    pub fn options_fingerprint(&self) -> Fingerprint {
        let mut parts = vec![
            Fingerprint::of_bytes(self.module_name.as_bytes()),
            Fingerprint::of_bytes(self.mode.to_string().as_bytes()),
            Fingerprint::of_bytes(self.tools.compiler.as_bytes()),
            Fingerprint::of_bytes(self.output_dir.to_string_lossy().as_bytes()),
        ];
        parts.extend(
            self.compiler_args
                .iter()
                .map(|a| Fingerprint::of_bytes(a.as_bytes())),
        );
        compute_aggregate_fingerprint(parts.iter())
    }
}
