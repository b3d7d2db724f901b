// src/artifact.rs

//! Typed file handles and deterministic output naming.
//!
//! Every file the driver reads or produces is an [`Artifact`]: a path plus a
//! [`FileType`] tag. Identity is the `(path, type)` pair. Output names are
//! derived from input stems by [`OutputLayout`], so identical requests always
//! produce identical artifacts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::LinkOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileType {
    Source,
    Header,
    PrecompiledHeader,
    Object,
    ModuleSummary,
    Module,
    ModuleInterface,
    ExternalModule,
    DependencyRecord,
    Library,
    LinkedBinary,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileType::Source => "source",
            FileType::Header => "header",
            FileType::PrecompiledHeader => "pch",
            FileType::Object => "object",
            FileType::ModuleSummary => "module-summary",
            FileType::Module => "module",
            FileType::ModuleInterface => "interface",
            FileType::ExternalModule => "external-module",
            FileType::DependencyRecord => "deps",
            FileType::Library => "library",
            FileType::LinkedBinary => "binary",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub file_type: FileType,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, file_type: FileType) -> Self {
        Self {
            path: path.into(),
            file_type,
        }
    }

    pub fn source(path: impl Into<PathBuf>) -> Self {
        Self::new(path, FileType::Source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.file_type)
    }
}

/// Outputs produced for one primary input of a per-file compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerInputOutputs {
    pub object: Artifact,
    pub summary: Artifact,
    pub record: Artifact,
}

/// Names every output artifact of a request.
///
/// Stems are unique across the input set: when two inputs share a file stem
/// (`a/util.src`, `b/util.src`), both get a short suffix derived from the hash
/// of their full path.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    output_dir: PathBuf,
    module_name: String,
    stems: BTreeMap<PathBuf, String>,
}

impl OutputLayout {
    pub fn new<'a, I>(output_dir: impl Into<PathBuf>, module_name: &str, inputs: I) -> Self
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let inputs: Vec<&Path> = inputs.into_iter().collect();

        let mut seen = BTreeSet::new();
        let mut colliding = BTreeSet::new();
        for input in &inputs {
            let stem = plain_stem(input);
            if !seen.insert(stem.clone()) {
                colliding.insert(stem);
            }
        }

        let stems = inputs
            .iter()
            .map(|input| {
                let stem = plain_stem(input);
                let unique = if colliding.contains(&stem) {
                    let digest = blake3::hash(input.to_string_lossy().as_bytes()).to_hex();
                    format!("{stem}-{}", &digest.as_str()[..8])
                } else {
                    stem
                };
                (input.to_path_buf(), unique)
            })
            .collect();

        Self {
            output_dir: output_dir.into(),
            module_name: module_name.to_string(),
            stems,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn stem_of(&self, input: &Path) -> String {
        self.stems
            .get(input)
            .cloned()
            .unwrap_or_else(|| plain_stem(input))
    }

    pub fn per_input(&self, input: &Path) -> PerInputOutputs {
        let stem = self.stem_of(input);
        PerInputOutputs {
            object: Artifact::new(self.output_dir.join(format!("{stem}.o")), FileType::Object),
            summary: Artifact::new(
                self.output_dir.join(format!("{stem}.summary")),
                FileType::ModuleSummary,
            ),
            record: Artifact::new(
                self.output_dir.join(format!("{stem}.deps.json")),
                FileType::DependencyRecord,
            ),
        }
    }

    /// Single object produced by a whole-module compile.
    pub fn whole_module_object(&self) -> Artifact {
        Artifact::new(
            self.output_dir.join(format!("{}.o", self.module_name)),
            FileType::Object,
        )
    }

    pub fn merged_module(&self) -> Artifact {
        Artifact::new(
            self.output_dir.join(format!("{}.module", self.module_name)),
            FileType::Module,
        )
    }

    pub fn module_interface(&self) -> Artifact {
        Artifact::new(
            self.output_dir.join(format!("{}.interface", self.module_name)),
            FileType::ModuleInterface,
        )
    }

    pub fn precompiled_header(&self, header: &Path) -> Artifact {
        Artifact::new(
            self.output_dir.join(format!("{}.pch", plain_stem(header))),
            FileType::PrecompiledHeader,
        )
    }

    pub fn external_module(&self, name: &str) -> Artifact {
        Artifact::new(
            self.output_dir.join("modules").join(format!("{name}.module")),
            FileType::ExternalModule,
        )
    }

    pub fn linked(&self, output: LinkOutput) -> Artifact {
        let file = match output {
            LinkOutput::Executable => self.module_name.clone(),
            LinkOutput::DynamicLibrary => format!("lib{}.so", self.module_name),
            LinkOutput::StaticLibrary => format!("lib{}.a", self.module_name),
        };
        Artifact::new(self.output_dir.join(file), FileType::LinkedBinary)
    }
}

fn plain_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string())
}
