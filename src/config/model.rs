// src/config/model.rs

use serde::Deserialize;

use crate::types::{CompilationMode, OutputKind};

/// Request file exactly as read from TOML, before validation.
///
/// ```toml
/// [build]
/// module_name = "App"
/// outputs = ["object", "executable"]
/// jobs = 4
/// batch_size = 8
///
/// [inputs]
/// include = ["src/**/*.src"]
/// exclude = ["src/**/*_test.src"]
///
/// [tools]
/// compiler = "cc"
/// linker = "ld"
/// ```
///
/// All sections except `[build]` are optional.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRequestFile {
    pub build: BuildSection,

    #[serde(default)]
    pub inputs: InputsSection,

    #[serde(default)]
    pub tools: ToolsSection,
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    pub module_name: String,

    /// Requested outputs, e.g. `["object", "module", "executable"]`.
    #[serde(default = "default_outputs")]
    pub outputs: Vec<OutputKind>,

    #[serde(default)]
    pub mode: CompilationMode,

    /// Maximum concurrent jobs. Defaults to the number of CPUs.
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Compile jobs per batch; unset, 0 and 1 disable batching.
    #[serde(default)]
    pub batch_size: Option<usize>,

    #[serde(default)]
    pub fail_fast: bool,

    /// Directory for every produced artifact, relative to the request file.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Where the build state is persisted. Defaults to
    /// `<output_dir>/driverdag-state.json`.
    #[serde(default)]
    pub state_file: Option<String>,

    #[serde(default)]
    pub explicit_modules: bool,

    #[serde(default)]
    pub bridging_header: Option<String>,

    #[serde(default)]
    pub libraries: Vec<String>,

    #[serde(default)]
    pub compiler_args: Vec<String>,
}

fn default_outputs() -> Vec<OutputKind> {
    vec![OutputKind::Object]
}

fn default_output_dir() -> String {
    "build".to_string()
}

/// `[inputs]` section.
///
/// `files` are taken as-is; `include`/`exclude` are globs matched against
/// paths relative to the request file's directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputsSection {
    #[serde(default)]
    pub files: Vec<String>,

    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

/// `[tools]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsSection {
    #[serde(default = "default_compiler")]
    pub compiler: String,

    #[serde(default)]
    pub linker: Option<String>,

    /// Tool that prints the module dependency graph as JSON.
    #[serde(default)]
    pub scanner: Option<String>,
}

fn default_compiler() -> String {
    "cc".to_string()
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            compiler: default_compiler(),
            linker: None,
            scanner: None,
        }
    }
}

/// A request file that passed validation.
///
/// Constructed via `TryFrom<RawRequestFile>` so that every `RequestFile` in
/// the program has already been checked.
#[derive(Debug, Clone)]
pub struct RequestFile {
    build: BuildSection,
    inputs: InputsSection,
    tools: ToolsSection,
}

impl RequestFile {
    pub(crate) fn new_unchecked(
        build: BuildSection,
        inputs: InputsSection,
        tools: ToolsSection,
    ) -> Self {
        Self {
            build,
            inputs,
            tools,
        }
    }

    pub fn build(&self) -> &BuildSection {
        &self.build
    }

    pub fn inputs(&self) -> &InputsSection {
        &self.inputs
    }

    pub fn tools(&self) -> &ToolsSection {
        &self.tools
    }
}
