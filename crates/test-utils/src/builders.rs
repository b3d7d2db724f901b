use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use driverdag::config::{BuildRequest, InputFile, Toolchain};
use driverdag::deps::STATE_FILE;
use driverdag::fs::mock::MockFileSystem;
use driverdag::types::{CompilationMode, FailurePolicy, OutputKind};

/// Builder for `BuildRequest` over a [`MockFileSystem`].
///
/// Sources added through the builder are written to the filesystem, and
/// [`build`](RequestBuilder::build) fingerprints them as they are *now*, so
/// one builder can produce the request for several consecutive runs.
#[derive(Clone)]
pub struct RequestBuilder {
    fs: MockFileSystem,
    module_name: String,
    inputs: Vec<PathBuf>,
    outputs: BTreeSet<OutputKind>,
    mode: CompilationMode,
    concurrency: usize,
    batch_size: Option<usize>,
    failure_policy: FailurePolicy,
    libraries: Vec<PathBuf>,
    bridging_header: Option<PathBuf>,
    explicit_modules: bool,
    compiler_args: Vec<String>,
    output_dir: PathBuf,
    tools: Toolchain,
}

impl RequestBuilder {
    pub fn new(fs: &MockFileSystem, module_name: &str) -> Self {
        Self {
            fs: fs.clone(),
            module_name: module_name.to_string(),
            inputs: Vec::new(),
            outputs: BTreeSet::from([OutputKind::Object]),
            mode: CompilationMode::PerFile,
            concurrency: 4,
            batch_size: None,
            failure_policy: FailurePolicy::ContinueOnFailure,
            libraries: Vec::new(),
            bridging_header: None,
            explicit_modules: false,
            compiler_args: Vec::new(),
            output_dir: PathBuf::from("/out"),
            tools: Toolchain {
                compiler: "cc".to_string(),
                linker: Some("ld".to_string()),
                scanner: None,
            },
        }
    }

    /// Write `content` to `path` and add it as an input.
    pub fn source(mut self, path: impl AsRef<Path>, content: &str) -> Self {
        self.fs.add_file(path.as_ref(), content);
        self.inputs.push(path.as_ref().to_path_buf());
        self
    }

    /// Add `count` sources `/src/f00.src`, `/src/f01.src`, ... each with a
    /// single independent declaration.
    pub fn sources(mut self, count: usize) -> Self {
        for i in 0..count {
            self = self.source(
                format!("/src/f{i:02}.src"),
                &format!("decl f{i:02}::item sig=1\n"),
            );
        }
        self
    }

    pub fn outputs(mut self, outputs: &[OutputKind]) -> Self {
        self.outputs = outputs.iter().copied().collect();
        self
    }

    pub fn mode(mut self, mode: CompilationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn fail_fast(mut self) -> Self {
        self.failure_policy = FailurePolicy::FailFast;
        self
    }

    pub fn library(mut self, path: impl Into<PathBuf>) -> Self {
        self.libraries.push(path.into());
        self
    }

    pub fn bridging_header(mut self, path: impl AsRef<Path>, content: &str) -> Self {
        self.fs.add_file(path.as_ref(), content);
        self.bridging_header = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn explicit_modules(mut self) -> Self {
        self.explicit_modules = true;
        self
    }

    pub fn compiler_arg(mut self, arg: &str) -> Self {
        self.compiler_args.push(arg.to_string());
        self
    }

    pub fn without_linker(mut self) -> Self {
        self.tools.linker = None;
        self
    }

    pub fn linker(mut self, tool: &str) -> Self {
        self.tools.linker = Some(tool.to_string());
        self
    }

    pub fn remove_library(&mut self, path: impl AsRef<Path>) {
        self.libraries.retain(|p| p != path.as_ref());
    }

    /// Stop using the bridging header (the file stays on disk).
    pub fn remove_bridging_header(&mut self) {
        self.bridging_header = None;
    }

    /// Drop `path` from the input set (the file stays on disk).
    pub fn remove_input(&mut self, path: impl AsRef<Path>) {
        self.inputs.retain(|p| p != path.as_ref());
    }

    pub fn add_input(&mut self, path: impl AsRef<Path>, content: &str) {
        self.fs.add_file(path.as_ref(), content);
        self.inputs.push(path.as_ref().to_path_buf());
    }

    pub fn state_path(&self) -> PathBuf {
        self.output_dir.join(STATE_FILE)
    }

    /// The request with fingerprints of the current file contents.
    pub fn build(&self) -> BuildRequest {
        let inputs = self
            .inputs
            .iter()
            .map(|p| InputFile::read(&self.fs, p).expect("input must exist in the mock fs"))
            .collect();
        let bridging_header = self
            .bridging_header
            .as_ref()
            .map(|p| InputFile::read(&self.fs, p).expect("header must exist in the mock fs"));
        BuildRequest {
            module_name: self.module_name.clone(),
            inputs,
            outputs: self.outputs.clone(),
            mode: self.mode,
            concurrency: self.concurrency,
            batch_size: self.batch_size,
            failure_policy: self.failure_policy,
            libraries: self.libraries.clone(),
            bridging_header,
            explicit_modules: self.explicit_modules,
            compiler_args: self.compiler_args.clone(),
            output_dir: self.output_dir.clone(),
            state_path: self.state_path(),
            tools: self.tools.clone(),
        }
    }
}
