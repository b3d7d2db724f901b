// src/config/loader.rs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::config::inputs::{discover_inputs, resolve};
use crate::config::model::{RawRequestFile, RequestFile};
use crate::config::request::{BuildRequest, InputFile, Toolchain};
use crate::deps::STATE_FILE;
use crate::errors::{DriverError, Result};
use crate::fs::FileSystem;
use crate::types::{CompilationMode, FailurePolicy};

/// Load a request file from a given path and return the raw
/// `RawRequestFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<RawRequestFile> {
    let path = path.as_ref();
    let contents = fs.read_to_string(path)?;
    let raw: RawRequestFile = toml::from_str(&contents)?;
    Ok(raw)
}

/// Load a request file and validate it.
pub fn load_and_validate(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<RequestFile> {
    let raw = load_from_path(fs, &path)?;
    RequestFile::try_from(raw)
}

/// Command-line values that take precedence over the request file.
#[derive(Debug, Clone, Default)]
pub struct RequestOverrides {
    pub jobs: Option<usize>,
    pub batch_size: Option<usize>,
    pub fail_fast: bool,
    pub mode: Option<CompilationMode>,
    pub state: Option<PathBuf>,
}

/// Directory relative paths in the request file are resolved against.
///
/// A bare file name like `Driverdag.toml` resolves against the current
/// working directory.
pub fn request_root(request_path: &Path) -> PathBuf {
    match request_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Turn a validated request file into a [`BuildRequest`]: discover and
/// fingerprint inputs, resolve paths and apply `overrides`.
pub fn resolve_request(
    fs: &dyn FileSystem,
    request_path: &Path,
    cfg: &RequestFile,
    overrides: &RequestOverrides,
) -> Result<BuildRequest> {
    let root = request_root(request_path);
    let build = cfg.build();

    let inputs = discover_inputs(fs, &root, cfg.inputs())?
        .into_iter()
        .map(|path| InputFile::read(fs, path))
        .collect::<anyhow::Result<Vec<_>>>()
        .context("fingerprinting inputs")?;
    if inputs.is_empty() {
        return Err(DriverError::ConfigError(format!(
            "no inputs matched under {:?}",
            root
        )));
    }

    let bridging_header = build
        .bridging_header
        .as_deref()
        .map(|header| InputFile::read(fs, resolve(&root, header)))
        .transpose()
        .context("fingerprinting bridging header")?;

    let output_dir = resolve(&root, &build.output_dir);
    let state_path = match (&overrides.state, &build.state_file) {
        (Some(state), _) => state.clone(),
        (None, Some(file)) => resolve(&root, file),
        (None, None) => output_dir.join(STATE_FILE),
    };

    let concurrency = overrides
        .jobs
        .or(build.jobs)
        .unwrap_or_else(default_concurrency)
        .max(1);

    let failure_policy = if overrides.fail_fast || build.fail_fast {
        FailurePolicy::FailFast
    } else {
        FailurePolicy::ContinueOnFailure
    };

    let request = BuildRequest {
        module_name: build.module_name.clone(),
        inputs,
        outputs: build.outputs.iter().copied().collect::<BTreeSet<_>>(),
        mode: overrides.mode.unwrap_or(build.mode),
        concurrency,
        batch_size: overrides.batch_size.or(build.batch_size),
        failure_policy,
        libraries: build.libraries.iter().map(|l| resolve(&root, l)).collect(),
        bridging_header,
        explicit_modules: build.explicit_modules,
        compiler_args: build.compiler_args.clone(),
        output_dir,
        state_path,
        tools: Toolchain {
            compiler: cfg.tools().compiler.clone(),
            linker: cfg.tools().linker.clone(),
            scanner: cfg.tools().scanner.clone(),
        },
    };

    debug!(
        module = %request.module_name,
        inputs = request.inputs.len(),
        concurrency = request.concurrency,
        "resolved build request"
    );
    Ok(request)
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Default request file name, looked up in the current directory.
pub fn default_request_path() -> PathBuf {
    PathBuf::from("Driverdag.toml")
}
