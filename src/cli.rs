// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::config::RequestOverrides;
use crate::types::CompilationMode;

/// Command-line arguments for `driverdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "driverdag",
    version,
    about = "Plan and run an incremental, parallel compilation from a request file.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the request file (TOML).
    ///
    /// Default: `Driverdag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Driverdag.toml")]
    pub request: String,

    /// Maximum number of jobs running at once.
    #[arg(short = 'j', long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub jobs: Option<u32>,

    /// Compile jobs per batch; 0 or 1 disables batching.
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Stop dispatching new jobs after the first failure.
    #[arg(long)]
    pub fail_fast: bool,

    /// Compilation mode, overriding `[build].mode`.
    #[arg(long, value_enum, value_name = "MODE")]
    pub mode: Option<ModeArg>,

    /// Where to load and save the build state.
    #[arg(long, value_name = "PATH")]
    pub state: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DRIVERDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Plan the build and print the jobs that would run, without running them.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    pub fn overrides(&self) -> RequestOverrides {
        RequestOverrides {
            jobs: self.jobs.map(|n| n as usize),
            batch_size: self.batch_size,
            fail_fast: self.fail_fast,
            mode: self.mode.map(CompilationMode::from),
            state: self.state.as_ref().map(Into::into),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    PerFile,
    WholeModule,
}

impl From<ModeArg> for CompilationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::PerFile => CompilationMode::PerFile,
            ModeArg::WholeModule => CompilationMode::WholeModule,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
