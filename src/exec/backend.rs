// src/exec/backend.rs

//! Pluggable process runner abstraction.
//!
//! Workers talk to a `ProcessRunner` instead of spawning processes
//! themselves. This makes it easy to swap in a scripted fake compiler in
//! tests while keeping the production implementation here.
//!
//! - `TokioProcessRunner` is the default implementation used by the binary.
//!   It runs the tool directly (no shell) and captures stdout and stderr.
//! - Tests can provide their own `ProcessRunner` that, for example, writes
//!   the expected outputs and records which commands ran.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::plan::CommandLine;

/// Captured result of a process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The tool could not be launched at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to spawn '{tool}': {message}")]
pub struct SpawnError {
    pub tool: String,
    pub message: String,
}

/// Trait abstracting how job commands are executed.
pub trait ProcessRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        command: &'a CommandLine,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessOutput, SpawnError>> + Send + 'a>>;
}

/// Real process runner used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for TokioProcessRunner {
    fn run<'a>(
        &'a self,
        command: &'a CommandLine,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessOutput, SpawnError>> + Send + 'a>> {
        Box::pin(async move {
            debug!(cmd = %command, "spawning process");

            let output = Command::new(&command.tool)
                .args(&command.args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| SpawnError {
                    tool: command.tool.clone(),
                    message: e.to_string(),
                })?;

            Ok(ProcessOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}
