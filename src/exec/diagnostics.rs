// src/exec/diagnostics.rs

//! Parsing tool output into diagnostics and filing them under the input
//! they are about.
//!
//! Recognized lines look like `path:line[:column]: severity: message` or
//! `severity: message`, where severity is `error`, `warning` or `note`.
//! Everything else is ignored.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::engine::{Diagnostic, DiagnosticOrigin, Severity};
use crate::plan::Job;

static LOCATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<path>[^:\s][^:]*):(?P<line>\d+)(?::(?P<col>\d+))?:\s*(?P<sev>error|warning|note):\s*(?P<msg>.*)$",
    )
    .unwrap_or_else(|e| panic!("invalid diagnostic regex: {e}"))
});

static BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<sev>error|warning|note):\s*(?P<msg>.*)$")
        .unwrap_or_else(|e| panic!("invalid diagnostic regex: {e}"))
});

/// A diagnostic plus the path it named, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDiagnostic {
    pub path: Option<PathBuf>,
    pub diagnostic: Diagnostic,
}

fn severity(s: &str) -> Severity {
    match s {
        "error" => Severity::Error,
        "warning" => Severity::Warning,
        _ => Severity::Note,
    }
}

pub fn parse_diagnostics(text: &str) -> Vec<ParsedDiagnostic> {
    let mut parsed = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if let Some(caps) = LOCATED.captures(line) {
            parsed.push(ParsedDiagnostic {
                path: Some(PathBuf::from(&caps["path"])),
                diagnostic: Diagnostic {
                    severity: severity(&caps["sev"]),
                    message: caps["msg"].to_string(),
                    line: caps["line"].parse().ok(),
                    column: caps.name("col").and_then(|c| c.as_str().parse().ok()),
                },
            });
        } else if let Some(caps) = BARE.captures(line) {
            parsed.push(ParsedDiagnostic {
                path: None,
                diagnostic: Diagnostic {
                    severity: severity(&caps["sev"]),
                    message: caps["msg"].to_string(),
                    line: None,
                    column: None,
                },
            });
        }
    }
    parsed
}

/// Pick the input a diagnostic belongs to.
///
/// A named path matching one of the job's primaries or sources wins. Failing
/// that, a job with a single primary takes it. Anything else stays with the
/// job.
pub fn attribute(job: &Job, path: Option<&Path>) -> DiagnosticOrigin {
    if let Some(path) = path {
        let known = job
            .primaries()
            .chain(job.source_inputs())
            .find(|candidate| *candidate == path || (path.is_relative() && candidate.ends_with(path)));
        if let Some(found) = known {
            return DiagnosticOrigin::Input(found.to_path_buf());
        }
    }

    let mut primaries = job.primaries();
    match (primaries.next(), primaries.next()) {
        (Some(only), None) => DiagnosticOrigin::Input(only.to_path_buf()),
        _ => DiagnosticOrigin::Job(job.key.clone()),
    }
}

/// Diagnostics for a finished job, grouped by origin.
///
/// A failed job always yields at least one error: when the output holds no
/// recognizable error line, `fallback` becomes the message.
pub fn collect(
    job: &Job,
    stdout: &str,
    stderr: &str,
    failed: bool,
    fallback: &str,
) -> Vec<(DiagnosticOrigin, Diagnostic)> {
    let mut collected: Vec<(DiagnosticOrigin, Diagnostic)> = parse_diagnostics(stderr)
        .into_iter()
        .chain(parse_diagnostics(stdout))
        .map(|p| (attribute(job, p.path.as_deref()), p.diagnostic))
        .collect();

    let has_error = collected
        .iter()
        .any(|(_, d)| d.severity == Severity::Error);
    if failed && !has_error {
        let message = stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(|l| format!("{fallback}: {l}"))
            .unwrap_or_else(|| fallback.to_string());
        collected.push((
            attribute(job, None),
            Diagnostic {
                severity: Severity::Error,
                message,
                line: None,
                column: None,
            },
        ));
    }
    collected
}
