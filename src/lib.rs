// src/lib.rs

pub mod artifact;
pub mod cli;
pub mod config;
pub mod dag;
pub mod deps;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fingerprint;
pub mod fs;
pub mod logging;
pub mod plan;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, resolve_request};
use crate::dag::JobStatus;
use crate::driver::{Driver, PlannedBuild};
use crate::engine::{ExecutionReport, RunOutcome};
use crate::exec::TokioProcessRunner;
use crate::fs::{FileSystem, RealFileSystem};
use crate::plan::Disposition;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - request loading and input discovery
/// - planning, pruning and batching
/// - execution with Ctrl-C cancellation
/// - the end-of-build summary
pub async fn run(args: CliArgs) -> Result<RunOutcome> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let request_path = PathBuf::from(&args.request);
    let cfg = load_and_validate(fs.as_ref(), &request_path)?;
    let request = resolve_request(fs.as_ref(), &request_path, &cfg, &args.overrides())?;
    info!(
        module = %request.module_name,
        inputs = request.inputs.len(),
        mode = %request.mode,
        "loaded build request"
    );

    let driver = Driver::new(request, Arc::clone(&fs), Arc::new(TokioProcessRunner::new()));

    if args.dry_run {
        let planned = driver.prepare()?;
        print_dry_run(&planned);
        return Ok(RunOutcome::Succeeded);
    }

    let report = driver
        .run_with(|cancel| {
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                    return;
                }
                info!("Ctrl+C received; letting running jobs finish");
                cancel.cancel().await;
            });
        })
        .await?;

    print_summary(&report);
    Ok(report.outcome)
}

/// Print the planned jobs with their disposition and command.
fn print_dry_run(planned: &PlannedBuild) {
    let plan = &planned.plan;
    println!("driverdag dry-run");
    println!(
        "  jobs = {}, scheduled = {}, dirty inputs = {}",
        plan.len(),
        plan.scheduled_count(),
        planned.dirty.len()
    );
    for (path, reason) in planned.dirty.iter() {
        println!("  dirty: {} ({reason})", path.display());
    }
    for path in &planned.removed {
        println!("  removed: {}", path.display());
    }
    println!();

    for &id in plan.graph.topological_order() {
        let job = plan.graph.job(id);
        let disposition = match plan.disposition(id) {
            Disposition::Scheduled(reason) => format!("run ({reason})"),
            Disposition::Clean => "skip".to_string(),
        };
        println!("  - [{}] {} {}", job.kind.name(), job.key, disposition);
        println!("      cmd: {}", job.command);
        if !job.prerequisites.is_empty() {
            let after: Vec<String> = job
                .prerequisites
                .iter()
                .map(|p| plan.graph.job(*p).key.to_string())
                .collect();
            println!("      after: {:?}", after);
        }
    }

    debug!("dry-run complete (no execution)");
}

fn print_summary(report: &ExecutionReport) {
    for (origin, diagnostics) in &report.diagnostics {
        for diagnostic in diagnostics {
            println!("{origin}: {diagnostic}");
        }
    }
    for job in &report.jobs {
        if let Some(failure) = &job.failure {
            println!("failed: {} ({failure})", job.key);
        }
    }
    println!(
        "build {}: {} succeeded, {} skipped, {} failed, {} blocked, {} cancelled",
        report.outcome,
        report.count(JobStatus::Succeeded),
        report.count(JobStatus::Skipped),
        report.count(JobStatus::Failed),
        report.count(JobStatus::Blocked),
        report.count(JobStatus::Cancelled),
    );
}
