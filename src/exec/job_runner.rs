// src/exec/job_runner.rs

//! Individual job runner.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::{FailureKind, JobOutcome, ReportAccumulator, RuntimeEvent};
use crate::exec::backend::ProcessRunner;
use crate::exec::diagnostics;
use crate::plan::Job;

/// Run a single job through `runner`, file its diagnostics and report the
/// outcome to the coordinator.
pub async fn run_job<R: ProcessRunner + ?Sized>(
    job: Arc<Job>,
    runner: Arc<R>,
    accumulator: ReportAccumulator,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    info!(
        job = %job.key,
        kind = job.kind.name(),
        cmd = %job.command,
        "starting job"
    );

    let outcome = match runner.run(&job.command).await {
        Ok(output) => {
            let failed = !output.is_success();
            let fallback = format!("{} exited with code {}", job.command.tool, output.exit_code);
            for (origin, diagnostic) in
                diagnostics::collect(&job, &output.stdout, &output.stderr, failed, &fallback)
            {
                accumulator.add_diagnostics(origin, vec![diagnostic]);
            }

            info!(
                job = %job.key,
                exit_code = output.exit_code,
                success = !failed,
                "job process exited"
            );
            if !output.stderr.is_empty() {
                debug!(job = %job.key, stderr = %output.stderr.trim_end(), "captured stderr");
            }

            if failed {
                JobOutcome::Failed(FailureKind::Exit(output.exit_code))
            } else {
                JobOutcome::Succeeded
            }
        }
        Err(err) => {
            error!(job = %job.key, error = %err, "job could not be started");
            let message = err.to_string();
            for (origin, diagnostic) in diagnostics::collect(&job, "", "", true, &message) {
                accumulator.add_diagnostics(origin, vec![diagnostic]);
            }
            JobOutcome::Failed(FailureKind::Spawn(err.message))
        }
    };

    if let JobOutcome::Failed(kind) = &outcome {
        accumulator.record_failure(job.id, kind.clone());
    }

    if runtime_tx
        .send(RuntimeEvent::JobFinished {
            job: job.id,
            outcome,
        })
        .await
        .is_err()
    {
        warn!(job = %job.key, "coordinator is gone; dropping job outcome");
    }
}
