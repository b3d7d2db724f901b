// src/main.rs

use driverdag::engine::RunOutcome;
use driverdag::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(RunOutcome::Succeeded) => {}
        Ok(RunOutcome::Failed) => std::process::exit(1),
        Ok(RunOutcome::Cancelled) => std::process::exit(130),
        Err(err) => {
            eprintln!("driverdag error: {err:?}");
            std::process::exit(2);
        }
    }
}

async fn run_main() -> anyhow::Result<RunOutcome> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
