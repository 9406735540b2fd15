// blobsync - replicate an object storage container

mod cli;
mod progress;

use anyhow::{Context, Result};
use blobsync::cfg::{expand_path, load_config};
use blobsync::log::Logger;
use blobsync::oss::ObjectStoreManager;
use blobsync::replication::{
    AppConfig, CopyJob, CopyOrchestrator, JobOutcome, TransferCheckpoint,
};
use clap::Parser;
use garde::Validate;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use cli::Cli;
use progress::ReplicationProgressBar;

/// Get default config path (~/.blobsync/config.yaml)
fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".blobsync").join("config.yaml"))
}

fn read_config(cli: &Cli) -> Result<AppConfig> {
    let path = match cli.config {
        Some(ref path) => expand_path(path),
        None => default_config_path()?,
    };

    if !path.exists() {
        return Err(anyhow::anyhow!(
            "Config file not found: {}. Please create it first.",
            path.display()
        ));
    }

    let mut config: AppConfig = load_config(&path)
        .with_context(|| format!("Failed to load config file: {}", path.display()))?;
    if let Some(concurrency) = cli.concurrency {
        config.replication.max_concurrency = concurrency;
    }
    config
        .validate()
        .with_context(|| format!("Invalid config file: {}", path.display()))?;

    Ok(config)
}

fn read_job(cli: &Cli) -> Result<CopyJob> {
    let message = match (&cli.job, &cli.job_json) {
        (Some(path), _) => {
            let path = expand_path(path);
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read job file: {}", path.display()))?
        }
        (None, Some(json)) => json.clone(),
        (None, None) => return Err(anyhow::anyhow!("Either --job or --job-json is required")),
    };

    Ok(CopyJob::from_message(&message)?)
}

fn exit_code(outcome: &JobOutcome) -> ExitCode {
    match outcome {
        JobOutcome::Completed => ExitCode::SUCCESS,
        JobOutcome::Failed { .. } => ExitCode::from(1),
        JobOutcome::CompletedWithErrors => ExitCode::from(2),
        JobOutcome::Cancelled => ExitCode::from(130),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = read_config(&cli)?;
    let job = read_job(&cli)?;
    let logger = Logger::new(config.logger.clone()).context("Failed to create logger")?;
    let stores = Arc::new(ObjectStoreManager::new(config.stores.clone()));

    let mut orchestrator = CopyOrchestrator::new(config.replication.clone(), stores, logger.clone());

    let progress = cli.progress.then(|| Arc::new(ReplicationProgressBar::new()));
    if let Some(progress) = &progress {
        orchestrator = orchestrator.with_observer(progress.clone());
    }

    // Ctrl-C stops listing; in-flight copies settle before the summary
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let report = match &cli.resume {
        Some(path) => {
            let path = expand_path(path);
            let snapshot = TransferCheckpoint::load(&path)
                .await
                .with_context(|| format!("Failed to load checkpoint: {}", path.display()))?;
            orchestrator.resume(job, snapshot).await
        }
        None => orchestrator.run(job).await,
    };

    if let Some(progress) = &progress {
        progress.finish();
    }
    logger.flush().await?;

    Ok(exit_code(&report.outcome))
}
