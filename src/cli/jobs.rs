//! The `jobs` command: inspect or watch a gaze-correction job.

use anyhow::Result;
use indicatif::ProgressBar;
use std::sync::Arc;
use std::time::Duration;

use super::JobsCliArgs;
use crate::config::Config;
use crate::correction::{CorrectionClient, CorrectionJobApi, JobId, JobOrchestrator, JobStatus};

pub async fn handle_jobs_command(args: JobsCliArgs) -> Result<()> {
    let config = Config::load()?;
    let client = Arc::new(CorrectionClient::new(
        &config.correction.endpoint,
        config.correction.api_key.clone(),
    )?);

    let job_id = JobId(args.job_id.clone());

    if !args.watch {
        let status = client.poll(&job_id).await?;
        print_status(&job_id, &status);
        return Ok(());
    }

    let poll_interval = Duration::from_secs(config.correction.poll_interval_seconds.max(1));
    let orchestrator = JobOrchestrator::new(client, poll_interval);

    let notify = Arc::new(tokio::sync::Notify::new());
    let waker = Arc::clone(&notify);
    orchestrator.on_refresh(move || waker.notify_one());

    orchestrator.track(job_id.clone());

    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("watching job {job_id}"));

    while orchestrator.outstanding() > 0 {
        tokio::select! {
            _ = notify.notified() => {}
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }
    pb.finish_and_clear();

    for job in orchestrator.jobs() {
        if job.id == job_id {
            print_status(&job.id, &job.status);
        }
    }

    orchestrator.shutdown();
    Ok(())
}

fn print_status(id: &JobId, status: &JobStatus) {
    match status {
        JobStatus::Processing => println!("Job {id}: processing"),
        JobStatus::Finished {
            output_locator: Some(url),
        } => println!("Job {id}: finished, output at {url}"),
        JobStatus::Finished {
            output_locator: None,
        } => println!("Job {id}: finished (no output locator)"),
        JobStatus::Failed { message } => println!("Job {id}: failed: {message}"),
    }
}
