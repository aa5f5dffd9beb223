use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::orchestrator::{CycleError, Orchestrator};

/// Start the recurring fetch cycle on `cron` (6 fields, seconds first).
///
/// The returned scheduler must be kept alive for the job to keep firing.
pub async fn start_scheduler(cron: &str, orchestrator: Arc<Orchestrator>) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;

    let job = Job::new_async(cron, move |_uuid, _l| {
        let orchestrator = orchestrator.clone();
        Box::pin(async move {
            info!("Scheduled tariff cycle triggered");
            match orchestrator.run_cycle(None).await {
                Ok(_) => {}
                Err(CycleError::AlreadyRunning) => info!("Previous cycle still running, skipping this tick"),
                Err(e) => error!("Scheduled tariff cycle failed: {}", e),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;

    sched.add(job).await.context("adding scheduler job")?;
    sched.start().await.context("starting scheduler")?;

    info!("Scheduler started with cron {}", cron);
    Ok(sched)
}
