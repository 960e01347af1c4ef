//! Background maintenance. Expired token records are also deleted lazily on
//! lookup; the hourly sweep catches records nobody asks for again.

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::errors::AuthError;
use crate::tokens::TokenManager;

/// Initialize and start the job scheduler with all background tasks.
pub async fn init_scheduler(tokens: TokenManager) -> Result<JobScheduler, AuthError> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| AuthError::Provider(format!("failed to create job scheduler: {e}")))?;

    // Purge refresh-expired tokens - runs every hour
    let purge_job = Job::new_async("0 0 * * * *", move |_uuid, _l| {
        let tokens = tokens.clone();
        Box::pin(async move {
            info!("Running purge_expired_tokens job");
            match tokens.purge_expired().await {
                Ok(count) => info!("Purged {} expired token records", count),
                Err(e) => error!("Failed to purge expired tokens: {}", e),
            }
        })
    })
    .map_err(|e| AuthError::Provider(format!("failed to create purge job: {e}")))?;

    sched
        .add(purge_job)
        .await
        .map_err(|e| AuthError::Provider(format!("failed to add purge job: {e}")))?;

    sched
        .start()
        .await
        .map_err(|e| AuthError::Provider(format!("failed to start job scheduler: {e}")))?;

    info!("Job scheduler started");

    Ok(sched)
}
