//! Background housekeeping: periodic pruning of password reset tokens that
//! can never be redeemed again (consumed or expired). Session records are
//! cleaned separately by the session store's own deletion task.

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::db::Store;

/// Start the scheduler with the token-pruning job attached. Runs every
/// 15 minutes; the handle keeps the jobs alive for the process lifetime.
pub async fn start(store: Store) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async("0 */15 * * * *", move |_id, _lock| {
        let store = store.clone();
        Box::pin(async move {
            match store.prune_dead_reset_tokens().await {
                Ok(0) => {}
                Ok(pruned) => info!(pruned, "Pruned dead password reset tokens"),
                Err(err) => error!("Reset token pruning failed: {err}"),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    info!("Maintenance scheduler started");
    Ok(scheduler)
}
