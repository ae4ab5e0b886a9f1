use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod collector;
mod database;
mod export;
mod harvester;
mod models;
mod scrapers;
mod traits;

use harvester::{FeedHarvester, HarvesterSettings};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    info!("Starting feed harvester");

    let settings = HarvesterSettings::from_env()?;
    let harvester = FeedHarvester::new(settings).await?;

    // Ctrl-C cancels the in-progress run between fetch cycles; partial
    // results are persisted before shutdown
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested, stopping after the current cycle");
                cancel.cancel();
            }
        });
    }

    // Run once immediately
    if let Err(e) = harvester.harvest_all(cancel.clone()).await {
        error!("Error during initial harvest: {}", e);
    }

    // Set up scheduler to re-harvest every 2 hours
    let sched = JobScheduler::new().await?;

    let job_harvester = harvester.clone();
    let job_cancel = cancel.clone();
    sched
        .add(Job::new_async("0 0 */2 * * *", move |_uuid, _l| {
            let harvester = job_harvester.clone();
            let cancel = job_cancel.clone();
            Box::pin(async move {
                if cancel.is_cancelled() {
                    return;
                }
                if let Err(e) = harvester.harvest_all(cancel).await {
                    error!("Error during scheduled harvest: {}", e);
                }
            })
        })?)
        .await?;

    info!("Scheduler started - harvesting every 2 hours");
    sched.start().await?;

    // Keep the program running until shutdown is requested
    cancel.cancelled().await;
    info!("Shut down");
    Ok(())
}
