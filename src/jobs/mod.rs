use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::stale_order_job(Arc::clone(&self)));
        tokio::spawn(Self::keyword_sync_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Cancel PENDING orders past the payment timeout (runs every
    /// 5 minutes)
    async fn stale_order_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            match tasks::expire_stale_orders(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cancelled {} stale pending orders", count);
                    }
                }
                Err(e) => error!("Failed to expire stale orders: {}", e),
            }
        }
    }

    /// Recompile the keyword matcher when the stored set has changed
    /// (runs every 10 minutes)
    async fn keyword_sync_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(600));

        loop {
            interval.tick().await;

            match tasks::sync_keywords(&scheduler.context).await {
                Ok(reloaded) => {
                    if reloaded {
                        info!("Keyword matcher reloaded");
                    }
                }
                Err(e) => error!("Failed to sync keywords: {}", e),
            }
        }
    }
}
