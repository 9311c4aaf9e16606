use std::time::Duration;

use log::{error, info};
use tokio::task::JoinHandle;

use crate::catalog::Catalog;
use crate::rate_limit::RateLimiter;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Purge expired watch history now and then once a day.
pub fn spawn_daily_cleanup(
    catalog: Catalog,
    limiter: RateLimiter,
    retention_days: u32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(DAY);
        loop {
            // The first tick completes immediately.
            interval.tick().await;
            run_cleanup(&catalog, retention_days).await;
            limiter.purge_idle().await;
        }
    })
}

async fn run_cleanup(catalog: &Catalog, retention_days: u32) {
    match catalog.cleanup_old_history(retention_days).await {
        Ok(deleted) => info!("Deleted {deleted} history entries older than {retention_days} days"),
        Err(e) => error!("History cleanup failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cleanup_survives_an_empty_archive() {
        let catalog = Catalog::in_memory().await.unwrap();
        run_cleanup(&catalog, 15).await;
        assert!(catalog.ping().await);
    }
}
