use chrono::Utc;
use log::info;

use super::{AdminLogEntry, Catalog, CleanupReport, Result};

impl Catalog {
    pub async fn log_admin_action(
        &self,
        admin_id: i64,
        action: &str,
        details: Option<&str>,
    ) -> Result<()> {
        sqlx::query("INSERT INTO admin_logs (admin_id, action, details, timestamp) VALUES (?, ?, ?, ?)")
            .bind(admin_id)
            .bind(action)
            .bind(details)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Latest admin actions first.
    pub async fn admin_logs(&self, limit: i64) -> Result<Vec<AdminLogEntry>> {
        let logs = sqlx::query_as::<_, AdminLogEntry>(
            "SELECT id, admin_id, action, details, timestamp FROM admin_logs \
             ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    /// Purge expired history and every favorite/history row whose video is gone.
    pub async fn cleanup_database(&self, retention_days: u32) -> Result<CleanupReport> {
        let history_deleted = self.cleanup_old_history(retention_days).await?;

        let orphaned_favorites = sqlx::query(
            "DELETE FROM user_favorites WHERE video_id NOT IN (SELECT id FROM videos)",
        )
        .execute(&self.pool)
        .await?
        .rows_affected();

        let orphaned_history =
            sqlx::query("DELETE FROM user_history WHERE video_id NOT IN (SELECT id FROM videos)")
                .execute(&self.pool)
                .await?
                .rows_affected();

        let report = CleanupReport {
            history_deleted,
            orphaned_favorites,
            orphaned_history,
        };
        info!("Database cleanup finished: {report:?}");
        Ok(report)
    }
}
