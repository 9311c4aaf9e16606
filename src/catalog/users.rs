use chrono::{DateTime, Duration, Utc};

use super::videos::VIDEO_SELECT;
use super::{ActiveUser, BotUser, Catalog, FavoriteToggle, Result, UserStats, Video};

impl Catalog {
    /// Record a user on first contact and refresh their names and last
    /// activity on every later one.
    pub async fn upsert_user(
        &self,
        user_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO bot_users (user_id, username, first_name, last_name, join_date, last_activity)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                last_activity = excluded.last_activity
            "#,
        )
        .bind(user_id)
        .bind(username)
        .bind(first_name)
        .bind(last_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<BotUser>> {
        let user = sqlx::query_as::<_, BotUser>("SELECT * FROM bot_users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Add the video to the user's favorites, or remove it when already there.
    pub async fn toggle_favorite(
        &self,
        user_id: i64,
        video_id: i64,
        max_favorites: u32,
    ) -> Result<FavoriteToggle> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM user_favorites WHERE user_id = ? AND video_id = ?")
            .bind(user_id)
            .bind(video_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed > 0 {
            tx.commit().await?;
            return Ok(FavoriteToggle::Removed);
        }

        let held: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_favorites WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        if held >= i64::from(max_favorites) {
            return Ok(FavoriteToggle::LimitReached);
        }

        sqlx::query("INSERT INTO user_favorites (user_id, video_id, added_date) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(video_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(FavoriteToggle::Added)
    }

    pub async fn is_favorite(&self, user_id: i64, video_id: i64) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM user_favorites WHERE user_id = ? AND video_id = ?")
                .bind(user_id)
                .bind(video_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Favorites, most recently added first.
    pub async fn favorites(&self, user_id: i64, limit: i64) -> Result<Vec<Video>> {
        let videos = sqlx::query_as::<_, Video>(&format!(
            "{VIDEO_SELECT} JOIN user_favorites f ON f.video_id = v.id \
             WHERE f.user_id = ? ORDER BY f.added_date DESC LIMIT ?"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(videos)
    }

    pub async fn record_view(&self, user_id: i64, video_id: i64) -> Result<()> {
        self.record_view_at(user_id, video_id, Utc::now()).await
    }

    async fn record_view_at(&self, user_id: i64, video_id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_history (user_id, video_id, last_watched) VALUES (?, ?, ?) \
             ON CONFLICT(user_id, video_id) DO UPDATE SET last_watched = excluded.last_watched",
        )
        .bind(user_id)
        .bind(video_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Watched videos, most recent first.
    pub async fn history(&self, user_id: i64, limit: i64) -> Result<Vec<Video>> {
        let videos = sqlx::query_as::<_, Video>(&format!(
            "{VIDEO_SELECT} JOIN user_history h ON h.video_id = v.id \
             WHERE h.user_id = ? ORDER BY h.last_watched DESC LIMIT ?"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(videos)
    }

    /// Drop history entries older than `days`. Returns the number deleted.
    pub async fn cleanup_old_history(&self, days: u32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let deleted = sqlx::query("DELETE FROM user_history WHERE last_watched < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    pub async fn user_stats(&self) -> Result<UserStats> {
        let now = Utc::now();
        let (total_users, new_this_week, new_this_month): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), \
             COUNT(CASE WHEN join_date >= ? THEN 1 END), \
             COUNT(CASE WHEN join_date >= ? THEN 1 END) \
             FROM bot_users",
        )
        .bind(now - Duration::days(7))
        .bind(now - Duration::days(30))
        .fetch_one(&self.pool)
        .await?;

        Ok(UserStats {
            total_users,
            new_this_week,
            new_this_month,
        })
    }

    /// Users with the most history and favorites entries.
    pub async fn top_users(&self, limit: i64) -> Result<Vec<ActiveUser>> {
        let users = sqlx::query_as::<_, ActiveUser>(
            "SELECT u.user_id, u.first_name, u.username, \
             (SELECT COUNT(*) FROM user_history h WHERE h.user_id = u.user_id) AS history_count, \
             (SELECT COUNT(*) FROM user_favorites f WHERE f.user_id = u.user_id) AS favorites_count \
             FROM bot_users u \
             ORDER BY history_count + favorites_count DESC, u.last_activity DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    pub async fn all_user_ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT user_id FROM bot_users ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}
