use super::{Catalog, GeneralStats, Result};

impl Catalog {
    /// Headline counts for the statistics screens.
    pub async fn general_stats(&self) -> Result<GeneralStats> {
        let (videos, users, categories, favorites, total_views): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                "SELECT (SELECT COUNT(*) FROM videos), \
                 (SELECT COUNT(*) FROM bot_users), \
                 (SELECT COUNT(*) FROM categories), \
                 (SELECT COUNT(*) FROM user_favorites), \
                 (SELECT COALESCE(SUM(view_count), 0) FROM videos)",
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(GeneralStats {
            videos,
            users,
            categories,
            favorites,
            total_views,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NewVideo;

    #[tokio::test]
    async fn empty_archive_counts_zero() {
        let catalog = Catalog::in_memory().await.unwrap();
        assert_eq!(catalog.general_stats().await.unwrap(), GeneralStats::default());
    }

    #[tokio::test]
    async fn counts_follow_activity() {
        let catalog = Catalog::in_memory().await.unwrap();
        let video = catalog.add_video(&NewVideo::default()).await.unwrap();
        catalog.increment_views(video).await.unwrap();
        catalog.upsert_user(5, None, None, None).await.unwrap();
        catalog.toggle_favorite(5, video, 10).await.unwrap();
        catalog.create_category("Misc", None).await.unwrap();

        let stats = catalog.general_stats().await.unwrap();
        assert_eq!(
            stats,
            GeneralStats {
                videos: 1,
                users: 1,
                categories: 1,
                favorites: 1,
                total_views: 1,
            }
        );
    }
}
