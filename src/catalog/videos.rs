use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};

use super::{contains_pattern, push_id_list, Catalog, NewVideo, Page, Result, Video, VideoStats};

pub(super) const VIDEO_SELECT: &str = "SELECT v.id, v.message_id, v.chat_id, v.title, v.caption, v.file_name, \
     v.file_id, v.media_kind, v.metadata, v.category_id, v.view_count, v.upload_date, v.grouping_key, \
     v.file_size, v.duration, c.name AS category_name, c.full_path AS category_path \
     FROM videos v LEFT JOIN categories c ON c.id = v.category_id";

impl Catalog {
    /// Insert a new video and return its row id.
    pub async fn add_video(&self, video: &NewVideo) -> Result<i64> {
        let metadata = serde_json::to_string(&video.metadata)?;

        let result = sqlx::query(
            r#"
            INSERT INTO videos (message_id, chat_id, title, caption, file_name, file_id,
                                media_kind, metadata, category_id, view_count, upload_date,
                                grouping_key, file_size, duration)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
            "#,
        )
        .bind(video.message_id)
        .bind(video.chat_id)
        .bind(&video.title)
        .bind(&video.caption)
        .bind(&video.file_name)
        .bind(&video.file_id)
        .bind(video.media_kind)
        .bind(metadata)
        .bind(video.category_id)
        .bind(Utc::now())
        .bind(&video.grouping_key)
        .bind(video.file_size)
        .bind(video.duration)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_video(&self, id: i64) -> Result<Option<Video>> {
        let video = sqlx::query_as::<_, Video>(&format!("{VIDEO_SELECT} WHERE v.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(video)
    }

    /// Search title, caption, file name and the metadata blob.
    ///
    /// Title hits rank before caption hits, then file name, then metadata;
    /// ties go to the most viewed and then the newest upload.
    pub async fn search_videos(
        &self,
        query: &str,
        category_id: Option<i64>,
        page: Page,
    ) -> Result<Vec<Video>> {
        let pattern = contains_pattern(query.trim());

        let mut qb = QueryBuilder::<Sqlite>::new(VIDEO_SELECT);
        push_search_filter(&mut qb, &pattern, category_id);
        qb.push(" ORDER BY CASE WHEN v.title LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' THEN 1 WHEN v.caption LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' THEN 2 WHEN v.file_name LIKE ");
        qb.push_bind(pattern);
        qb.push(" ESCAPE '\\' THEN 3 ELSE 4 END, v.view_count DESC, v.upload_date DESC, v.id DESC");
        qb.push(" LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let videos = qb.build_query_as::<Video>().fetch_all(&self.pool).await?;
        Ok(videos)
    }

    pub async fn count_search(&self, query: &str, category_id: Option<i64>) -> Result<i64> {
        let pattern = contains_pattern(query.trim());

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM videos v");
        push_search_filter(&mut qb, &pattern, category_id);

        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    pub async fn videos_in_category(&self, category_id: i64, page: Page) -> Result<Vec<Video>> {
        let videos = sqlx::query_as::<_, Video>(&format!(
            "{VIDEO_SELECT} WHERE v.category_id = ? \
             ORDER BY v.view_count DESC, v.upload_date DESC, v.id DESC LIMIT ? OFFSET ?"
        ))
        .bind(category_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(videos)
    }

    pub async fn count_in_category(&self, category_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM videos WHERE category_id = ?")
            .bind(category_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Most viewed videos. Videos nobody opened yet are left out.
    pub async fn popular_videos(&self, limit: i64) -> Result<Vec<Video>> {
        let videos = sqlx::query_as::<_, Video>(&format!(
            "{VIDEO_SELECT} WHERE v.view_count > 0 \
             ORDER BY v.view_count DESC, v.upload_date DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(videos)
    }

    pub async fn recent_videos(&self, limit: i64) -> Result<Vec<Video>> {
        let videos = sqlx::query_as::<_, Video>(&format!(
            "{VIDEO_SELECT} ORDER BY v.upload_date DESC, v.id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(videos)
    }

    pub async fn uncategorized_videos(&self, limit: i64) -> Result<Vec<Video>> {
        let videos = sqlx::query_as::<_, Video>(&format!(
            "{VIDEO_SELECT} WHERE v.category_id IS NULL \
             ORDER BY v.upload_date DESC, v.id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(videos)
    }

    /// Bump the view counter. Returns false when the video does not exist.
    pub async fn increment_views(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE videos SET view_count = view_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Point a video at another category, or none.
    pub async fn set_video_category(&self, id: i64, category_id: Option<i64>) -> Result<bool> {
        let result = sqlx::query("UPDATE videos SET category_id = ? WHERE id = ?")
            .bind(category_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a video with its favorites and history rows.
    pub async fn delete_video(&self, id: i64) -> Result<bool> {
        Ok(self.bulk_delete(&[id]).await? > 0)
    }

    pub async fn bulk_set_category(&self, ids: &[i64], category_id: i64) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE videos SET category_id = ");
        qb.push_bind(category_id);
        qb.push(" WHERE id IN ");
        push_id_list(&mut qb, ids);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Delete many videos at once. Returns the number of videos removed.
    pub async fn bulk_delete(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for table in ["user_favorites", "user_history"] {
            let mut qb = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {table} WHERE video_id IN "));
            push_id_list(&mut qb, ids);
            qb.build().execute(&mut *tx).await?;
        }

        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM videos WHERE id IN ");
        push_id_list(&mut qb, ids);
        let deleted = qb.build().execute(&mut *tx).await?.rows_affected();

        tx.commit().await?;
        Ok(deleted)
    }

    pub async fn video_stats(&self) -> Result<VideoStats> {
        let (total_videos, total_views, avg_views, categories_used): (i64, i64, f64, i64) =
            sqlx::query_as(
                "SELECT COUNT(*), COALESCE(SUM(view_count), 0), COALESCE(AVG(view_count), 0.0), \
                 COUNT(DISTINCT category_id) FROM videos",
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(VideoStats {
            total_videos,
            total_views,
            avg_views: (avg_views * 100.0).round() / 100.0,
            categories_used,
        })
    }
}

fn push_search_filter(qb: &mut QueryBuilder<'_, Sqlite>, pattern: &str, category_id: Option<i64>) {
    qb.push(" WHERE (");
    for (i, column) in ["v.title", "v.caption", "v.file_name", "v.metadata"].iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(format!("{column} LIKE "));
        qb.push_bind(pattern.to_string());
        qb.push(" ESCAPE '\\'");
    }
    qb.push(")");

    if let Some(category_id) = category_id {
        qb.push(" AND v.category_id = ");
        qb.push_bind(category_id);
    }
}
