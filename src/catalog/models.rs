use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::metadata::VideoMetadata;

/// How Telegram delivered the media. A token issued for one kind cannot be
/// sent as the other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Video,
    Document,
}

/// An archived video together with the name and path of its category.
#[derive(Debug, Clone, FromRow)]
pub struct Video {
    pub id: i64,
    /// Message id of the original post in the source chat.
    pub message_id: Option<i64>,
    /// Source chat the media was posted in.
    pub chat_id: Option<i64>,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub file_name: Option<String>,
    /// Media-reference token issued by Telegram.
    pub file_id: Option<String>,
    pub media_kind: MediaKind,
    /// JSON blob of [`VideoMetadata`].
    pub metadata: String,
    pub category_id: Option<i64>,
    pub view_count: i64,
    pub upload_date: DateTime<Utc>,
    pub grouping_key: Option<String>,
    pub file_size: Option<i64>,
    pub duration: Option<i64>,
    pub category_name: Option<String>,
    pub category_path: Option<String>,
}

impl Video {
    /// Title, else file name, else a placeholder with the row id.
    pub fn display_title(&self) -> String {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| self.file_name.as_deref().filter(|f| !f.is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Video {}", self.id))
    }

    /// Decoded metadata blob. A corrupt blob reads as no metadata.
    pub fn parsed_metadata(&self) -> VideoMetadata {
        serde_json::from_str(&self.metadata).unwrap_or_else(|e| {
            log::warn!("Unreadable metadata on video {}: {e}", self.id);
            VideoMetadata::default()
        })
    }
}

/// Values for a new catalog row.
#[derive(Debug, Clone, Default)]
pub struct NewVideo {
    pub message_id: Option<i64>,
    pub chat_id: Option<i64>,
    pub title: String,
    pub caption: String,
    pub file_name: String,
    pub file_id: Option<String>,
    pub media_kind: MediaKind,
    pub metadata: VideoMetadata,
    pub category_id: Option<i64>,
    pub grouping_key: String,
    pub file_size: Option<i64>,
    pub duration: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    /// `parent.full_path > name`, or just `name` at the root.
    pub full_path: String,
    pub created_at: DateTime<Utc>,
}

/// A category annotated with its parent's name and its direct counts.
#[derive(Debug, Clone, FromRow)]
pub struct CategoryEntry {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub full_path: String,
    pub parent_name: Option<String>,
    pub video_count: i64,
    pub subcategory_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Removed; this many videos lost their category.
    Deleted { uncategorized: u64 },
    /// Refused while the category still has subcategories.
    HasSubcategories(i64),
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteToggle {
    Added,
    Removed,
    /// The user already holds the configured maximum.
    LimitReached,
}

#[derive(Debug, Clone, FromRow)]
pub struct BotUser {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub join_date: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ActiveUser {
    pub user_id: i64,
    pub first_name: Option<String>,
    pub username: Option<String>,
    pub history_count: i64,
    pub favorites_count: i64,
}

impl ActiveUser {
    pub fn activity(&self) -> i64 {
        self.history_count + self.favorites_count
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AdminLogEntry {
    pub id: i64,
    pub admin_id: i64,
    pub action: String,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneralStats {
    pub videos: i64,
    pub users: i64,
    pub categories: i64,
    pub favorites: i64,
    pub total_views: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VideoStats {
    pub total_videos: i64,
    pub total_views: i64,
    pub avg_views: f64,
    pub categories_used: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryStats {
    pub total_categories: i64,
    pub categorized_videos: i64,
    pub uncategorized_videos: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStats {
    pub total_users: i64,
    pub new_this_week: i64,
    pub new_this_month: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct PopularCategory {
    pub name: String,
    pub videos: i64,
    pub views: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub history_deleted: u64,
    pub orphaned_favorites: u64,
    pub orphaned_history: u64,
}
