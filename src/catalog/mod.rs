//! Catalog storage: videos, categories, users, favorites, history and the
//! admin action log, kept in SQLite and accessed through parameterized
//! `sqlx` queries.
//!
//! [`Catalog`] is a cheap clone of a connection pool. Each method borrows a
//! connection for a single statement (or one short transaction) and hands
//! it back before returning.

mod admin;
mod categories;
mod models;
mod schema;
mod stats;
mod users;
mod videos;

pub use categories::ParentScope;
pub use models::*;
pub use schema::SCHEMA_SQL;

use std::str::FromStr;

use log::{debug, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, QueryBuilder, Sqlite};

pub use crate::error::CatalogError;

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Handle to the archive database.
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    /// Connect to `database_url`, creating the file if needed, and make sure
    /// the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        debug!("Connecting to SQLite database at {database_url}");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let catalog = Self { pool };
        catalog.init_schema().await?;
        Ok(catalog)
    }

    /// A private in-memory database. The pool holds a single connection
    /// that is never recycled, otherwise the data would vanish with it.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let catalog = Self { pool };
        catalog.init_schema().await?;
        Ok(catalog)
    }

    async fn init_schema(&self) -> Result<()> {
        info!("Initializing catalog schema");
        self.pool.execute(SCHEMA_SQL).await?;
        self.ensure_media_kind().await
    }

    /// Databases created before the media kind was stored lack the column.
    /// Their rows are classified by file extension, which is all they carry.
    async fn ensure_media_kind(&self) -> Result<()> {
        let present: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('videos') WHERE name = 'media_kind'",
        )
        .fetch_one(&self.pool)
        .await?;
        if present > 0 {
            return Ok(());
        }

        info!("Adding media_kind column to videos");
        let mut tx = self.pool.begin().await?;
        sqlx::query("ALTER TABLE videos ADD COLUMN media_kind TEXT NOT NULL DEFAULT 'video'")
            .execute(&mut *tx)
            .await?;
        let documents = sqlx::query(
            r#"
            UPDATE videos SET media_kind = 'document'
            WHERE lower(coalesce(file_name, '')) NOT LIKE '%.mp4'
              AND lower(coalesce(file_name, '')) NOT LIKE '%.mkv'
              AND lower(coalesce(file_name, '')) NOT LIKE '%.avi'
              AND lower(coalesce(file_name, '')) NOT LIKE '%.mov'
              AND lower(coalesce(file_name, '')) NOT LIKE '%.webm'
            "#,
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        debug!("Marked {} legacy rows as documents", documents.rows_affected());
        Ok(())
    }

    /// Whether the database answers a trivial query.
    pub async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

/// One page of a listing. Page numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub per_page: u32,
}

impl Page {
    pub fn new(number: u32, per_page: u32) -> Self {
        Self {
            number: number.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn first(per_page: u32) -> Self {
        Self::new(1, per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.number - 1) * i64::from(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn total_pages(&self, total: i64) -> u32 {
        let per_page = i64::from(self.per_page);
        u32::try_from((total.max(0) + per_page - 1) / per_page).unwrap_or(u32::MAX)
    }

    /// 1-based position of the `index`th item of this page across all pages.
    pub fn position(&self, index: usize) -> i64 {
        self.offset() + index as i64 + 1
    }
}

/// Append `(?, ?, ...)` binding every id.
fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    qb.push("(");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

/// `LIKE` pattern matching `needle` anywhere, with wildcards escaped.
fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_is_idempotent() {
        let catalog = Catalog::in_memory().await.unwrap();
        catalog.init_schema().await.unwrap();
        assert!(catalog.ping().await);
    }

    #[tokio::test]
    async fn legacy_rows_get_a_media_kind() {
        let catalog = Catalog::in_memory().await.unwrap();
        catalog
            .pool
            .execute("ALTER TABLE videos DROP COLUMN media_kind")
            .await
            .unwrap();
        for name in ["clip.MKV", "notes.pdf"] {
            sqlx::query("INSERT INTO videos (file_name, upload_date) VALUES (?, '2024-01-01T00:00:00Z')")
                .bind(name)
                .execute(&catalog.pool)
                .await
                .unwrap();
        }

        catalog.init_schema().await.unwrap();

        let kinds: Vec<MediaKind> =
            sqlx::query_scalar("SELECT media_kind FROM videos ORDER BY id")
                .fetch_all(&catalog.pool)
                .await
                .unwrap();
        assert_eq!(kinds, vec![MediaKind::Video, MediaKind::Document]);
    }

    #[test]
    fn page_math() {
        let page = Page::new(3, 8);
        assert_eq!(page.offset(), 16);
        assert_eq!(page.position(0), 17);
        assert_eq!(page.total_pages(17), 3);
        assert_eq!(page.total_pages(0), 0);
        assert_eq!(Page::new(0, 0), Page::new(1, 1));
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
    }
}
