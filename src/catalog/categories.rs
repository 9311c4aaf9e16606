use std::collections::VecDeque;

use chrono::Utc;
use log::debug;
use sqlx::{QueryBuilder, Sqlite, Transaction};

use super::{
    Catalog, CatalogError, Category, CategoryEntry, CategoryStats, DeleteOutcome, Page,
    PopularCategory, Result,
};

const PATH_SEPARATOR: &str = " > ";

/// Breadcrumb walks stop here even if the parent links were corrupted into a loop.
const MAX_DEPTH: i64 = 32;

const ENTRY_SELECT: &str = "SELECT c.id, c.name, c.parent_id, c.full_path, p.name AS parent_name, \
     (SELECT COUNT(*) FROM videos v WHERE v.category_id = c.id) AS video_count, \
     (SELECT COUNT(*) FROM categories s WHERE s.parent_id = c.id) AS subcategory_count \
     FROM categories c LEFT JOIN categories p ON p.id = c.parent_id";

/// Which categories a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentScope {
    All,
    /// Categories without a parent.
    Root,
    /// Direct children of the given category.
    Children(i64),
}

impl ParentScope {
    fn push_filter(self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            ParentScope::All => {}
            ParentScope::Root => {
                qb.push(" WHERE c.parent_id IS NULL");
            }
            ParentScope::Children(parent_id) => {
                qb.push(" WHERE c.parent_id = ");
                qb.push_bind(parent_id);
            }
        }
    }
}

fn child_path(parent_path: Option<&str>, name: &str) -> String {
    match parent_path {
        Some(parent) => format!("{parent}{PATH_SEPARATOR}{name}"),
        None => name.to_string(),
    }
}

impl Catalog {
    pub async fn list_categories(
        &self,
        scope: ParentScope,
        page: Option<Page>,
    ) -> Result<Vec<CategoryEntry>> {
        let mut qb = QueryBuilder::<Sqlite>::new(ENTRY_SELECT);
        scope.push_filter(&mut qb);
        qb.push(" ORDER BY c.name, c.id");
        if let Some(page) = page {
            qb.push(" LIMIT ");
            qb.push_bind(page.limit());
            qb.push(" OFFSET ");
            qb.push_bind(page.offset());
        }

        let entries = qb.build_query_as::<CategoryEntry>().fetch_all(&self.pool).await?;
        Ok(entries)
    }

    pub async fn count_categories(&self, scope: ParentScope) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM categories c");
        scope.push_filter(&mut qb);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// A category with its parent's name and its counts.
    pub async fn get_category(&self, id: i64) -> Result<Option<CategoryEntry>> {
        let entry = sqlx::query_as::<_, CategoryEntry>(&format!("{ENTRY_SELECT} WHERE c.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    /// The chain from the root down to `id`, root first. Empty for an unknown id.
    pub async fn breadcrumb(&self, id: i64) -> Result<Vec<Category>> {
        let chain = sqlx::query_as::<_, Category>(
            r#"
            WITH RECURSIVE chain(id, name, parent_id, full_path, created_at, depth) AS (
                SELECT id, name, parent_id, full_path, created_at, 0
                FROM categories WHERE id = ?
                UNION ALL
                SELECT c.id, c.name, c.parent_id, c.full_path, c.created_at, chain.depth + 1
                FROM categories c JOIN chain ON c.id = chain.parent_id
                WHERE chain.depth < ?
            )
            SELECT id, name, parent_id, full_path, created_at FROM chain ORDER BY depth DESC
            "#,
        )
        .bind(id)
        .bind(MAX_DEPTH)
        .fetch_all(&self.pool)
        .await?;
        Ok(chain)
    }

    /// Create a category under `parent_id`, or at the root.
    pub async fn create_category(&self, name: &str, parent_id: Option<i64>) -> Result<Category> {
        let name = name.trim();
        let parent_path = match parent_id {
            Some(parent_id) => Some(self.category_path(parent_id).await?),
            None => None,
        };
        let full_path = child_path(parent_path.as_deref(), name);

        let category = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name, parent_id, full_path, created_at) VALUES (?, ?, ?, ?) \
             RETURNING id, name, parent_id, full_path, created_at",
        )
        .bind(name)
        .bind(parent_id)
        .bind(&full_path)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        debug!("Created category {} ({full_path})", category.id);
        Ok(category)
    }

    /// Rename a category and rebuild the paths of all its descendants.
    pub async fn rename_category(&self, id: i64, name: &str) -> Result<()> {
        let name = name.trim();
        let mut tx = self.pool.begin().await?;

        let parent_id: Option<i64> = sqlx::query_scalar("SELECT parent_id FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(CatalogError::NotFound)?;
        let parent_path = match parent_id {
            Some(parent_id) => Some(path_in(&mut tx, parent_id).await?),
            None => None,
        };
        let full_path = child_path(parent_path.as_deref(), name);

        sqlx::query("UPDATE categories SET name = ?, full_path = ? WHERE id = ?")
            .bind(name)
            .bind(&full_path)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        rebuild_subtree(&mut tx, id, &full_path).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Reparent a category. Moving it under itself or a descendant is refused.
    pub async fn move_category(&self, id: i64, new_parent: Option<i64>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let name: String = sqlx::query_scalar("SELECT name FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(CatalogError::NotFound)?;

        let parent_path = match new_parent {
            Some(parent_id) => {
                let mut cursor = Some(parent_id);
                let mut steps = 0;
                while let Some(current) = cursor {
                    if current == id {
                        return Err(CatalogError::InvalidParent(format!(
                            "category {parent_id} lies inside category {id}"
                        )));
                    }
                    steps += 1;
                    if steps > MAX_DEPTH {
                        break;
                    }
                    cursor = sqlx::query_scalar::<_, Option<i64>>(
                        "SELECT parent_id FROM categories WHERE id = ?",
                    )
                    .bind(current)
                    .fetch_optional(&mut *tx)
                    .await?
                    .flatten();
                }
                Some(path_in(&mut tx, parent_id).await?)
            }
            None => None,
        };
        let full_path = child_path(parent_path.as_deref(), &name);

        sqlx::query("UPDATE categories SET parent_id = ?, full_path = ? WHERE id = ?")
            .bind(new_parent)
            .bind(&full_path)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        rebuild_subtree(&mut tx, id, &full_path).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete a leaf category. Its videos become uncategorized.
    pub async fn delete_category(&self, id: i64) -> Result<DeleteOutcome> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(DeleteOutcome::NotFound);
        }

        let children: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE parent_id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if children > 0 {
            return Ok(DeleteOutcome::HasSubcategories(children));
        }

        let uncategorized = sqlx::query("UPDATE videos SET category_id = NULL WHERE category_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(DeleteOutcome::Deleted { uncategorized })
    }

    /// Reassign every video of `from` to `to`. Returns the number moved.
    pub async fn move_videos(&self, from: i64, to: i64) -> Result<u64> {
        // Fails with NotFound for an unknown target.
        self.category_path(to).await?;

        let moved = sqlx::query("UPDATE videos SET category_id = ? WHERE category_id = ?")
            .bind(to)
            .bind(from)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(moved)
    }

    pub async fn category_stats(&self) -> Result<CategoryStats> {
        let (total_categories, categorized_videos, uncategorized_videos): (i64, i64, i64) =
            sqlx::query_as(
                "SELECT (SELECT COUNT(*) FROM categories), \
                 (SELECT COUNT(*) FROM videos WHERE category_id IS NOT NULL), \
                 (SELECT COUNT(*) FROM videos WHERE category_id IS NULL)",
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(CategoryStats {
            total_categories,
            categorized_videos,
            uncategorized_videos,
        })
    }

    /// Categories ordered by the total views of their videos.
    pub async fn popular_categories(&self, limit: i64) -> Result<Vec<PopularCategory>> {
        let popular = sqlx::query_as::<_, PopularCategory>(
            "SELECT c.full_path AS name, COUNT(v.id) AS videos, \
             COALESCE(SUM(v.view_count), 0) AS views \
             FROM categories c JOIN videos v ON v.category_id = c.id \
             GROUP BY c.id ORDER BY views DESC, videos DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(popular)
    }

    async fn category_path(&self, id: i64) -> Result<String> {
        sqlx::query_scalar("SELECT full_path FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CatalogError::NotFound)
    }
}

async fn path_in(tx: &mut Transaction<'_, Sqlite>, id: i64) -> Result<String> {
    sqlx::query_scalar("SELECT full_path FROM categories WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(CatalogError::NotFound)
}

/// Recompute `full_path` for every descendant of `root_id`, breadth first.
async fn rebuild_subtree(
    tx: &mut Transaction<'_, Sqlite>,
    root_id: i64,
    root_path: &str,
) -> Result<()> {
    let mut queue = VecDeque::from([(root_id, root_path.to_string())]);

    while let Some((parent_id, parent_path)) = queue.pop_front() {
        let children: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM categories WHERE parent_id = ?")
                .bind(parent_id)
                .fetch_all(&mut **tx)
                .await?;

        for (child_id, name) in children {
            let path = child_path(Some(&parent_path), &name);
            sqlx::query("UPDATE categories SET full_path = ? WHERE id = ?")
                .bind(&path)
                .bind(child_id)
                .execute(&mut **tx)
                .await?;
            queue.push_back((child_id, path));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NewVideo;

    async fn video_in(catalog: &Catalog, category_id: Option<i64>) -> i64 {
        let video = NewVideo {
            title: "clip".to_string(),
            category_id,
            ..Default::default()
        };
        catalog.add_video(&video).await.unwrap()
    }

    #[tokio::test]
    async fn full_path_follows_parents() {
        let catalog = Catalog::in_memory().await.unwrap();
        let series = catalog.create_category("Series", None).await.unwrap();
        let drama = catalog.create_category("Drama", Some(series.id)).await.unwrap();
        let korean = catalog.create_category("Korean", Some(drama.id)).await.unwrap();

        assert_eq!(series.full_path, "Series");
        assert_eq!(korean.full_path, "Series > Drama > Korean");
        assert!(matches!(
            catalog.create_category("Orphan", Some(999)).await,
            Err(CatalogError::NotFound)
        ));
    }

    #[tokio::test]
    async fn rename_rebuilds_descendants() {
        let catalog = Catalog::in_memory().await.unwrap();
        let series = catalog.create_category("Series", None).await.unwrap();
        let drama = catalog.create_category("Drama", Some(series.id)).await.unwrap();
        let korean = catalog.create_category("Korean", Some(drama.id)).await.unwrap();

        catalog.rename_category(series.id, "Shows").await.unwrap();

        let korean = catalog.get_category(korean.id).await.unwrap().unwrap();
        assert_eq!(korean.full_path, "Shows > Drama > Korean");
        assert_eq!(korean.parent_name.as_deref(), Some("Drama"));
        assert!(matches!(
            catalog.rename_category(999, "x").await,
            Err(CatalogError::NotFound)
        ));
    }

    #[tokio::test]
    async fn reparent_rebuilds_and_rejects_cycles() {
        let catalog = Catalog::in_memory().await.unwrap();
        let movies = catalog.create_category("Movies", None).await.unwrap();
        let series = catalog.create_category("Series", None).await.unwrap();
        let drama = catalog.create_category("Drama", Some(series.id)).await.unwrap();
        let korean = catalog.create_category("Korean", Some(drama.id)).await.unwrap();

        catalog.move_category(drama.id, Some(movies.id)).await.unwrap();
        let entry = catalog.get_category(korean.id).await.unwrap().unwrap();
        assert_eq!(entry.full_path, "Movies > Drama > Korean");

        assert!(matches!(
            catalog.move_category(drama.id, Some(korean.id)).await,
            Err(CatalogError::InvalidParent(_))
        ));
        assert!(matches!(
            catalog.move_category(drama.id, Some(drama.id)).await,
            Err(CatalogError::InvalidParent(_))
        ));

        catalog.move_category(drama.id, None).await.unwrap();
        let entry = catalog.get_category(korean.id).await.unwrap().unwrap();
        assert_eq!(entry.full_path, "Drama > Korean");
    }

    #[tokio::test]
    async fn breadcrumb_is_root_first() {
        let catalog = Catalog::in_memory().await.unwrap();
        let a = catalog.create_category("A", None).await.unwrap();
        let b = catalog.create_category("B", Some(a.id)).await.unwrap();
        let c = catalog.create_category("C", Some(b.id)).await.unwrap();

        let names: Vec<String> = catalog
            .breadcrumb(c.id)
            .await
            .unwrap()
            .into_iter()
            .map(|cat| cat.name)
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert!(catalog.breadcrumb(999).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_scopes_and_counts() {
        let catalog = Catalog::in_memory().await.unwrap();
        let root = catalog.create_category("Root", None).await.unwrap();
        catalog.create_category("Beta", Some(root.id)).await.unwrap();
        catalog.create_category("Alpha", Some(root.id)).await.unwrap();
        video_in(&catalog, Some(root.id)).await;

        let roots = catalog.list_categories(ParentScope::Root, None).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].video_count, 1);
        assert_eq!(roots[0].subcategory_count, 2);

        let children = catalog
            .list_categories(ParentScope::Children(root.id), Some(Page::first(1)))
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "Alpha");
        assert_eq!(catalog.count_categories(ParentScope::All).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn delete_refuses_parents_and_uncategorizes_videos() {
        let catalog = Catalog::in_memory().await.unwrap();
        let parent = catalog.create_category("Parent", None).await.unwrap();
        let child = catalog.create_category("Child", Some(parent.id)).await.unwrap();
        let video = video_in(&catalog, Some(child.id)).await;

        assert_eq!(
            catalog.delete_category(parent.id).await.unwrap(),
            DeleteOutcome::HasSubcategories(1)
        );
        assert_eq!(
            catalog.delete_category(child.id).await.unwrap(),
            DeleteOutcome::Deleted { uncategorized: 1 }
        );
        assert_eq!(catalog.get_video(video).await.unwrap().unwrap().category_id, None);
        assert_eq!(catalog.delete_category(child.id).await.unwrap(), DeleteOutcome::NotFound);
    }

    #[tokio::test]
    async fn move_videos_between_categories() {
        let catalog = Catalog::in_memory().await.unwrap();
        let from = catalog.create_category("From", None).await.unwrap();
        let to = catalog.create_category("To", None).await.unwrap();
        video_in(&catalog, Some(from.id)).await;
        video_in(&catalog, Some(from.id)).await;
        video_in(&catalog, None).await;

        assert_eq!(catalog.move_videos(from.id, to.id).await.unwrap(), 2);
        assert_eq!(catalog.count_in_category(to.id).await.unwrap(), 2);
        assert!(matches!(
            catalog.move_videos(to.id, 999).await,
            Err(CatalogError::NotFound)
        ));

        let stats = catalog.category_stats().await.unwrap();
        assert_eq!(stats.total_categories, 2);
        assert_eq!(stats.categorized_videos, 2);
        assert_eq!(stats.uncategorized_videos, 1);
        let popular = catalog.popular_categories(5).await.unwrap();
        assert_eq!(popular[0].name, "To");
        assert_eq!(popular[0].videos, 2);
    }
}
