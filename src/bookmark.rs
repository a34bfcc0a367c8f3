//! Bookmarks: flat title/URL pairs with no hierarchy, the simplest of the
//! catalog's entity types.

use crate::error::{CatalogError, Result};
use crate::id::IdAllocator;
use crate::model::{now, Bookmark};
use sqlx::SqlitePool;

pub async fn get_bookmark(pool: &SqlitePool, id: i64) -> Result<Bookmark> {
    sqlx::query_as::<_, Bookmark>("SELECT * FROM bookmarks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CatalogError::NoSuchBookmark(id.to_string()))
}

pub async fn new_bookmark(
    pool: &SqlitePool,
    title: Option<&str>,
    url: &str,
    author_id: Option<i64>,
) -> Result<Bookmark> {
    let id = IdAllocator::next(pool, "bookmarks").await?;
    let created = now();
    sqlx::query("INSERT INTO bookmarks (id, title, url, created, author_id) VALUES (?, ?, ?, ?, ?)")
        .bind(id)
        .bind(title)
        .bind(url)
        .bind(created)
        .bind(author_id)
        .execute(pool)
        .await?;

    Ok(Bookmark { id, title: title.map(str::to_string), url: url.to_string(), created, author_id })
}

pub async fn edit(pool: &SqlitePool, bookmark: &Bookmark, title: Option<&str>, url: Option<&str>) -> Result<()> {
    let new_title = title.or(bookmark.title.as_deref());
    let new_url = url.unwrap_or(&bookmark.url);
    sqlx::query("UPDATE bookmarks SET title = ?, url = ? WHERE id = ?")
        .bind(new_title)
        .bind(new_url)
        .bind(bookmark.id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM bookmarks WHERE id = ?").bind(id).execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn new_bookmark_then_edit_updates_url() {
        let pool = Store::open_in_memory().await.unwrap().pool;
        let bookmark = new_bookmark(&pool, Some("example"), "https://example.com", None).await.unwrap();
        edit(&pool, &bookmark, None, Some("https://example.org")).await.unwrap();
        let reloaded = get_bookmark(&pool, bookmark.id).await.unwrap();
        assert_eq!(reloaded.url, "https://example.org");
        assert_eq!(reloaded.title.as_deref(), Some("example"));
    }

    #[tokio::test]
    async fn delete_removes_bookmark() {
        let pool = Store::open_in_memory().await.unwrap().pool;
        let bookmark = new_bookmark(&pool, None, "https://example.com", None).await.unwrap();
        delete(&pool, bookmark.id).await.unwrap();
        assert!(matches!(get_bookmark(&pool, bookmark.id).await, Err(CatalogError::NoSuchBookmark(_))));
    }
}
