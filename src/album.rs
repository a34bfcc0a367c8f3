//! Album hierarchy and photo membership.
//!
//! Albums group like tags do (single parent, cycle-checked on insert) but
//! carry no synonym concept. An album also tracks which filesystem
//! directories it was materialized from ([`associated_directories`]), which
//! the ingest walker consults to decide whether a newly seen directory
//! should join an existing album instead of creating a new one.

use crate::error::{CatalogError, Result};
use crate::id::IdAllocator;
use crate::model::{now, Album};
use crate::photo;
use sqlx::SqlitePool;

pub async fn get_album(pool: &SqlitePool, id: i64) -> Result<Album> {
    sqlx::query_as::<_, Album>("SELECT * FROM albums WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CatalogError::NoSuchAlbum(id.to_string()))
}

pub async fn new_album(
    pool: &SqlitePool,
    title: Option<&str>,
    description: Option<&str>,
    author_id: Option<i64>,
) -> Result<Album> {
    let id = IdAllocator::next(pool, "albums").await?;
    let created = now();
    sqlx::query(
        "INSERT INTO albums (id, title, description, created, thumbnail_photo, author_id) \
         VALUES (?, ?, ?, ?, NULL, ?)",
    )
    .bind(id)
    .bind(title)
    .bind(description)
    .bind(created)
    .bind(author_id)
    .execute(pool)
    .await?;

    Ok(Album {
        id,
        title: title.map(str::to_string),
        description: description.map(str::to_string),
        created,
        thumbnail_photo: None,
        author_id,
    })
}

pub async fn edit(
    pool: &SqlitePool,
    album: &Album,
    title: Option<&str>,
    description: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE albums SET title = ?, description = ? WHERE id = ?")
        .bind(title)
        .bind(description)
        .bind(album.id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn walk_parents(pool: &SqlitePool, id: i64) -> Result<Vec<i64>> {
    let mut result = Vec::new();
    let mut current = id;
    loop {
        let parent: Option<i64> =
            sqlx::query_scalar("SELECT parentid FROM album_group_rel WHERE memberid = ?")
                .bind(current)
                .fetch_optional(pool)
                .await?;
        match parent {
            Some(p) => {
                result.push(p);
                current = p;
            }
            None => break,
        }
    }
    Ok(result)
}

pub async fn add_child(pool: &SqlitePool, parent_id: i64, member_id: i64) -> Result<()> {
    let existing_parent: Option<i64> =
        sqlx::query_scalar("SELECT parentid FROM album_group_rel WHERE memberid = ?")
            .bind(member_id)
            .fetch_optional(pool)
            .await?;

    match existing_parent {
        Some(p) if p == parent_id => return Ok(()),
        Some(_) => return Err(CatalogError::GroupExists(member_id.to_string())),
        None => {}
    }

    let ancestors = walk_parents(pool, parent_id).await?;
    if ancestors.contains(&member_id) || parent_id == member_id {
        return Err(CatalogError::RecursiveGrouping {
            parent: parent_id.to_string(),
            member: member_id.to_string(),
        });
    }

    sqlx::query("INSERT INTO album_group_rel (parentid, memberid) VALUES (?, ?)")
        .bind(parent_id)
        .bind(member_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Removes the `(parent, member)` group relation, making `member` a root.
/// Fails [`CatalogError::NoSuchGroup`] if no such relation exists.
pub async fn remove_child(pool: &SqlitePool, parent_id: i64, member_id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM album_group_rel WHERE parentid = ? AND memberid = ?")
        .bind(parent_id)
        .bind(member_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CatalogError::NoSuchGroup(member_id.to_string()));
    }
    Ok(())
}

pub async fn add_photo(pool: &SqlitePool, album_id: i64, photo_id: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO album_photo_rel (albumid, photoid) VALUES (?, ?)")
        .bind(album_id)
        .bind(photo_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn remove_photo(pool: &SqlitePool, album_id: i64, photo_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM album_photo_rel WHERE albumid = ? AND photoid = ?")
        .bind(album_id)
        .bind(photo_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Applies `tag_id` to every photo reachable from `album_id`, including
/// photos held by nested albums, by calling [`photo::add_tag`] per photo so
/// subsumption and `tagged_at` bookkeeping happen the same way they would for
/// a single photo.
pub async fn add_tag_to_all(pool: &SqlitePool, album_id: i64, tag_id: i64) -> Result<()> {
    for photo_id in walk_photos(pool, album_id).await? {
        photo::add_tag(pool, photo_id, tag_id).await?;
    }
    Ok(())
}

pub async fn associate_directory(pool: &SqlitePool, album_id: i64, directory: &str) -> Result<()> {
    sqlx::query("INSERT INTO album_associated_directories (albumid, directory) VALUES (?, ?)")
        .bind(album_id)
        .bind(directory)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn associated_directories(pool: &SqlitePool, album_id: i64) -> Result<Vec<String>> {
    sqlx::query_scalar("SELECT directory FROM album_associated_directories WHERE albumid = ?")
        .bind(album_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
}

pub async fn album_for_directory(pool: &SqlitePool, directory: &str) -> Result<Option<i64>> {
    sqlx::query_scalar("SELECT albumid FROM album_associated_directories WHERE directory = ?")
        .bind(directory)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
}

/// Lists every photo ID reachable from `album_id`, recursing into child
/// albums. Direct members only appear once even if the album tree revisits
/// them through more than one path.
pub async fn walk_photos(pool: &SqlitePool, album_id: i64) -> Result<Vec<i64>> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    let mut frontier = vec![album_id];
    while let Some(current) = frontier.pop() {
        let photos: Vec<i64> = sqlx::query_scalar("SELECT photoid FROM album_photo_rel WHERE albumid = ?")
            .bind(current)
            .fetch_all(pool)
            .await?;
        for photo_id in photos {
            if seen.insert(photo_id) {
                result.push(photo_id);
            }
        }
        let children: Vec<i64> =
            sqlx::query_scalar("SELECT memberid FROM album_group_rel WHERE parentid = ?")
                .bind(current)
                .fetch_all(pool)
                .await?;
        frontier.extend(children);
    }
    Ok(result)
}

/// Sum of `bytes` over every photo reachable from `album_id`. Callers that
/// want the memoized-until-next-commit behavior described for this
/// aggregate should cache the result themselves keyed by
/// [`crate::txn::TxnManager::commit_id`].
pub async fn sum_bytes(pool: &SqlitePool, album_id: i64) -> Result<i64> {
    let photo_ids = walk_photos(pool, album_id).await?;
    if photo_ids.is_empty() {
        return Ok(0);
    }
    let placeholders = photo_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("SELECT COALESCE(SUM(bytes), 0) FROM photos WHERE id IN ({placeholders})");
    let mut query = sqlx::query_scalar(&sql);
    for id in &photo_ids {
        query = query.bind(id);
    }
    query.fetch_one(pool).await.map_err(Into::into)
}

pub async fn sum_photos(pool: &SqlitePool, album_id: i64) -> Result<usize> {
    Ok(walk_photos(pool, album_id).await?.len())
}

pub async fn delete(pool: &SqlitePool, album: &Album, delete_children: bool) -> Result<()> {
    let children: Vec<i64> =
        sqlx::query_scalar("SELECT memberid FROM album_group_rel WHERE parentid = ?")
            .bind(album.id)
            .fetch_all(pool)
            .await?;

    if delete_children {
        for child_id in children {
            let child = get_album(pool, child_id).await?;
            Box::pin(delete(pool, &child, true)).await?;
        }
    } else {
        let grandparent: Option<i64> =
            sqlx::query_scalar("SELECT parentid FROM album_group_rel WHERE memberid = ?")
                .bind(album.id)
                .fetch_optional(pool)
                .await?;
        for child_id in children {
            sqlx::query("DELETE FROM album_group_rel WHERE memberid = ?")
                .bind(child_id)
                .execute(pool)
                .await?;
            if let Some(gp) = grandparent {
                sqlx::query("INSERT INTO album_group_rel (parentid, memberid) VALUES (?, ?)")
                    .bind(gp)
                    .bind(child_id)
                    .execute(pool)
                    .await?;
            }
        }
    }

    sqlx::query("DELETE FROM album_group_rel WHERE memberid = ?").bind(album.id).execute(pool).await?;
    sqlx::query("DELETE FROM album_photo_rel WHERE albumid = ?").bind(album.id).execute(pool).await?;
    sqlx::query("DELETE FROM album_associated_directories WHERE albumid = ?")
        .bind(album.id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM albums WHERE id = ?").bind(album.id).execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    async fn setup() -> SqlitePool {
        Store::open_in_memory().await.unwrap().pool
    }

    #[tokio::test]
    async fn new_album_defaults_to_untitled_display() {
        let pool = setup().await;
        let album = new_album(&pool, None, None, None).await.unwrap();
        assert_eq!(album.display_name(), format!("Album {}", album.id));
    }

    #[tokio::test]
    async fn add_child_detects_cycles() {
        let pool = setup().await;
        let a = new_album(&pool, Some("a"), None, None).await.unwrap();
        let b = new_album(&pool, Some("b"), None, None).await.unwrap();
        add_child(&pool, a.id, b.id).await.unwrap();
        let err = add_child(&pool, b.id, a.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::RecursiveGrouping { .. }));
    }

    #[tokio::test]
    async fn walk_photos_recurses_into_children_without_duplicates() {
        let pool = setup().await;
        let parent = new_album(&pool, Some("parent"), None, None).await.unwrap();
        let child = new_album(&pool, Some("child"), None, None).await.unwrap();
        add_child(&pool, parent.id, child.id).await.unwrap();

        sqlx::query("INSERT INTO photos (id, filepath, extension, created) VALUES (1, '/a.jpg', 'jpg', 0)")
            .execute(&pool)
            .await
            .unwrap();
        add_photo(&pool, child.id, 1).await.unwrap();
        add_photo(&pool, parent.id, 1).await.unwrap();

        let photos = walk_photos(&pool, parent.id).await.unwrap();
        assert_eq!(photos, vec![1]);
    }

    #[tokio::test]
    async fn add_tag_to_all_reaches_nested_album_photos() {
        let pool = setup().await;
        let parent = new_album(&pool, Some("parent"), None, None).await.unwrap();
        let child = new_album(&pool, Some("child"), None, None).await.unwrap();
        add_child(&pool, parent.id, child.id).await.unwrap();

        sqlx::query("INSERT INTO photos (id, filepath, extension, created) VALUES (1, '/a.jpg', 'jpg', 0)")
            .execute(&pool)
            .await
            .unwrap();
        add_photo(&pool, child.id, 1).await.unwrap();

        let config = crate::config::TagConfig::default();
        let tag = crate::tag::new_tag(&pool, &config, "vacation", None, None).await.unwrap();
        add_tag_to_all(&pool, parent.id, tag.id).await.unwrap();

        assert!(photo::has_tag(&pool, 1, tag.id).await.unwrap());
    }

    #[tokio::test]
    async fn sum_bytes_totals_reachable_photos() {
        let pool = setup().await;
        let album = new_album(&pool, None, None, None).await.unwrap();
        sqlx::query(
            "INSERT INTO photos (id, filepath, extension, created, bytes) VALUES (1, '/a.jpg', 'jpg', 0, 100)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO photos (id, filepath, extension, created, bytes) VALUES (2, '/b.jpg', 'jpg', 0, 50)",
        )
        .execute(&pool)
        .await
        .unwrap();
        add_photo(&pool, album.id, 1).await.unwrap();
        add_photo(&pool, album.id, 2).await.unwrap();

        assert_eq!(sum_bytes(&pool, album.id).await.unwrap(), 150);
        assert_eq!(sum_photos(&pool, album.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_without_children_reparents() {
        let pool = setup().await;
        let grandparent = new_album(&pool, Some("g"), None, None).await.unwrap();
        let parent = new_album(&pool, Some("p"), None, None).await.unwrap();
        let child = new_album(&pool, Some("c"), None, None).await.unwrap();
        add_child(&pool, grandparent.id, parent.id).await.unwrap();
        add_child(&pool, parent.id, child.id).await.unwrap();

        delete(&pool, &parent, false).await.unwrap();

        let new_parent: Option<i64> =
            sqlx::query_scalar("SELECT parentid FROM album_group_rel WHERE memberid = ?")
                .bind(child.id)
                .fetch_optional(&pool)
                .await
                .unwrap();
        assert_eq!(new_parent, Some(grandparent.id));
    }
}
