//! Individual photo records: ingestion, tagging, renaming, and thumbnails.
//!
//! Filesystem side effects (renaming the backing file, deleting it,
//! writing a thumbnail) are never performed eagerly here — every one is
//! queued on the caller's [`crate::txn::TxnManager`] so a rolled-back
//! transaction never leaves the disk out of sync with the database.

use crate::error::{CatalogError, Result};
use crate::id::IdAllocator;
use crate::media::MediaToolkit;
use crate::model::{now, Photo};
use crate::tag::{self, get_tag};
use crate::txn::TxnManager;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub async fn get_photo(pool: &SqlitePool, id: i64) -> Result<Photo> {
    sqlx::query_as::<_, Photo>("SELECT * FROM photos WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CatalogError::NoSuchPhoto(id.to_string()))
}

pub async fn get_photo_by_path(pool: &SqlitePool, filepath: &str) -> Result<Option<Photo>> {
    sqlx::query_as::<_, Photo>("SELECT * FROM photos WHERE filepath = ?")
        .bind(filepath)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
}

/// Registers a new photo row for `filepath`. `bytes`/`device`/`inode` are
/// captured immediately from a cheap `stat` so renames are detectable right
/// away; everything that needs decoding the file's contents (the sha256
/// digest, dimensions, duration) is left unset until [`reload_metadata`]
/// runs. Fails [`CatalogError::PhotoExists`] if the path is already tracked.
pub async fn new_photo(pool: &SqlitePool, filepath: &Path, author_id: Option<i64>) -> Result<Photo> {
    let filepath_str = filepath.to_string_lossy().into_owned();
    if get_photo_by_path(pool, &filepath_str).await?.is_some() {
        return Err(CatalogError::PhotoExists(filepath_str));
    }

    let extension = filepath
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let stat = std::fs::metadata(filepath)?;
    let bytes = stat.len() as i64;
    let (device, inode) = file_identity(&stat);

    let id = IdAllocator::next(pool, "photos").await?;
    let created = now();
    sqlx::query(
        "INSERT INTO photos (id, filepath, extension, bytes, device, inode, created, searchhidden) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 0)",
    )
    .bind(id)
    .bind(&filepath_str)
    .bind(&extension)
    .bind(bytes)
    .bind(device)
    .bind(inode)
    .bind(created)
    .execute(pool)
    .await?;

    if let Some(author_id) = author_id {
        sqlx::query("UPDATE photos SET author_id = ? WHERE id = ?")
            .bind(author_id)
            .bind(id)
            .execute(pool)
            .await?;
    }

    get_photo(pool, id).await
}

/// Recomputes every derived field from the file on disk: size, mtime,
/// sha256 digest (read in `file_read_chunk`-sized pieces), and
/// dimensions/duration via `toolkit`.
pub async fn reload_metadata(
    pool: &SqlitePool,
    photo: &Photo,
    toolkit: &dyn MediaToolkit,
    file_read_chunk: usize,
) -> Result<()> {
    let path = Path::new(&photo.filepath);
    let metadata = std::fs::metadata(path)?;
    let bytes = metadata.len() as i64;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64());
    let (device, inode) = file_identity(&metadata);

    let sha256 = hash_file(path, file_read_chunk)?;
    let probe = toolkit.probe(path)?;
    let area = match (probe.width, probe.height) {
        (Some(w), Some(h)) => Some((w as i64) * (h as i64)),
        _ => None,
    };
    let aspectratio = match (probe.width, probe.height) {
        (Some(w), Some(h)) if h != 0 => Some(w as f64 / h as f64),
        _ => None,
    };

    sqlx::query(
        "UPDATE photos SET bytes = ?, mtime = ?, sha256 = ?, width = ?, height = ?, area = ?, \
         aspectratio = ?, duration = ?, bitrate = ?, device = ?, inode = ? WHERE id = ?",
    )
    .bind(bytes)
    .bind(mtime)
    .bind(&sha256)
    .bind(probe.width.map(|w| w as i64))
    .bind(probe.height.map(|h| h as i64))
    .bind(area)
    .bind(aspectratio)
    .bind(probe.duration)
    .bind(probe.bitrate)
    .bind(device)
    .bind(inode)
    .bind(photo.id)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(unix)]
pub(crate) fn file_identity(metadata: &std::fs::Metadata) -> (Option<i64>, Option<i64>) {
    use std::os::unix::fs::MetadataExt;
    (Some(metadata.dev() as i64), Some(metadata.ino() as i64))
}

#[cfg(not(unix))]
pub(crate) fn file_identity(_metadata: &std::fs::Metadata) -> (Option<i64>, Option<i64>) {
    (None, None)
}

fn hash_file(path: &Path, chunk_size: usize) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    loop {
        use std::io::Read;
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Applies `tag_id` to `photo_id`, enforcing the subsumption rule: if the
/// photo already carries a descendant of `tag_id` (itself included), this is
/// a no-op, since the more specific tag already covers it. Otherwise, any
/// ancestor of `tag_id` already on the photo is removed before `tag_id` is
/// inserted, since the new, more specific tag replaces it.
pub async fn add_tag(pool: &SqlitePool, photo_id: i64, tag_id: i64) -> Result<()> {
    let target = get_tag(pool, None, Some(tag_id)).await?;
    let flat = tag::flat_descendants(pool).await?;
    let covering = flat.get(&target.name).cloned().unwrap_or_default();

    let existing: HashSet<String> = tags(pool, photo_id).await?.into_iter().collect();
    if covering.iter().any(|name| existing.contains(name)) {
        return Ok(());
    }

    for ancestor_id in tag::walk_parents(pool, tag_id).await? {
        sqlx::query("DELETE FROM photo_tag_rel WHERE photoid = ? AND tagid = ?")
            .bind(photo_id)
            .bind(ancestor_id)
            .execute(pool)
            .await?;
    }

    sqlx::query("INSERT OR IGNORE INTO photo_tag_rel (photoid, tagid) VALUES (?, ?)")
        .bind(photo_id)
        .bind(tag_id)
        .execute(pool)
        .await?;
    sqlx::query("UPDATE photos SET tagged_at = ? WHERE id = ?")
        .bind(now())
        .bind(photo_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Removes exactly the `(photo, tag)` relation named; it does not cascade
/// to the tag's descendants or ancestors.
pub async fn remove_tag(pool: &SqlitePool, photo_id: i64, tag_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM photo_tag_rel WHERE photoid = ? AND tagid = ?")
        .bind(photo_id)
        .bind(tag_id)
        .execute(pool)
        .await?;
    sqlx::query("UPDATE photos SET tagged_at = ? WHERE id = ?")
        .bind(now())
        .bind(photo_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn has_tag(pool: &SqlitePool, photo_id: i64, tag_id: i64) -> Result<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM photo_tag_rel WHERE photoid = ? AND tagid = ?")
            .bind(photo_id)
            .bind(tag_id)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

pub async fn tags(pool: &SqlitePool, photo_id: i64) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT tags.name FROM tags JOIN photo_tag_rel ON tags.id = photo_tag_rel.tagid \
         WHERE photo_tag_rel.photoid = ?",
    )
    .bind(photo_id)
    .fetch_all(pool)
    .await?;
    Ok(names)
}

pub async fn set_searchhidden(pool: &SqlitePool, photo_id: i64, hidden: bool) -> Result<()> {
    sqlx::query("UPDATE photos SET searchhidden = ? WHERE id = ?")
        .bind(hidden)
        .bind(photo_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Renames `photo`'s backing file to `new_path`. Without `move_file`, a
/// `new_path` in a different directory than the current one is rejected;
/// renaming to the exact current path is always rejected. The database row
/// is updated immediately so reads inside the same transaction see the new
/// path. If only letter case differs between old and new path, the actual
/// filesystem rename is deferred to commit time (an in-place rename is
/// cheap and atomic). Otherwise the destination is linked — or, if linking
/// isn't possible (e.g. across filesystems), copied — immediately, and
/// removal of the old file is deferred to commit, so a rolled-back
/// transaction leaves the original file in place.
pub async fn rename_file(
    pool: &SqlitePool,
    txn: &mut TxnManager,
    photo: &Photo,
    new_path: PathBuf,
    move_file: bool,
) -> Result<()> {
    let old_path = PathBuf::from(&photo.filepath);

    if !move_file && old_path.parent() != new_path.parent() {
        return Err(CatalogError::CrossDirectoryRename(new_path.to_string_lossy().into_owned()));
    }
    if old_path == new_path {
        return Err(CatalogError::IdenticalRenamePath(new_path.to_string_lossy().into_owned()));
    }

    if let Some(parent) = new_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let new_path_str = new_path.to_string_lossy().into_owned();
    sqlx::query("UPDATE photos SET filepath = ? WHERE id = ?")
        .bind(&new_path_str)
        .bind(photo.id)
        .execute(pool)
        .await?;

    let case_only_rename =
        old_path.to_string_lossy().to_lowercase() == new_path.to_string_lossy().to_lowercase();

    if case_only_rename {
        txn.defer(
            Box::new(move || {
                Box::pin(async move {
                    std::fs::rename(&old_path, &new_path)?;
                    Ok(())
                })
            }),
            None,
        );
    } else {
        if std::fs::hard_link(&old_path, &new_path).is_err() {
            std::fs::copy(&old_path, &new_path)?;
        }
        txn.defer(
            Box::new(move || {
                Box::pin(async move {
                    std::fs::remove_file(&old_path)?;
                    Ok(())
                })
            }),
            None,
        );
    }
    Ok(())
}

/// Deletes `photo`'s row and, on commit, its backing file and thumbnail.
pub async fn delete(pool: &SqlitePool, txn: &mut TxnManager, photo: &Photo) -> Result<()> {
    sqlx::query("DELETE FROM photo_tag_rel WHERE photoid = ?").bind(photo.id).execute(pool).await?;
    sqlx::query("DELETE FROM album_photo_rel WHERE photoid = ?").bind(photo.id).execute(pool).await?;
    sqlx::query("DELETE FROM photos WHERE id = ?").bind(photo.id).execute(pool).await?;

    let filepath = PathBuf::from(&photo.filepath);
    let thumbnail = photo.thumbnail_relpath.clone();
    txn.defer(
        Box::new(move || {
            Box::pin(async move {
                std::fs::remove_file(&filepath)?;
                if let Some(thumb) = thumbnail {
                    std::fs::remove_file(thumb)?;
                }
                Ok(())
            })
        }),
        None,
    );
    Ok(())
}

/// Generates a thumbnail under `thumbnail_dir`, named from the full
/// zero-padded photo ID, nested under directories formed by chunking that
/// same ID into 3-character segments (so `000000123456` lives at
/// `000/000/123/000000123456.jpg`), spreading thumbnails across directories
/// so no single directory ends up holding every file. The stored
/// `thumbnail_relpath` is relative to `thumbnail_dir`, not absolute, so the
/// catalog can be relocated without invalidating every thumbnail path.
pub async fn generate_thumbnail(
    pool: &SqlitePool,
    photo: &Photo,
    toolkit: &dyn MediaToolkit,
    thumbnail_dir: &Path,
    id_length: usize,
    max_width: u32,
    max_height: u32,
) -> Result<PathBuf> {
    let padded = IdAllocator::zero_padded(photo.id, id_length);
    let chunks: Vec<&str> = padded
        .as_bytes()
        .chunks(3)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect();

    let dirs = &chunks[..chunks.len().saturating_sub(1)];
    let mut relative_dir = PathBuf::new();
    for dir in dirs {
        relative_dir.push(dir);
    }
    let dest_dir = thumbnail_dir.join(&relative_dir);
    std::fs::create_dir_all(&dest_dir)?;
    let relpath = relative_dir.join(format!("{padded}.jpg"));
    let dest = thumbnail_dir.join(&relpath);

    toolkit.thumbnail(Path::new(&photo.filepath), max_width, max_height, &dest)?;

    let relpath_str = relpath.to_string_lossy().into_owned();
    sqlx::query("UPDATE photos SET thumbnail_relpath = ? WHERE id = ?")
        .bind(&relpath_str)
        .bind(photo.id)
        .execute(pool)
        .await?;

    Ok(dest)
}

pub async fn tag_named(pool: &SqlitePool, name: &str) -> Result<i64> {
    Ok(get_tag(pool, Some(name), None).await?.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ImageToolkit;
    use crate::store::Store;
    use tempfile::TempDir;

    async fn setup() -> SqlitePool {
        Store::open_in_memory().await.unwrap().pool
    }

    #[tokio::test]
    async fn new_photo_rejects_duplicate_path() {
        let pool = setup().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"fake-jpeg-bytes").unwrap();

        new_photo(&pool, &path, None).await.unwrap();
        let err = new_photo(&pool, &path, None).await.unwrap_err();
        assert!(matches!(err, CatalogError::PhotoExists(_)));
    }

    #[tokio::test]
    async fn reload_metadata_computes_digest_and_dimensions() {
        let pool = setup().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        let img = image::RgbImage::from_pixel(10, 5, image::Rgb([1, 2, 3]));
        image::DynamicImage::ImageRgb8(img).save(&path).unwrap();

        let photo = new_photo(&pool, &path, None).await.unwrap();
        reload_metadata(&pool, &photo, &ImageToolkit, 1 << 16).await.unwrap();

        let reloaded = get_photo(&pool, photo.id).await.unwrap();
        assert_eq!(reloaded.width, Some(10));
        assert_eq!(reloaded.height, Some(5));
        assert_eq!(reloaded.area, Some(50));
        assert!(reloaded.sha256.is_some());
    }

    #[tokio::test]
    async fn add_tag_then_remove_tag_round_trips() {
        let pool = setup().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"fake-jpeg-bytes").unwrap();
        let photo = new_photo(&pool, &path, None).await.unwrap();
        crate::tag::new_tag(&pool, &crate::config::TagConfig::default(), "cat", None, None)
            .await
            .unwrap();
        let tag_id = tag_named(&pool, "cat").await.unwrap();

        add_tag(&pool, photo.id, tag_id).await.unwrap();
        assert!(has_tag(&pool, photo.id, tag_id).await.unwrap());

        remove_tag(&pool, photo.id, tag_id).await.unwrap();
        assert!(!has_tag(&pool, photo.id, tag_id).await.unwrap());
    }

    #[tokio::test]
    async fn add_tag_is_noop_when_descendant_already_applied() {
        let pool = setup().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"fake-jpeg-bytes").unwrap();
        let photo = new_photo(&pool, &path, None).await.unwrap();

        let config = crate::config::TagConfig::default();
        let animal = crate::tag::new_tag(&pool, &config, "animal", None, None).await.unwrap();
        let cat = crate::tag::new_tag(&pool, &config, "cat", None, None).await.unwrap();
        crate::tag::add_child(&pool, animal.id, cat.id).await.unwrap();

        add_tag(&pool, photo.id, cat.id).await.unwrap();
        add_tag(&pool, photo.id, animal.id).await.unwrap();

        assert!(has_tag(&pool, photo.id, cat.id).await.unwrap());
        assert!(!has_tag(&pool, photo.id, animal.id).await.unwrap());
    }

    #[tokio::test]
    async fn add_tag_replaces_ancestor_with_more_specific_tag() {
        let pool = setup().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"fake-jpeg-bytes").unwrap();
        let photo = new_photo(&pool, &path, None).await.unwrap();

        let config = crate::config::TagConfig::default();
        let animal = crate::tag::new_tag(&pool, &config, "animal", None, None).await.unwrap();
        let cat = crate::tag::new_tag(&pool, &config, "cat", None, None).await.unwrap();
        crate::tag::add_child(&pool, animal.id, cat.id).await.unwrap();

        add_tag(&pool, photo.id, animal.id).await.unwrap();
        add_tag(&pool, photo.id, cat.id).await.unwrap();

        assert!(has_tag(&pool, photo.id, cat.id).await.unwrap());
        assert!(!has_tag(&pool, photo.id, animal.id).await.unwrap());
    }

    #[tokio::test]
    async fn rename_file_rejects_cross_directory_rename_without_move() {
        let pool = setup().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"fake-jpeg-bytes").unwrap();
        let photo = new_photo(&pool, &path, None).await.unwrap();

        let other_dir = dir.path().join("elsewhere");
        std::fs::create_dir(&other_dir).unwrap();
        let mut txn = TxnManager::new(pool.clone());
        let err = rename_file(&pool, &mut txn, &photo, other_dir.join("a.jpg"), false).await.unwrap_err();
        assert!(matches!(err, CatalogError::CrossDirectoryRename(_)));
    }

    #[tokio::test]
    async fn rename_file_rejects_identical_path() {
        let pool = setup().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"fake-jpeg-bytes").unwrap();
        let photo = new_photo(&pool, &path, None).await.unwrap();

        let mut txn = TxnManager::new(pool.clone());
        let err = rename_file(&pool, &mut txn, &photo, path.clone(), false).await.unwrap_err();
        assert!(matches!(err, CatalogError::IdenticalRenamePath(_)));
    }

    #[tokio::test]
    async fn rename_file_same_directory_links_and_defers_old_removal() {
        let pool = setup().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"fake-jpeg-bytes").unwrap();
        let photo = new_photo(&pool, &path, None).await.unwrap();
        let new_path = dir.path().join("b.jpg");

        let mut txn = TxnManager::new(pool.clone());
        let sp = txn.savepoint().await.unwrap();
        rename_file(&pool, &mut txn, &photo, new_path.clone(), false).await.unwrap();
        assert!(new_path.exists());
        assert!(path.exists(), "old file is only removed once the transaction commits");
        txn.release(&sp).await.unwrap();
        assert!(!path.exists());

        let reloaded = get_photo(&pool, photo.id).await.unwrap();
        assert_eq!(reloaded.filepath, new_path.to_string_lossy());
    }

    #[tokio::test]
    async fn generate_thumbnail_writes_chunked_path() {
        let pool = setup().await;
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.png");
        let img = image::RgbImage::from_pixel(100, 50, image::Rgb([1, 2, 3]));
        image::DynamicImage::ImageRgb8(img).save(&src).unwrap();
        let photo = new_photo(&pool, &src, None).await.unwrap();

        let thumb_dir = dir.path().join("thumbs");
        let dest = generate_thumbnail(&pool, &photo, &ImageToolkit, &thumb_dir, 12, 32, 32)
            .await
            .unwrap();
        assert!(dest.exists());
        assert!(dest.starts_with(&thumb_dir));

        let padded = IdAllocator::zero_padded(photo.id, 12);
        assert!(dest.ends_with(format!("{padded}.jpg")));

        let reloaded = get_photo(&pool, photo.id).await.unwrap();
        let relpath = reloaded.thumbnail_relpath.unwrap();
        assert!(!Path::new(&relpath).is_absolute());
        assert!(relpath.ends_with(&format!("{padded}.jpg")));
    }
}
