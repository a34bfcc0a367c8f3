//! Directory ingestion: walking a tree, registering new photos, detecting
//! renames, and materializing albums from the directory structure.
//!
//! A file is matched to an existing photo row first by path, then — if the
//! path isn't known but its live `(device, inode)` matches a row whose
//! recorded path no longer exists — treated as a rename rather than a new
//! photo. `device`/`inode` are captured at photo-registration time
//! (see [`crate::photo::new_photo`]) so relocating a file outside the
//! catalog doesn't orphan its tags.

use crate::album;
use crate::config::Config;
use crate::error::Result;
use crate::model::Photo;
use crate::photo;
use lexical_sort::natural_lexical_cmp;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Either a freshly registered photo or one recovered from a rename.
pub enum Ingested {
    New(Photo),
    Existing(Photo),
    Moved(Photo),
}

impl Ingested {
    pub fn into_photo(self) -> Photo {
        match self {
            Ingested::New(p) | Ingested::Existing(p) | Ingested::Moved(p) => p,
        }
    }
}

pub async fn create_or_fetch_photo(pool: &SqlitePool, path: &Path) -> Result<Ingested> {
    let path_str = path.to_string_lossy().into_owned();
    if let Some(existing) = photo::get_photo_by_path(pool, &path_str).await? {
        return Ok(Ingested::Existing(existing));
    }

    let metadata = std::fs::metadata(path)?;
    let (device, inode) = photo::file_identity(&metadata);
    let size = metadata.len() as i64;

    // Orphaned rows (whose recorded path no longer exists) are the only
    // candidates for a rename; every live path is already excluded by the
    // lookup above. A large catalog with many simultaneous moves pays for a
    // full scan here. `bytes` is compared too since the filesystem can reuse
    // a `(device, inode)` pair once the original file is deleted; without
    // the size check a coincidental inode reuse would misattribute an
    // unrelated file as a rename of the old photo.
    let candidates: Vec<Photo> = sqlx::query_as(
        "SELECT * FROM photos WHERE device = ? AND inode = ? AND bytes = ?",
    )
    .bind(device)
    .bind(inode)
    .bind(size)
    .fetch_all(pool)
    .await?;

    for candidate in candidates {
        if Path::new(&candidate.filepath).exists() {
            continue;
        }
        sqlx::query("UPDATE photos SET filepath = ? WHERE id = ?")
            .bind(&path_str)
            .bind(candidate.id)
            .execute(pool)
            .await?;
        return Ok(Ingested::Moved(photo::get_photo(pool, candidate.id).await?));
    }

    Ok(Ingested::New(photo::new_photo(pool, path, None).await?))
}

fn is_excluded(entry_name: &str, exclude_list: &[String]) -> bool {
    exclude_list.iter().any(|ex| ex.eq_ignore_ascii_case(entry_name))
}

/// Walks `root` depth-first in natural (case-insensitive) order, skipping
/// excluded files/directories, registering or recovering a photo for every
/// non-excluded regular file, and materializing one album per directory —
/// attaching each directory's album under its parent directory's album so
/// the result mirrors the filesystem tree.
pub async fn digest_directory(pool: &SqlitePool, config: &Config, root: &Path) -> Result<Vec<Photo>> {
    let mut photos = Vec::new();
    let mut visited_dirs: HashSet<PathBuf> = HashSet::new();
    digest_recursive(pool, config, root, None, &mut photos, &mut visited_dirs).await?;
    Ok(photos)
}

fn digest_recursive<'a>(
    pool: &'a SqlitePool,
    config: &'a Config,
    dir: &'a Path,
    parent_album: Option<i64>,
    photos: &'a mut Vec<Photo>,
    visited_dirs: &'a mut HashSet<PathBuf>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + 'a>> {
    Box::pin(async move {
        if !visited_dirs.insert(dir.to_path_buf()) {
            return Ok(());
        }

        let directory_key = dir.to_string_lossy().into_owned();
        let album_id = match album::album_for_directory(pool, &directory_key).await? {
            Some(id) => id,
            None => {
                let title = dir.file_name().map(|n| n.to_string_lossy().into_owned());
                let created = album::new_album(pool, title.as_deref(), None, None).await?;
                album::associate_directory(pool, created.id, &directory_key).await?;
                created.id
            }
        };
        if let Some(parent) = parent_album {
            let _ = album::add_child(pool, parent, album_id).await;
        }

        let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
        entries.sort_by(|a, b| {
            natural_lexical_cmp(&a.file_name().to_string_lossy(), &b.file_name().to_string_lossy())
        });

        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                if is_excluded(&name, &config.digest_exclude_dirs) {
                    continue;
                }
                digest_recursive(pool, config, &path, Some(album_id), photos, visited_dirs).await?;
            } else if file_type.is_file() {
                if is_excluded(&name, &config.digest_exclude_files) {
                    continue;
                }
                let ingested = create_or_fetch_photo(pool, &path).await?;
                let photo = ingested.into_photo();
                album::add_photo(pool, album_id, photo.id).await?;
                photos.push(photo);
            }
        }

        Ok(())
    })
}
