//! `PhotoDb`: the single entry point tying the store, transaction manager,
//! object cache, configuration, and media toolkit together.
//!
//! Every public method here borrows the same underlying pool and applies
//! the relevant `enable_feature` check before delegating to the focused
//! `tag`/`album`/`photo`/`user`/`search`/`ingest` modules, which a caller
//! could use directly but normally doesn't — this keeps one object as the
//! thing callers hold, while the actual logic stays split across modules
//! instead of living in one file.

use crate::album;
use crate::bookmark;
use crate::cache::ObjectCache;
use crate::config::Config;
use crate::error::Result;
use crate::ingest;
use crate::media::MediaToolkit;
use crate::model::{Album, Bookmark, Photo, Tag, User, WarningBag};
use crate::photo;
use crate::search::{self, SearchParams, SearchResult};
use crate::store::Store;
use crate::tag;
use crate::txn::TxnManager;
use crate::user;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::Mutex as AsyncMutex;

pub struct PhotoDb {
    data_dir: PathBuf,
    config: Config,
    txn: AsyncMutex<TxnManager>,
    cache: Mutex<ObjectCache>,
    toolkit: Box<dyn MediaToolkit>,
}

impl PhotoDb {
    pub async fn open(data_dir: &Path, toolkit: Box<dyn MediaToolkit>) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let config = Config::load(data_dir)?;
        let store = Store::open(&data_dir.join("catalog.db")).await?;
        let cache = ObjectCache::new(&config.cache_size);
        Ok(PhotoDb {
            data_dir: data_dir.to_path_buf(),
            config,
            txn: AsyncMutex::new(TxnManager::new(store.pool)),
            cache: Mutex::new(cache),
            toolkit,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn thumbnail_dir(&self) -> PathBuf {
        self.data_dir.join("thumbnails")
    }

    /// Runs `body` inside a savepoint, committing on `Ok` and rolling back
    /// on `Err`. Nested calls compose correctly: only the outermost one
    /// actually issues `COMMIT`/`ROLLBACK` against the database (see
    /// [`crate::txn::TxnManager`]).
    pub async fn with_transaction<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let sp = self.txn.lock().await.savepoint().await?;
        match body().await {
            Ok(value) => {
                self.txn.lock().await.release(&sp).await?;
                Ok(value)
            }
            Err(e) => {
                self.txn.lock().await.rollback(Some(&sp)).await?;
                Err(e)
            }
        }
    }

    async fn pool(&self) -> sqlx::SqlitePool {
        self.txn.lock().await.pool().clone()
    }

    // ---- tags ----

    pub async fn get_tag(&self, name: Option<&str>, id: Option<i64>) -> Result<Tag> {
        if let Some(id) = id {
            if let Some(hit) = self.cache.lock().unwrap().tags.get(&id).cloned() {
                return Ok(hit);
            }
        }
        let tag = tag::get_tag(&self.pool().await, name, id).await?;
        self.cache.lock().unwrap().tags.put(tag.id, tag.clone());
        Ok(tag)
    }

    pub async fn new_tag(&self, name: &str, description: Option<&str>, author_id: Option<i64>) -> Result<Tag> {
        self.config.required_feature("tag.new")?;
        tag::new_tag(&self.pool().await, &self.config.tag, name, description, author_id).await
    }

    pub async fn add_tag_child(&self, parent_id: i64, member_id: i64) -> Result<()> {
        self.config.required_feature("tag.edit")?;
        tag::add_child(&self.pool().await, parent_id, member_id).await
    }

    pub async fn remove_tag_child(&self, parent_id: i64, member_id: i64) -> Result<()> {
        self.config.required_feature("tag.edit")?;
        tag::remove_child(&self.pool().await, parent_id, member_id).await
    }

    pub async fn add_synonym(&self, master: &Tag, synname: &str) -> Result<()> {
        self.config.required_feature("tag.edit")?;
        tag::add_synonym(&self.pool().await, &self.config.tag, master, synname).await
    }

    pub async fn remove_synonym(&self, master_name: &str, synname: &str) -> Result<()> {
        self.config.required_feature("tag.edit")?;
        tag::remove_synonym(&self.pool().await, master_name, synname).await
    }

    pub async fn convert_to_synonym(&self, old: &Tag, new: &Tag) -> Result<()> {
        self.config.required_feature("tag.edit")?;
        let result = tag::convert_to_synonym(&self.pool().await, old, new).await;
        self.cache.lock().unwrap().uncache_tag(old.id);
        result
    }

    pub async fn rename_tag(&self, t: &Tag, new_name: &str, apply_to_synonyms: bool) -> Result<()> {
        self.config.required_feature("tag.edit")?;
        let result = tag::rename(&self.pool().await, &self.config.tag, t, new_name, apply_to_synonyms).await;
        self.cache.lock().unwrap().uncache_tag(t.id);
        result
    }

    pub async fn delete_tag(&self, t: &Tag, delete_children: bool) -> Result<()> {
        self.config.required_feature("tag.edit")?;
        let result = tag::delete(&self.pool().await, t, delete_children).await;
        self.cache.lock().unwrap().uncache_tag(t.id);
        result
    }

    pub async fn easybake(&self, expression: &str) -> Result<Vec<(String, String)>> {
        self.config.required_feature("tag.new")?;
        tag::easybake(&self.pool().await, &self.config.tag, expression).await
    }

    // ---- albums ----

    pub async fn get_album(&self, id: i64) -> Result<Album> {
        if let Some(hit) = self.cache.lock().unwrap().albums.get(&id).cloned() {
            return Ok(hit);
        }
        let album = album::get_album(&self.pool().await, id).await?;
        self.cache.lock().unwrap().albums.put(album.id, album.clone());
        Ok(album)
    }

    pub async fn new_album(&self, title: Option<&str>, description: Option<&str>, author_id: Option<i64>) -> Result<Album> {
        self.config.required_feature("album.new")?;
        album::new_album(&self.pool().await, title, description, author_id).await
    }

    pub async fn edit_album(&self, a: &Album, title: Option<&str>, description: Option<&str>) -> Result<()> {
        self.config.required_feature("album.edit")?;
        let result = album::edit(&self.pool().await, a, title, description).await;
        self.cache.lock().unwrap().uncache_album(a.id);
        result
    }

    pub async fn add_album_child(&self, parent_id: i64, member_id: i64) -> Result<()> {
        self.config.required_feature("album.edit")?;
        album::add_child(&self.pool().await, parent_id, member_id).await
    }

    pub async fn remove_album_child(&self, parent_id: i64, member_id: i64) -> Result<()> {
        self.config.required_feature("album.edit")?;
        album::remove_child(&self.pool().await, parent_id, member_id).await
    }

    pub async fn add_photo_to_album(&self, album_id: i64, photo_id: i64) -> Result<()> {
        self.config.required_feature("album.edit")?;
        album::add_photo(&self.pool().await, album_id, photo_id).await
    }

    pub async fn remove_photo_from_album(&self, album_id: i64, photo_id: i64) -> Result<()> {
        self.config.required_feature("album.edit")?;
        album::remove_photo(&self.pool().await, album_id, photo_id).await
    }

    pub async fn add_tag_to_album(&self, album_id: i64, tag_id: i64) -> Result<()> {
        self.config.required_feature("album.edit")?;
        album::add_tag_to_all(&self.pool().await, album_id, tag_id).await
    }

    pub async fn walk_album_photos(&self, album_id: i64) -> Result<Vec<i64>> {
        album::walk_photos(&self.pool().await, album_id).await
    }

    pub async fn delete_album(&self, a: &Album, delete_children: bool) -> Result<()> {
        self.config.required_feature("album.edit")?;
        let result = album::delete(&self.pool().await, a, delete_children).await;
        self.cache.lock().unwrap().uncache_album(a.id);
        result
    }

    pub async fn album_sum_bytes(&self, album_id: i64) -> Result<i64> {
        album::sum_bytes(&self.pool().await, album_id).await
    }

    pub async fn album_sum_photos(&self, album_id: i64) -> Result<usize> {
        album::sum_photos(&self.pool().await, album_id).await
    }

    // ---- bookmarks ----

    pub async fn get_bookmark(&self, id: i64) -> Result<Bookmark> {
        if let Some(hit) = self.cache.lock().unwrap().bookmarks.get(&id).cloned() {
            return Ok(hit);
        }
        let bookmark = bookmark::get_bookmark(&self.pool().await, id).await?;
        self.cache.lock().unwrap().bookmarks.put(bookmark.id, bookmark.clone());
        Ok(bookmark)
    }

    pub async fn new_bookmark(&self, title: Option<&str>, url: &str, author_id: Option<i64>) -> Result<Bookmark> {
        self.config.required_feature("bookmark.new")?;
        bookmark::new_bookmark(&self.pool().await, title, url, author_id).await
    }

    pub async fn edit_bookmark(&self, b: &Bookmark, title: Option<&str>, url: Option<&str>) -> Result<()> {
        self.config.required_feature("bookmark.edit")?;
        let result = bookmark::edit(&self.pool().await, b, title, url).await;
        self.cache.lock().unwrap().uncache_bookmark(b.id);
        result
    }

    pub async fn delete_bookmark(&self, id: i64) -> Result<()> {
        self.config.required_feature("bookmark.edit")?;
        let result = bookmark::delete(&self.pool().await, id).await;
        self.cache.lock().unwrap().uncache_bookmark(id);
        result
    }

    // ---- photos ----

    pub async fn get_photo(&self, id: i64) -> Result<Photo> {
        if let Some(hit) = self.cache.lock().unwrap().photos.get(&id).cloned() {
            return Ok(hit);
        }
        let photo = photo::get_photo(&self.pool().await, id).await?;
        self.cache.lock().unwrap().photos.put(photo.id, photo.clone());
        Ok(photo)
    }

    pub async fn get_photo_by_path(&self, filepath: &str) -> Result<Option<Photo>> {
        photo::get_photo_by_path(&self.pool().await, filepath).await
    }

    pub async fn new_photo(&self, filepath: &Path, author_id: Option<i64>) -> Result<Photo> {
        self.config.required_feature("photo.new")?;
        photo::new_photo(&self.pool().await, filepath, author_id).await
    }

    pub async fn reload_metadata(&self, p: &Photo) -> Result<()> {
        self.config.required_feature("photo.reload_metadata")?;
        let result =
            photo::reload_metadata(&self.pool().await, p, self.toolkit.as_ref(), self.config.file_read_chunk).await;
        self.cache.lock().unwrap().uncache_photo(p.id);
        result
    }

    pub async fn add_tag_to_photo(&self, photo_id: i64, tag_id: i64) -> Result<()> {
        self.config.required_feature("photo.add_remove_tag")?;
        let result = photo::add_tag(&self.pool().await, photo_id, tag_id).await;
        self.cache.lock().unwrap().uncache_photo(photo_id);
        result
    }

    pub async fn remove_tag_from_photo(&self, photo_id: i64, tag_id: i64) -> Result<()> {
        self.config.required_feature("photo.add_remove_tag")?;
        let result = photo::remove_tag(&self.pool().await, photo_id, tag_id).await;
        self.cache.lock().unwrap().uncache_photo(photo_id);
        result
    }

    pub async fn set_searchhidden(&self, photo_id: i64, hidden: bool) -> Result<()> {
        self.config.required_feature("photo.edit")?;
        let result = photo::set_searchhidden(&self.pool().await, photo_id, hidden).await;
        self.cache.lock().unwrap().uncache_photo(photo_id);
        result
    }

    pub async fn rename_photo_file(&self, p: &Photo, new_path: PathBuf, move_file: bool) -> Result<()> {
        self.config.required_feature("photo.edit")?;
        let pool = self.pool().await;
        let mut txn = self.txn.lock().await;
        let result = photo::rename_file(&pool, &mut txn, p, new_path, move_file).await;
        self.cache.lock().unwrap().uncache_photo(p.id);
        result
    }

    pub async fn delete_photo(&self, p: &Photo) -> Result<()> {
        self.config.required_feature("photo.edit")?;
        let pool = self.pool().await;
        let mut txn = self.txn.lock().await;
        let result = photo::delete(&pool, &mut txn, p).await;
        self.cache.lock().unwrap().uncache_photo(p.id);
        result
    }

    pub async fn generate_thumbnail(&self, p: &Photo) -> Result<PathBuf> {
        self.config.required_feature("photo.generate_thumbnail")?;
        let result = photo::generate_thumbnail(
            &self.pool().await,
            p,
            self.toolkit.as_ref(),
            &self.thumbnail_dir(),
            self.config.id_length,
            self.config.thumbnail_width,
            self.config.thumbnail_height,
        )
        .await;
        self.cache.lock().unwrap().uncache_photo(p.id);
        result
    }

    // ---- users ----

    pub async fn get_user(&self, username: Option<&str>, id: Option<i64>) -> Result<User> {
        if let Some(id) = id {
            if let Some(hit) = self.cache.lock().unwrap().users.get(&id).cloned() {
                return Ok(hit);
            }
        }
        let user = user::get_user(&self.pool().await, username, id).await?;
        self.cache.lock().unwrap().users.put(user.id, user.clone());
        Ok(user)
    }

    pub async fn register_user(&self, username: &str, password: &[u8], display_name: Option<&str>) -> Result<User> {
        self.config.required_feature("user.new")?;
        user::register(&self.pool().await, &self.config.user, username, password, display_name).await
    }

    pub async fn login(&self, username: Option<&str>, id: Option<i64>, password: &[u8]) -> Result<User> {
        self.config.required_feature("user.login")?;
        user::login(&self.pool().await, username, id, password).await
    }

    // ---- search and ingest ----

    pub async fn search(&self, params: &SearchParams) -> Result<SearchResult> {
        let flat = tag::flat_descendants(&self.pool().await).await?;
        search::search(&self.pool().await, &flat, params).await
    }

    pub async fn digest_directory(&self, root: &Path) -> Result<Vec<Photo>> {
        ingest::digest_directory(&self.pool().await, &self.config, root).await
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear_all();
    }

    pub fn warn(&self, bag: &WarningBag) {
        for warning in &bag.warnings {
            tracing::warn!(%warning, "search warning");
        }
    }
}
