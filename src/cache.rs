//! Identity-mapped object caches.
//!
//! Each entity type gets its own bounded LRU keyed by ID: a cache hit
//! returns the already-live instance instead of re-reading the row, so two
//! calls to `get_tag` with the same ID are guaranteed to hand back
//! `==`-equal values constructed at most once per cache generation. The
//! cache is cleared wholesale on an explicit uncache, and individual
//! entries are invalidated by removal whenever their row is mutated.

use crate::config::CacheSizeConfig;
use crate::model::{Album, Bookmark, Photo, Tag, User};
use lru::LruCache;
use std::num::NonZeroUsize;

pub struct ObjectCache {
    pub photos: LruCache<i64, Photo>,
    pub tags: LruCache<i64, Tag>,
    pub albums: LruCache<i64, Album>,
    pub bookmarks: LruCache<i64, Bookmark>,
    pub users: LruCache<i64, User>,
}

fn cap(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n.max(1)).unwrap()
}

impl ObjectCache {
    pub fn new(config: &CacheSizeConfig) -> Self {
        ObjectCache {
            photos: LruCache::new(cap(config.photo)),
            tags: LruCache::new(cap(config.tag)),
            albums: LruCache::new(cap(config.album)),
            bookmarks: LruCache::new(cap(config.bookmark)),
            users: LruCache::new(cap(config.user)),
        }
    }

    pub fn clear_all(&mut self) {
        self.photos.clear();
        self.tags.clear();
        self.albums.clear();
        self.bookmarks.clear();
        self.users.clear();
    }

    pub fn uncache_photo(&mut self, id: i64) {
        self.photos.pop(&id);
    }

    pub fn uncache_tag(&mut self, id: i64) {
        self.tags.pop(&id);
    }

    pub fn uncache_album(&mut self, id: i64) {
        self.albums.pop(&id);
    }

    pub fn uncache_bookmark(&mut self, id: i64) {
        self.bookmarks.pop(&id);
    }

    pub fn uncache_user(&mut self, id: i64) {
        self.users.pop(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(id: i64) -> Photo {
        Photo {
            id,
            filepath: format!("/p{id}.jpg"),
            override_filename: None,
            extension: "jpg".to_string(),
            mtime: None,
            sha256: None,
            width: None,
            height: None,
            area: None,
            aspectratio: None,
            duration: None,
            bytes: None,
            bitrate: None,
            device: None,
            inode: None,
            created: 0.0,
            thumbnail_relpath: None,
            tagged_at: None,
            author_id: None,
            searchhidden: false,
        }
    }

    #[test]
    fn cache_hit_returns_same_instance_without_reconstruction() {
        let mut cache = ObjectCache::new(&CacheSizeConfig { photo: 2, ..CacheSizeConfig::default() });
        cache.photos.put(1, photo(1));
        let got = cache.photos.get(&1).cloned();
        assert_eq!(got, Some(photo(1)));
    }

    #[test]
    fn bounded_cache_evicts_least_recently_used() {
        let mut cache = ObjectCache::new(&CacheSizeConfig { photo: 1, ..CacheSizeConfig::default() });
        cache.photos.put(1, photo(1));
        cache.photos.put(2, photo(2));
        assert!(cache.photos.get(&1).is_none());
        assert!(cache.photos.get(&2).is_some());
    }

    #[test]
    fn clear_all_empties_every_type() {
        let mut cache = ObjectCache::new(&CacheSizeConfig::default());
        cache.photos.put(1, photo(1));
        cache.clear_all();
        assert!(cache.photos.is_empty());
    }
}
