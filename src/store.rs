//! The embedded relational store.
//!
//! `Store` wraps a `sqlx` SQLite pool against a single data directory. On
//! open it enables `foreign_keys` and `journal_mode=WAL`, then checks the
//! `user_version` pragma against [`DATABASE_VERSION`]: a mismatch on an
//! existing database fails with [`CatalogError::DatabaseOutOfDate`], while a
//! fresh (`user_version == 0`) database gets the full schema applied and the
//! version pragma set in one go. There is no migration runner; schema
//! evolution is out of scope for this crate.

use crate::error::{CatalogError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

pub const DATABASE_VERSION: i64 = 1;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS id_numbers (
        tab TEXT PRIMARY KEY,
        last_id INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        display_name TEXT,
        created REAL NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        created REAL NOT NULL,
        author_id INTEGER REFERENCES users(id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS tag_synonyms (
        name TEXT PRIMARY KEY,
        mastername TEXT NOT NULL REFERENCES tags(name)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS tag_group_rel (
        parentid INTEGER NOT NULL REFERENCES tags(id),
        memberid INTEGER NOT NULL UNIQUE REFERENCES tags(id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS albums (
        id INTEGER PRIMARY KEY,
        title TEXT,
        description TEXT,
        created REAL NOT NULL,
        thumbnail_photo INTEGER,
        author_id INTEGER REFERENCES users(id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS album_associated_directories (
        albumid INTEGER NOT NULL REFERENCES albums(id),
        directory TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS album_group_rel (
        parentid INTEGER NOT NULL REFERENCES albums(id),
        memberid INTEGER NOT NULL UNIQUE REFERENCES albums(id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS photos (
        id INTEGER PRIMARY KEY,
        filepath TEXT NOT NULL UNIQUE,
        override_filename TEXT,
        extension TEXT NOT NULL,
        mtime REAL,
        sha256 TEXT,
        width INTEGER,
        height INTEGER,
        area INTEGER,
        aspectratio REAL,
        duration REAL,
        bytes INTEGER,
        bitrate REAL,
        device INTEGER,
        inode INTEGER,
        created REAL NOT NULL,
        thumbnail_relpath TEXT,
        tagged_at REAL,
        author_id INTEGER REFERENCES users(id),
        searchhidden INTEGER NOT NULL DEFAULT 0
    )"#,
    r#"CREATE TABLE IF NOT EXISTS album_photo_rel (
        albumid INTEGER NOT NULL REFERENCES albums(id),
        photoid INTEGER NOT NULL REFERENCES photos(id),
        UNIQUE(albumid, photoid)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS photo_tag_rel (
        photoid INTEGER NOT NULL REFERENCES photos(id),
        tagid INTEGER NOT NULL REFERENCES tags(id),
        UNIQUE(photoid, tagid)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS index_photo_tag_rel_photoid_tagid
        ON photo_tag_rel(photoid, tagid)"#,
    r#"CREATE TABLE IF NOT EXISTS bookmarks (
        id INTEGER PRIMARY KEY,
        title TEXT,
        url TEXT NOT NULL,
        created REAL NOT NULL,
        author_id INTEGER REFERENCES users(id)
    )"#,
];

/// Opens (and, on first use, creates) the SQLite database at `path`.
pub struct Store {
    pub pool: SqlitePool,
}

impl Store {
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

        let store = Store { pool };
        store.check_or_apply_schema().await?;
        Ok(store)
    }

    /// In-memory store for unit tests: same schema, no file on disk.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
        let store = Store { pool };
        store.check_or_apply_schema().await?;
        Ok(store)
    }

    async fn check_or_apply_schema(&self) -> Result<()> {
        let row = sqlx::query("PRAGMA user_version").fetch_one(&self.pool).await?;
        let version: i64 = row.try_get(0)?;

        if version == 0 {
            for statement in SCHEMA {
                sqlx::query(statement).execute(&self.pool).await?;
            }
            sqlx::query(&format!("PRAGMA user_version = {DATABASE_VERSION}"))
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        if version != DATABASE_VERSION {
            return Err(CatalogError::DatabaseOutOfDate {
                found: version,
                expected: DATABASE_VERSION,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_applies_schema_once() {
        let store = Store::open_in_memory().await.unwrap();
        let row = sqlx::query("PRAGMA user_version")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        let version: i64 = row.try_get(0).unwrap();
        assert_eq!(version, DATABASE_VERSION);
    }

    #[tokio::test]
    async fn photo_tag_rel_has_composite_index() {
        let store = Store::open_in_memory().await.unwrap();
        let rows = sqlx::query("PRAGMA index_list(photo_tag_rel)")
            .fetch_all(&store.pool)
            .await
            .unwrap();
        assert!(!rows.is_empty());
    }
}
