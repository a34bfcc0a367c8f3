//! Plain row-backed entity structs.
//!
//! These mirror the columns described by the catalog's data model: a
//! [`Photo`] with derived metadata, a [`Tag`] that participates in a
//! hierarchy and may have synonyms, an [`Album`] collecting photos, a
//! [`Bookmark`], and a [`User`]. None of them carry behavior beyond simple
//! derived getters; the engines in [`crate::tag`], [`crate::album`],
//! [`crate::photo`] and [`crate::user`] own the read/write logic.

use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Photo {
    pub id: i64,
    pub filepath: String,
    pub override_filename: Option<String>,
    pub extension: String,
    pub mtime: Option<f64>,
    pub sha256: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub area: Option<i64>,
    pub aspectratio: Option<f64>,
    pub duration: Option<f64>,
    pub bytes: Option<i64>,
    pub bitrate: Option<f64>,
    pub device: Option<i64>,
    pub inode: Option<i64>,
    pub created: f64,
    pub thumbnail_relpath: Option<String>,
    pub tagged_at: Option<f64>,
    pub author_id: Option<i64>,
    pub searchhidden: bool,
}

impl Photo {
    /// The display name: `override_filename` if set, else the filesystem
    /// basename of `filepath`.
    pub fn basename(&self) -> String {
        if let Some(name) = &self.override_filename {
            return name.clone();
        }
        std::path::Path::new(&self.filepath)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.filepath.clone())
    }

    /// The coarse mime class (`image`, `video`, `audio`, ...) derived from
    /// the extension via a small built-in table, used by search's `mimetype`
    /// filter.
    pub fn simple_mimetype(&self) -> Option<&'static str> {
        match self.extension.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "tif" | "tiff" | "heic" => {
                Some("image")
            }
            "mp4" | "mkv" | "webm" | "mov" | "avi" | "m4v" => Some("video"),
            "mp3" | "flac" | "wav" | "ogg" | "m4a" | "opus" => Some("audio"),
            "" => None,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created: f64,
    pub author_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Album {
    pub id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created: f64,
    pub thumbnail_photo: Option<i64>,
    pub author_id: Option<i64>,
}

impl Album {
    pub fn display_name(&self) -> String {
        match &self.title {
            Some(title) if !title.is_empty() => title.clone(),
            _ => format!("Album {}", self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Bookmark {
    pub id: i64,
    pub title: Option<String>,
    pub url: String,
    pub created: f64,
    pub author_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub created: f64,
}

/// A collector for non-fatal issues encountered during normalization or
/// search. Passing one in switches a caller from "raise on first problem"
/// to "collect and keep going."
#[derive(Debug, Default)]
pub struct WarningBag {
    pub warnings: Vec<String>,
}

impl WarningBag {
    pub fn new() -> Self {
        WarningBag::default()
    }

    pub fn add(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}

pub(crate) fn now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
