//! The catalog's error taxonomy.
//!
//! Every fallible facade operation returns [`CatalogError`]. Lower-level errors
//! (`sqlx`, `std::io`, `image`) are wrapped into an operational variant rather
//! than leaking their types past the facade boundary, and every variant exposes
//! a stable [`CatalogError::code`] string for callers that map errors onto an
//! external API.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("no such album: {0}")]
    NoSuchAlbum(String),
    #[error("no such bookmark: {0}")]
    NoSuchBookmark(String),
    #[error("no such group member: {0}")]
    NoSuchGroup(String),
    #[error("no such photo: {0}")]
    NoSuchPhoto(String),
    #[error("no such synonym: {0}")]
    NoSuchSynonym(String),
    #[error("no such tag: {0}")]
    NoSuchTag(String),
    #[error("no such user: {0}")]
    NoSuchUser(String),

    #[error("group already exists for member {0}")]
    GroupExists(String),
    #[error("photo already exists: {0}")]
    PhotoExists(String),
    #[error("tag already exists: {0}")]
    TagExists(String),
    #[error("user already exists: {0}")]
    UserExists(String),

    #[error("tag name '{0}' is shorter than the configured minimum")]
    TagTooShort(String),
    #[error("tag name '{0}' is longer than the configured maximum")]
    TagTooLong(String),
    #[error("a tag cannot be a synonym of itself: {0}")]
    CantSynonymSelf(String),
    #[error("grouping {member} under {parent} would create a cycle")]
    RecursiveGrouping { parent: String, member: String },
    #[error("username '{0}' contains characters outside the configured whitelist")]
    InvalidUsernameChars(String),
    #[error("username '{0}' is shorter than the configured minimum")]
    UsernameTooShort(String),
    #[error("username '{0}' is longer than the configured maximum")]
    UsernameTooLong(String),
    #[error("password is shorter than the configured minimum")]
    PasswordTooShort,
    #[error("range is out of order: low {low} > high {high}")]
    OutOfOrder { low: String, high: String },
    #[error("arguments {0:?} are mutually exclusive; exactly one must be given")]
    NotExclusive(Vec<&'static str>),
    #[error("search must yield at least one of albums or photos")]
    NoYields,
    #[error("rename to '{0}' crosses directories; pass move=true to allow it")]
    CrossDirectoryRename(String),
    #[error("rename target '{0}' is identical to the current path")]
    IdenticalRenamePath(String),

    #[error("incorrect username or password")]
    WrongLogin,

    #[error("feature '{0}' is disabled by configuration")]
    FeatureDisabled(String),
    #[error("database is out of date: found version {found}, expected {expected}")]
    DatabaseOutOfDate { found: i64, expected: i64 },
    #[error("unknown table: {0}")]
    BadTable(String),

    #[error("database operation failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("image decoding failed: {0}")]
    Image(#[from] image::ImageError),
}

impl CatalogError {
    /// Stable SCREAMING_SNAKE_CASE identifier for API mapping.
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::NoSuchAlbum(_) => "NO_SUCH_ALBUM",
            CatalogError::NoSuchBookmark(_) => "NO_SUCH_BOOKMARK",
            CatalogError::NoSuchGroup(_) => "NO_SUCH_GROUP",
            CatalogError::NoSuchPhoto(_) => "NO_SUCH_PHOTO",
            CatalogError::NoSuchSynonym(_) => "NO_SUCH_SYNONYM",
            CatalogError::NoSuchTag(_) => "NO_SUCH_TAG",
            CatalogError::NoSuchUser(_) => "NO_SUCH_USER",
            CatalogError::GroupExists(_) => "GROUP_EXISTS",
            CatalogError::PhotoExists(_) => "PHOTO_EXISTS",
            CatalogError::TagExists(_) => "TAG_EXISTS",
            CatalogError::UserExists(_) => "USER_EXISTS",
            CatalogError::TagTooShort(_) => "TAG_TOO_SHORT",
            CatalogError::TagTooLong(_) => "TAG_TOO_LONG",
            CatalogError::CantSynonymSelf(_) => "CANT_SYNONYM_SELF",
            CatalogError::RecursiveGrouping { .. } => "RECURSIVE_GROUPING",
            CatalogError::InvalidUsernameChars(_) => "INVALID_USERNAME_CHARS",
            CatalogError::UsernameTooShort(_) => "USERNAME_TOO_SHORT",
            CatalogError::UsernameTooLong(_) => "USERNAME_TOO_LONG",
            CatalogError::PasswordTooShort => "PASSWORD_TOO_SHORT",
            CatalogError::OutOfOrder { .. } => "OUT_OF_ORDER",
            CatalogError::NotExclusive(_) => "NOT_EXCLUSIVE",
            CatalogError::NoYields => "NO_YIELDS",
            CatalogError::CrossDirectoryRename(_) => "CROSS_DIRECTORY_RENAME",
            CatalogError::IdenticalRenamePath(_) => "IDENTICAL_RENAME_PATH",
            CatalogError::WrongLogin => "WRONG_LOGIN",
            CatalogError::FeatureDisabled(_) => "FEATURE_DISABLED",
            CatalogError::DatabaseOutOfDate { .. } => "DATABASE_OUT_OF_DATE",
            CatalogError::BadTable(_) => "BAD_TABLE",
            CatalogError::Database(_) => "DATABASE_ERROR",
            CatalogError::Io(_) => "IO_ERROR",
            CatalogError::Image(_) => "IMAGE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_stable_for_not_found_variants() {
        assert_eq!(CatalogError::NoSuchTag("x".into()).code(), "NO_SUCH_TAG");
        assert_eq!(CatalogError::TagExists("x".into()).code(), "TAG_EXISTS");
    }

    #[test]
    fn not_exclusive_lists_offending_args() {
        let err = CatalogError::NotExclusive(vec!["name", "id"]);
        assert!(err.to_string().contains("name"));
    }
}
