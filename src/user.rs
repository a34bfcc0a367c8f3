//! User accounts: registration and password login.
//!
//! Passwords are never stored or compared in plaintext; [`register`] hashes
//! with Argon2 using a random salt and [`login`] verifies against the
//! stored hash. Lookup is exclusive-by-one-of like [`crate::tag::get_tag`]:
//! callers resolve a user by exactly one of `username` or `id`. Usernames are
//! lowercased before storage and before lookup, so `"Alice"` and `"alice"`
//! are the same account.

use crate::config::UserConfig;
use crate::error::{CatalogError, Result};
use crate::id::IdAllocator;
use crate::model::{now, User};
use crate::normalize::{assert_valid_password, normalize_username};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use sqlx::SqlitePool;

pub async fn get_user(pool: &SqlitePool, username: Option<&str>, id: Option<i64>) -> Result<User> {
    match (username, id) {
        (Some(_), Some(_)) => return Err(CatalogError::NotExclusive(vec!["username", "id"])),
        (None, None) => return Err(CatalogError::NotExclusive(vec!["username", "id"])),
        _ => {}
    }

    if let Some(id) = id {
        return sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| CatalogError::NoSuchUser(id.to_string()));
    }

    let lowered = username.unwrap().to_lowercase();
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(&lowered)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CatalogError::NoSuchUser(lowered))
}

fn hash_password(password: &[u8]) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password, &salt)
        .map_err(|e| CatalogError::Io(std::io::Error::other(e.to_string())))?;
    Ok(hash.to_string())
}

fn verify_password(password: &[u8], hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else { return false };
    Argon2::default().verify_password(password, &parsed).is_ok()
}

pub async fn register(
    pool: &SqlitePool,
    config: &UserConfig,
    username: &str,
    password: &[u8],
    display_name: Option<&str>,
) -> Result<User> {
    let normalized = normalize_username(username, config)?;
    assert_valid_password(password, config)?;

    if get_user(pool, Some(&normalized), None).await.is_ok() {
        return Err(CatalogError::UserExists(normalized));
    }

    let id = IdAllocator::next(pool, "users").await?;
    let created = now();
    let password_hash = hash_password(password)?;

    sqlx::query(
        "INSERT INTO users (id, username, password_hash, display_name, created) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&normalized)
    .bind(&password_hash)
    .bind(display_name)
    .bind(created)
    .execute(pool)
    .await?;

    Ok(User {
        id,
        username: normalized,
        password_hash,
        display_name: display_name.map(str::to_string),
        created,
    })
}

/// Verifies `password` against the stored hash for exactly one of
/// `username` or `id`. A wrong username and a wrong password both produce
/// the same [`CatalogError::WrongLogin`] so a caller can't distinguish
/// "no such user" from "bad password" by the error alone.
pub async fn login(
    pool: &SqlitePool,
    username: Option<&str>,
    id: Option<i64>,
    password: &[u8],
) -> Result<User> {
    let user = match get_user(pool, username, id).await {
        Ok(user) => user,
        Err(CatalogError::NoSuchUser(_)) => return Err(CatalogError::WrongLogin),
        Err(other) => return Err(other),
    };

    if verify_password(password, &user.password_hash) {
        Ok(user)
    } else {
        Err(CatalogError::WrongLogin)
    }
}
