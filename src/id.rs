//! Monotonic per-table integer IDs backed by the `id_numbers` table.

use crate::error::Result;
use sqlx::SqlitePool;

pub struct IdAllocator;

impl IdAllocator {
    /// Reads the `id_numbers` row for `table`, increments it by one (or
    /// inserts a fresh row starting at 1), and returns the new value, all
    /// inside the caller's transaction.
    pub async fn next(pool: &SqlitePool, table: &str) -> Result<i64> {
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT last_id FROM id_numbers WHERE tab = ?")
                .bind(table)
                .fetch_optional(pool)
                .await?;

        let next_id = existing.unwrap_or(0) + 1;

        if existing.is_some() {
            sqlx::query("UPDATE id_numbers SET last_id = ? WHERE tab = ?")
                .bind(next_id)
                .bind(table)
                .execute(pool)
                .await?;
        } else {
            sqlx::query("INSERT INTO id_numbers (tab, last_id) VALUES (?, ?)")
                .bind(table)
                .bind(next_id)
                .execute(pool)
                .await?;
        }

        Ok(next_id)
    }

    /// Zero-pads `id` to `id_length` digits for display purposes (storage
    /// remains a plain integer).
    pub fn zero_padded(id: i64, id_length: usize) -> String {
        format!("{id:0width$}", width = id_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn next_increments_across_calls() {
        let store = Store::open_in_memory().await.unwrap();
        let a = IdAllocator::next(&store.pool, "photos").await.unwrap();
        let b = IdAllocator::next(&store.pool, "photos").await.unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[tokio::test]
    async fn next_is_independent_per_table() {
        let store = Store::open_in_memory().await.unwrap();
        let photo_id = IdAllocator::next(&store.pool, "photos").await.unwrap();
        let tag_id = IdAllocator::next(&store.pool, "tags").await.unwrap();
        assert_eq!(photo_id, 1);
        assert_eq!(tag_id, 1);
    }

    #[test]
    fn zero_padded_formats_with_configured_width() {
        assert_eq!(IdAllocator::zero_padded(123456, 12), "000000123456");
    }
}
