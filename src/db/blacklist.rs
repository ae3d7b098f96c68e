//! Blacklisted release records and retry counting.

use crate::error::DatabaseError;
use crate::types::MediaRef;
use crate::{Error, Result};

use super::{BlacklistEntry, Database, NewBlacklistEntry};

impl Database {
    /// Insert a blacklist entry (append-only)
    pub async fn insert_blacklist(&self, entry: &NewBlacklistEntry) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO blacklist (
                release_guid, indexer, media_kind, media_id,
                reason, failure_type, expires_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.release_guid)
        .bind(&entry.indexer)
        .bind(entry.media.kind_code())
        .bind(entry.media.media_id())
        .bind(&entry.reason)
        .bind(entry.failure_type)
        .bind(entry.expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert blacklist entry: {}",
                e
            )))
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Whether a release is currently blacklisted, keyed by (guid, indexer)
    pub async fn is_release_blacklisted(
        &self,
        guid: &str,
        indexer: Option<&str>,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM blacklist
            WHERE release_guid = ?
              AND (indexer IS ? OR indexer = ?)
              AND expires_at > ?
            "#,
        )
        .bind(guid)
        .bind(indexer)
        .bind(indexer)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to query blacklist: {}",
                e
            )))
        })?;

        Ok(count > 0)
    }

    /// Count non-expired blacklist entries for a media reference
    ///
    /// This is the automatic-retry budget: each blacklisted failure adds one
    /// entry, and the search trigger stops once the count reaches the ceiling.
    pub async fn count_blacklist_for_media(&self, media: &MediaRef) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM blacklist
            WHERE media_kind = ? AND media_id = ? AND expires_at > ?
            "#,
        )
        .bind(media.kind_code())
        .bind(media.media_id())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count blacklist entries: {}",
                e
            )))
        })?;

        Ok(count)
    }

    /// List blacklist entries for a media reference, newest first
    pub async fn list_blacklist_for_media(&self, media: &MediaRef) -> Result<Vec<BlacklistEntry>> {
        let rows = sqlx::query_as::<_, BlacklistEntry>(
            r#"
            SELECT id, release_guid, indexer, media_kind, media_id,
                   reason, failure_type, expires_at, created_at
            FROM blacklist
            WHERE media_kind = ? AND media_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(media.kind_code())
        .bind(media.media_id())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list blacklist entries: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Delete expired blacklist entries; returns the number removed
    pub async fn prune_expired_blacklist(&self) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query("DELETE FROM blacklist WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to prune blacklist: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }
}
