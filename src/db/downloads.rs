//! Download lifecycle CRUD and guarded status transitions.

use crate::error::DatabaseError;
use crate::types::{DownloadId, MediaRef, Status};
use crate::{Error, Result};

use super::{Database, Download, NewDownload};

const SELECT_COLUMNS: &str = r#"
    id, media_kind, media_id, tv_show_id, client_id, external_id,
    status, progress, size_bytes, remaining_bytes, eta_seconds,
    output_path, error_message,
    release_guid, release_title, release_url, release_size, release_indexer,
    created_at, started_at, completed_at
"#;

impl Database {
    /// Insert a new download record with status `Queued`
    ///
    /// Fails with a constraint violation when another non-terminal download
    /// exists for the same media reference (partial unique index).
    pub async fn insert_download(&self, download: &NewDownload) -> Result<DownloadId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO downloads (
                media_kind, media_id, tv_show_id, client_id,
                status, progress, size_bytes,
                release_guid, release_title, release_url, release_size, release_indexer,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(download.media.kind_code())
        .bind(download.media.media_id())
        .bind(download.media.tv_show_id())
        .bind(download.client_id)
        .bind(Status::Queued.to_i32())
        .bind(0.0f32)
        .bind(download.release.size_bytes)
        .bind(&download.release.guid)
        .bind(&download.release.title)
        .bind(&download.release.download_url)
        .bind(download.release.size_bytes)
        .bind(&download.release.indexer)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Error::Database(
                DatabaseError::ConstraintViolation(format!(
                    "active download already exists for {}: {}",
                    download.media, e
                )),
            ),
            _ => Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert download: {}",
                e
            ))),
        })?;

        Ok(DownloadId(result.last_insert_rowid()))
    }

    /// Get a download by ID
    pub async fn get_download(&self, id: DownloadId) -> Result<Option<Download>> {
        let row = sqlx::query_as::<_, Download>(&format!(
            "SELECT {SELECT_COLUMNS} FROM downloads WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get download: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Find the non-terminal download for a media reference, if any
    pub async fn find_active_for_media(&self, media: &MediaRef) -> Result<Option<Download>> {
        let row = sqlx::query_as::<_, Download>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM downloads
            WHERE media_kind = ? AND media_id = ? AND status IN (0, 1, 2, 3)
            "#
        ))
        .bind(media.kind_code())
        .bind(media.media_id())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to find active download: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Find a completed download for a media reference newer than `since`
    pub async fn find_recent_completed(
        &self,
        media: &MediaRef,
        since: i64,
    ) -> Result<Option<Download>> {
        let row = sqlx::query_as::<_, Download>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM downloads
            WHERE media_kind = ? AND media_id = ? AND status = 4 AND completed_at >= ?
            ORDER BY completed_at DESC
            LIMIT 1
            "#
        ))
        .bind(media.kind_code())
        .bind(media.media_id())
        .bind(since)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to find recent completed download: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all downloads submitted to one client
    pub async fn list_for_client(&self, client_id: i64) -> Result<Vec<Download>> {
        let rows = sqlx::query_as::<_, Download>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM downloads
            WHERE client_id = ?
            ORDER BY created_at ASC
            "#
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list downloads for client: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List all downloads, newest first
    pub async fn list_downloads(&self) -> Result<Vec<Download>> {
        let rows = sqlx::query_as::<_, Download>(&format!(
            "SELECT {SELECT_COLUMNS} FROM downloads ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list downloads: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Record a successful submission: external id, Downloading, started_at
    pub async fn set_submitted(&self, id: DownloadId, external_id: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "UPDATE downloads SET external_id = ?, status = ?, started_at = ? WHERE id = ?",
        )
        .bind(external_id)
        .bind(Status::Downloading.to_i32())
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record submission: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Replace a placeholder external id once the backend reports a real one
    pub async fn set_external_id(&self, id: DownloadId, external_id: &str) -> Result<()> {
        sqlx::query("UPDATE downloads SET external_id = ? WHERE id = ?")
            .bind(external_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set external id: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Update backend-reported progress and transient fields
    ///
    /// Progress is monotonic non-decreasing while the download is live;
    /// MAX() guards against backends that briefly report lower values. Rows
    /// already claimed for import (`completed_at` set) are left alone, so a
    /// backend momentarily re-reporting a stale live status cannot demote
    /// a claimed row out of `Importing`.
    pub async fn update_remote_progress(
        &self,
        id: DownloadId,
        status: Status,
        progress: f32,
        remaining_bytes: Option<i64>,
        eta_seconds: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE downloads
            SET status = ?, progress = MAX(progress, ?), remaining_bytes = ?, eta_seconds = ?
            WHERE id = ? AND status NOT IN (4, 5) AND completed_at IS NULL
            "#,
        )
        .bind(status.to_i32())
        .bind(progress)
        .bind(remaining_bytes)
        .bind(eta_seconds)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update progress: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Atomically claim a download for import on first completion detection
    ///
    /// Transitions to `Importing` and sets output path, full progress, and
    /// `completed_at`. The write-once `completed_at` column is the latch:
    /// a row already claimed (or already terminal) is not claimed again, so
    /// re-entrant ticks cannot double-trigger import, while a row marked
    /// `Importing` early by a backend post-processing state is still
    /// claimable when the backend reports actual completion.
    pub async fn claim_for_import(&self, id: DownloadId, output_path: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            UPDATE downloads
            SET status = ?, progress = 100.0, output_path = ?, remaining_bytes = 0,
                completed_at = ?
            WHERE id = ? AND status IN (0, 1, 2, 3) AND completed_at IS NULL
            "#,
        )
        .bind(Status::Importing.to_i32())
        .bind(output_path)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to claim download for import: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a download completed (terminal)
    pub async fn mark_completed(&self, id: DownloadId) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE downloads
            SET status = ?, progress = 100.0, completed_at = COALESCE(completed_at, ?)
            WHERE id = ? AND status NOT IN (4, 5)
            "#,
        )
        .bind(Status::Completed.to_i32())
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark download completed: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Mark a download failed with an error message (terminal)
    ///
    /// Returns `false` when the download was already terminal.
    pub async fn mark_failed(&self, id: DownloadId, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE downloads
            SET status = ?, error_message = ?
            WHERE id = ? AND status NOT IN (4, 5)
            "#,
        )
        .bind(Status::Failed.to_i32())
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark download failed: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Record an output path even when import will not run (probe failures)
    pub async fn set_output_path(&self, id: DownloadId, output_path: &str) -> Result<()> {
        sqlx::query("UPDATE downloads SET output_path = ? WHERE id = ?")
            .bind(output_path)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set output path: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Delete a download
    pub async fn delete_download(&self, id: DownloadId) -> Result<()> {
        sqlx::query("DELETE FROM downloads WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete download: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
