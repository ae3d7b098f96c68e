//! Database layer for fetcharr
//!
//! Handles SQLite persistence for downloads and blacklisted releases.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`downloads`] — Download lifecycle CRUD and guarded transitions
//! - [`blacklist`] — Blacklisted release records and retry counting

use crate::types::{MediaRef, ReleaseInfo, Status};
use sqlx::{FromRow, sqlite::SqlitePool};

mod blacklist;
mod downloads;
mod migrations;

/// New download to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewDownload {
    /// The library item this grab is for
    pub media: MediaRef,
    /// Id of the download client the release will be submitted to
    pub client_id: i64,
    /// Immutable release snapshot captured at grab time
    pub release: ReleaseInfo,
}

/// Download record from database
#[derive(Debug, Clone, FromRow)]
pub struct Download {
    /// Unique database id
    pub id: i64,
    /// Media kind code (0=movie, 1=episode, 2=album, 3=book)
    pub media_kind: i32,
    /// Primary library id of the referenced item
    pub media_id: String,
    /// Denormalized show id, for episode references
    pub tv_show_id: Option<String>,
    /// Download client this was submitted to (immutable)
    pub client_id: i64,
    /// Backend-assigned identifier; null until successfully submitted
    pub external_id: Option<String>,
    /// Current status code (see [`Status`])
    pub status: i32,
    /// Progress percentage 0-100, monotonic non-decreasing while not failed
    pub progress: f32,
    /// Total size in bytes
    pub size_bytes: Option<i64>,
    /// Bytes remaining
    pub remaining_bytes: Option<i64>,
    /// Estimated seconds to completion
    pub eta_seconds: Option<i64>,
    /// Local filesystem path once completion is detected
    pub output_path: Option<String>,
    /// Error message; set only when failed
    pub error_message: Option<String>,
    /// Release guid from the grab-time snapshot
    pub release_guid: Option<String>,
    /// Release title from the grab-time snapshot
    pub release_title: String,
    /// Release download URL from the grab-time snapshot
    pub release_url: String,
    /// Release size from the grab-time snapshot
    pub release_size: Option<i64>,
    /// Indexer name from the grab-time snapshot
    pub release_indexer: Option<String>,
    /// Unix timestamp when the download was created
    pub created_at: i64,
    /// Unix timestamp when the download was submitted
    pub started_at: Option<i64>,
    /// Unix timestamp of first completion detection; set exactly once
    pub completed_at: Option<i64>,
}

impl Download {
    /// The media reference this download is linked to, if recognizable
    pub fn media_ref(&self) -> Option<MediaRef> {
        MediaRef::from_columns(self.media_kind, self.media_id.clone(), self.tv_show_id.clone())
    }

    /// Typed status
    pub fn status(&self) -> Status {
        Status::from_i32(self.status)
    }
}

/// New blacklist entry to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewBlacklistEntry {
    /// Release guid
    pub release_guid: String,
    /// Indexer the release came from
    pub indexer: Option<String>,
    /// The media reference the release was attempted for
    pub media: MediaRef,
    /// Human-readable failure reason
    pub reason: String,
    /// Failure classification code
    pub failure_type: i32,
    /// Unix timestamp after which the entry no longer applies
    pub expires_at: i64,
}

/// Blacklist record from database
#[derive(Debug, Clone, FromRow)]
pub struct BlacklistEntry {
    /// Unique database id
    pub id: i64,
    /// Release guid
    pub release_guid: String,
    /// Indexer the release came from
    pub indexer: Option<String>,
    /// Media kind code of the attempted item
    pub media_kind: i32,
    /// Primary library id of the attempted item
    pub media_id: String,
    /// Human-readable failure reason
    pub reason: String,
    /// Failure classification code
    pub failure_type: i32,
    /// Unix timestamp after which the entry no longer applies
    pub expires_at: i64,
    /// Unix timestamp when the entry was created
    pub created_at: i64,
}

/// Database handle for fetcharr
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
