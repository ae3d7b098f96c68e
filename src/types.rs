//! Core types for fetcharr

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a download
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(pub i64);

impl DownloadId {
    /// Create a new DownloadId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for DownloadId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<DownloadId> for i64 {
    fn from(id: DownloadId) -> Self {
        id.0
    }
}

impl std::fmt::Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DownloadId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for DownloadId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for DownloadId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for DownloadId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// The library item a download is linked to
///
/// Exactly one media reference applies per download. Album references
/// represent whole-album grabs; episode references carry the show id
/// alongside for season-pack matching during import.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaRef {
    /// A movie
    Movie {
        /// Library movie id
        movie_id: String,
    },
    /// A single episode (with its show denormalized alongside)
    Episode {
        /// Library episode id
        episode_id: String,
        /// Library TV show id, when known
        tv_show_id: Option<String>,
    },
    /// A whole album
    Album {
        /// Library album id
        album_id: String,
    },
    /// A book
    Book {
        /// Library book id
        book_id: String,
    },
}

impl MediaRef {
    /// Integer kind code used for persistence
    pub fn kind_code(&self) -> i32 {
        match self {
            MediaRef::Movie { .. } => 0,
            MediaRef::Episode { .. } => 1,
            MediaRef::Album { .. } => 2,
            MediaRef::Book { .. } => 3,
        }
    }

    /// The primary library id regardless of kind
    pub fn media_id(&self) -> &str {
        match self {
            MediaRef::Movie { movie_id } => movie_id,
            MediaRef::Episode { episode_id, .. } => episode_id,
            MediaRef::Album { album_id } => album_id,
            MediaRef::Book { book_id } => book_id,
        }
    }

    /// The denormalized show id, for episode references
    pub fn tv_show_id(&self) -> Option<&str> {
        match self {
            MediaRef::Episode { tv_show_id, .. } => tv_show_id.as_deref(),
            _ => None,
        }
    }

    /// Kind label for logging and events
    pub fn kind_label(&self) -> &'static str {
        match self {
            MediaRef::Movie { .. } => "movie",
            MediaRef::Episode { .. } => "episode",
            MediaRef::Album { .. } => "album",
            MediaRef::Book { .. } => "book",
        }
    }

    /// Rebuild a reference from its persisted columns
    pub fn from_columns(kind: i32, media_id: String, tv_show_id: Option<String>) -> Option<Self> {
        match kind {
            0 => Some(MediaRef::Movie { movie_id: media_id }),
            1 => Some(MediaRef::Episode {
                episode_id: media_id,
                tv_show_id,
            }),
            2 => Some(MediaRef::Album { album_id: media_id }),
            3 => Some(MediaRef::Book { book_id: media_id }),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind_label(), self.media_id())
    }
}

/// Download status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created locally, not yet (or not successfully) submitted to a backend
    Queued,
    /// Actively downloading on the backend
    Downloading,
    /// Paused on the backend
    Paused,
    /// Backend finished; files are being imported into the library
    Importing,
    /// Import finished successfully (terminal)
    Completed,
    /// Failed at any stage (terminal)
    Failed,
}

impl Status {
    /// Convert integer status code to Status enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => Status::Queued,
            1 => Status::Downloading,
            2 => Status::Paused,
            3 => Status::Importing,
            4 => Status::Completed,
            5 => Status::Failed,
            _ => Status::Failed, // Unknown codes surface visibly as Failed
        }
    }

    /// Convert Status enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            Status::Queued => 0,
            Status::Downloading => 1,
            Status::Paused => 2,
            Status::Importing => 3,
            Status::Completed => 4,
            Status::Failed => 5,
        }
    }

    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }
}

/// Backend-reported status after adapter mapping
///
/// Every adapter maps its backend's free-text status strings onto this
/// closed set. The mapping must be total; unrecognized strings map to
/// `Queued`, never to an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Waiting on the backend
    Queued,
    /// Actively downloading
    Downloading,
    /// Paused on the backend
    Paused,
    /// Backend-side post-processing (verify/repair/extract/move)
    PostProcessing,
    /// Backend reports the item finished successfully
    Completed,
    /// Backend reports the item failed
    Failed,
}

/// Classification of a download failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    /// Generic content failure (incomplete, missing articles)
    ContentFailure,
    /// Corrupt or damaged content (CRC, unpack, repair failures)
    Corruption,
    /// Content removed at the source (DMCA, expired)
    Removed,
    /// Encrypted archive with no working password
    PasswordProtected,
    /// Local configuration or environment problem (never blacklisted)
    EnvironmentFailure,
    /// Could not classify
    Unknown,
}

impl FailureType {
    /// Convert integer code to FailureType
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => FailureType::ContentFailure,
            1 => FailureType::Corruption,
            2 => FailureType::Removed,
            3 => FailureType::PasswordProtected,
            4 => FailureType::EnvironmentFailure,
            _ => FailureType::Unknown,
        }
    }

    /// Convert FailureType to integer code
    pub fn to_i32(&self) -> i32 {
        match self {
            FailureType::ContentFailure => 0,
            FailureType::Corruption => 1,
            FailureType::Removed => 2,
            FailureType::PasswordProtected => 3,
            FailureType::EnvironmentFailure => 4,
            FailureType::Unknown => 5,
        }
    }
}

/// Immutable snapshot of the release a grab was made for
///
/// Captured at grab time; the durable record of what was requested,
/// independent of the backend's own bookkeeping.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReleaseInfo {
    /// Indexer-assigned globally unique id
    pub guid: Option<String>,
    /// Release title
    pub title: String,
    /// URL the backend fetches the release from
    pub download_url: String,
    /// Reported size in bytes
    pub size_bytes: Option<i64>,
    /// Name of the indexer that returned the release
    pub indexer: Option<String>,
}

/// Request to grab a release for a library item
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GrabRequest {
    /// Release title
    pub title: String,
    /// URL the backend fetches the release from
    pub download_url: String,
    /// Reported size in bytes, if known
    #[serde(default)]
    pub size_bytes: Option<i64>,
    /// The library item this grab is for
    pub media: MediaRef,
    /// Indexer-assigned release guid
    #[serde(default)]
    pub guid: Option<String>,
    /// Name of the indexer that returned the release
    #[serde(default)]
    pub indexer: Option<String>,
}

impl GrabRequest {
    /// Release snapshot to persist alongside the download
    pub fn release_info(&self) -> ReleaseInfo {
        ReleaseInfo {
            guid: self.guid.clone(),
            title: self.title.clone(),
            download_url: self.download_url.clone(),
            size_bytes: self.size_bytes,
            indexer: self.indexer.clone(),
        }
    }
}

/// A backend's live view of one queued, downloading, or historical item
///
/// Ephemeral: exists only for the duration of one reconciliation pass and
/// is matched against local downloads by `external_id`.
#[derive(Clone, Debug)]
pub struct ExternalItem {
    /// Backend-assigned identifier (hash, nzo_id, numeric id as string)
    pub external_id: String,
    /// Item name as the backend reports it
    pub name: String,
    /// Backend-specific status string (fed through the adapter's status map)
    pub native_status: String,
    /// Progress percentage 0-100, if the backend reports one
    pub progress: Option<f32>,
    /// Total size in bytes
    pub size_bytes: Option<i64>,
    /// Bytes remaining
    pub remaining_bytes: Option<i64>,
    /// Estimated seconds to completion
    pub eta_seconds: Option<i64>,
    /// Output path on the backend's filesystem, once known
    pub output_path: Option<PathBuf>,
    /// Backend-reported failure message, if any
    pub error_message: Option<String>,
}

/// Queue projection of one download, for consumers of `get_queue`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueItem {
    /// Download id
    pub id: DownloadId,
    /// Release title
    pub title: String,
    /// The library item this download is for
    pub media: MediaRef,
    /// Current status
    pub status: Status,
    /// Progress percentage 0-100
    pub progress: f32,
    /// Total size in bytes, if known
    pub size_bytes: Option<i64>,
    /// Bytes remaining, if known
    pub remaining_bytes: Option<i64>,
    /// Estimated seconds to completion, if known
    pub eta_seconds: Option<i64>,
    /// Name of the download client handling this item
    pub client_name: String,
    /// Error message, set only for failed downloads
    pub error_message: Option<String>,
    /// When the download was created
    pub created_at: DateTime<Utc>,
}

/// Result of a download client connectivity test
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientTestResult {
    /// Whether the test was successful
    pub success: bool,
    /// Backend daemon version, if reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Error message, if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Configured remote path, when a path mapping is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<String>,
    /// Whether the mapped local path is accessible, when a mapping is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_accessible: Option<bool>,
}

impl ClientTestResult {
    /// Successful test result with an optional version string
    pub fn ok(version: Option<String>) -> Self {
        Self {
            success: true,
            version,
            error: None,
            remote_path: None,
            path_accessible: None,
        }
    }

    /// Failed test result with an error message
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            version: None,
            error: Some(error.into()),
            remote_path: None,
            path_accessible: None,
        }
    }
}

/// Event emitted during the download lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A release was submitted to a download client
    Grabbed {
        /// Download id
        id: DownloadId,
        /// The library item grabbed for
        media: MediaRef,
        /// Release title
        title: String,
        /// Download client name
        client: String,
        /// Backend-assigned id
        external_id: String,
    },

    /// Backend reported completion; import is starting
    DownloadCompleted {
        /// Download id
        id: DownloadId,
        /// Mapped local output path
        path: PathBuf,
    },

    /// Import finished successfully
    ImportCompleted {
        /// Download id
        id: DownloadId,
        /// Number of files imported
        files_imported: usize,
    },

    /// Import failed
    ImportFailed {
        /// Download id
        id: DownloadId,
        /// Error message
        error: String,
    },

    /// Download failed (backend failure or pre-import probe failure)
    DownloadFailed {
        /// Download id
        id: DownloadId,
        /// Error message
        error: String,
    },

    /// A release was blacklisted
    Blacklisted {
        /// Release guid
        guid: String,
        /// Indexer name
        indexer: Option<String>,
        /// Failure classification
        failure_type: FailureType,
        /// Human-readable reason
        reason: String,
    },

    /// An alternative-release search was triggered for a failed item
    RetrySearchTriggered {
        /// The library item being retried
        media: MediaRef,
    },

    /// Download removed from the queue (cancel or orphan pruning)
    Removed {
        /// Download id
        id: DownloadId,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_i32_for_all_variants() {
        let cases = [
            (Status::Queued, 0),
            (Status::Downloading, 1),
            (Status::Paused, 2),
            (Status::Importing, 3),
            (Status::Completed, 4),
            (Status::Failed, 5),
        ];

        for (variant, expected_int) in cases {
            assert_eq!(variant.to_i32(), expected_int);
            assert_eq!(Status::from_i32(expected_int), variant);
        }
    }

    #[test]
    fn status_from_unknown_integer_defaults_to_failed() {
        assert_eq!(
            Status::from_i32(99),
            Status::Failed,
            "unknown status must fall back to Failed so corrupted rows surface visibly"
        );
        assert_eq!(Status::from_i32(-1), Status::Failed);
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(Status::Completed.is_terminal());
        assert!(Status::Failed.is_terminal());
        for status in [
            Status::Queued,
            Status::Downloading,
            Status::Paused,
            Status::Importing,
        ] {
            assert!(!status.is_terminal(), "{status:?} must not be terminal");
        }
    }

    #[test]
    fn failure_type_round_trips_through_i32() {
        let cases = [
            (FailureType::ContentFailure, 0),
            (FailureType::Corruption, 1),
            (FailureType::Removed, 2),
            (FailureType::PasswordProtected, 3),
            (FailureType::EnvironmentFailure, 4),
            (FailureType::Unknown, 5),
        ];
        for (variant, code) in cases {
            assert_eq!(variant.to_i32(), code);
            assert_eq!(FailureType::from_i32(code), variant);
        }
        assert_eq!(FailureType::from_i32(42), FailureType::Unknown);
    }

    #[test]
    fn media_ref_round_trips_through_columns() {
        let refs = [
            MediaRef::Movie {
                movie_id: "m1".into(),
            },
            MediaRef::Episode {
                episode_id: "e1".into(),
                tv_show_id: Some("s1".into()),
            },
            MediaRef::Album {
                album_id: "a1".into(),
            },
            MediaRef::Book {
                book_id: "b1".into(),
            },
        ];

        for media in refs {
            let rebuilt = MediaRef::from_columns(
                media.kind_code(),
                media.media_id().to_string(),
                media.tv_show_id().map(str::to_string),
            )
            .unwrap();
            assert_eq!(rebuilt, media);
        }
    }

    #[test]
    fn media_ref_from_unknown_kind_is_none() {
        assert!(MediaRef::from_columns(9, "x".into(), None).is_none());
    }

    #[test]
    fn download_id_from_str_parses_and_rejects() {
        assert_eq!(DownloadId::from_str("123").unwrap().get(), 123);
        assert!(DownloadId::from_str("abc").is_err());
        assert!(DownloadId::from_str("").is_err());
    }
}
