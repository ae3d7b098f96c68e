//! Error types for fetcharr
//!
//! Guard failures in `grab` are surfaced synchronously to the caller as typed
//! errors with stable messages. Reconciliation-loop failures are recorded on
//! the download row and logged, never thrown out of the tick.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fetcharr operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fetcharr
#[derive(Debug, Error)]
pub enum Error {
    /// A grab request was rejected by one of the pre-submit guards
    #[error("grab rejected: {0}")]
    Grab(#[from] GrabError),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Download client backend call failed
    #[error("download client error ({client}): {message}")]
    Client {
        /// Name of the client the call targeted
        client: String,
        /// Backend or transport error message
        message: String,
    },

    /// A completed download's output path failed the accessibility probe
    #[error("path inaccessible: {0}")]
    PathInaccessible(#[from] PathProbeFailure),

    /// Import failed
    #[error("import error: {0}")]
    Import(#[from] ImportError),

    /// Download not found
    #[error("download {0} not found")]
    NotFound(i64),

    /// No adapter registered for a client kind
    #[error("no adapter registered for client kind {0}")]
    UnknownClientKind(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Grab guard and submission failures
#[derive(Debug, Error)]
pub enum GrabError {
    /// A download for this media reference completed within the dedupe window
    #[error("{media} was already completed at {completed_at}")]
    AlreadyCompleted {
        /// The media reference the grab was for
        media: String,
        /// Unix timestamp of the prior completion
        completed_at: i64,
    },

    /// The library item already has a file
    #[error("{media} already has a file")]
    AlreadyHasFile {
        /// The media reference the grab was for
        media: String,
    },

    /// No enabled download client is configured
    #[error("no enabled download client configured")]
    NoClientConfigured,

    /// The selected client rejected the submission
    #[error("client {client} rejected submission: {message}")]
    ClientSubmitFailed {
        /// Name of the client the release was submitted to
        client: String,
        /// Backend error message
        message: String,
    },
}

/// Why a completed download's output path could not be accessed
///
/// Distinguishes a path that never existed from a reachable parent with a
/// missing file, and from a mount that did not respond within the probe
/// timeout.
#[derive(Debug, Error)]
pub enum PathProbeFailure {
    /// Neither the path nor its mapped root exists locally
    #[error("path {path} does not exist; check the client's remote path mapping")]
    NeverExisted {
        /// The mapped local path that was probed
        path: PathBuf,
    },

    /// The parent directory exists but the reported file or folder is missing
    #[error("parent of {path} exists but the download output is missing")]
    MissingFile {
        /// The mapped local path that was probed
        path: PathBuf,
    },

    /// The filesystem did not respond within the probe timeout
    #[error("filesystem probe of {path} timed out after {timeout_secs}s; mount unreachable?")]
    MountUnreachable {
        /// The mapped local path that was probed
        path: PathBuf,
        /// The probe timeout that elapsed
        timeout_secs: u64,
    },

    /// The backend reported completion without an output path
    #[error("backend reported completion without an output path")]
    NoPathReported,
}

/// Import failures
#[derive(Debug, Error)]
pub enum ImportError {
    /// The download carries no recognized media reference
    #[error("download {id} has no recognized media reference")]
    UnknownMediaType {
        /// The download id
        id: i64,
    },

    /// No candidate files matched a library record
    #[error("no files imported from {path}: {reasons}")]
    NoFilesImported {
        /// The source folder that was scanned
        path: PathBuf,
        /// Per-file failure reasons, joined
        reasons: String,
    },

    /// Moving a file into the library layout failed
    #[error("failed to move {from} to {dest}: {reason}")]
    MoveFailed {
        /// Source path
        from: PathBuf,
        /// Destination path
        dest: PathBuf,
        /// Underlying error
        reason: String,
    },

    /// The referenced library record no longer exists
    #[error("library record {media} not found")]
    LibraryRecordMissing {
        /// The media reference that failed to resolve
        media: String,
    },
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Constraint violation (e.g. second active download for one media item)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

impl Error {
    /// Whether this error is a unique-constraint violation
    ///
    /// The grab path uses this to detect a concurrent grab winning the
    /// partial unique index race, in which case the existing row is returned.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Error::Database(DatabaseError::ConstraintViolation(_)) => true,
            Error::Sqlx(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}
