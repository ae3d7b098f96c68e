//! Capability traits for external collaborators
//!
//! The engine consumes the library data store, the naming service, and the
//! release-search capability through these seams. Callers inject concrete
//! implementations at construction time; tests inject stubs.

use crate::error::Result;
use crate::types::MediaRef;
use async_trait::async_trait;
use std::path::PathBuf;

/// Metadata for one file imported into the library
#[derive(Clone, Debug)]
pub struct ImportedFile {
    /// Final path inside the canonical library layout
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: i64,
    /// Quality detected from filename heuristics, if any
    pub quality: Option<String>,
}

/// Library data store capability
///
/// Transactional boundary is one record at a time; no cross-media
/// transactions are required by the engine.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// Whether the referenced item already has a file on record
    async fn has_file(&self, media: &MediaRef) -> Result<bool>;

    /// Flip the referenced item's has-file flag
    async fn set_has_file(&self, media: &MediaRef, has_file: bool) -> Result<()>;

    /// Resolve an episode within a show by season and episode number
    ///
    /// Used by the episode import service to match season-pack files that
    /// belong to a different episode than the one grabbed.
    async fn resolve_episode(
        &self,
        tv_show_id: &str,
        season: i32,
        episode: i32,
    ) -> Result<Option<String>>;

    /// Resolve a track within an album by track number
    async fn resolve_track(&self, album_id: &str, track_number: i32) -> Result<Option<String>>;

    /// Record an imported file against the referenced item
    async fn record_file(&self, media: &MediaRef, file: &ImportedFile) -> Result<()>;
}

/// File-naming and path-generation capability
///
/// Naming rules themselves live outside the engine; the engine only asks
/// where a file is expected and where it should end up.
pub trait NamingService: Send + Sync {
    /// Expected on-disk path for the referenced item, if computable
    ///
    /// Used by the filesystem-has-file grab guard: when a matching media file
    /// already exists at this path, the grab is rejected and the library
    /// record self-heals.
    fn expected_path(&self, media: &MediaRef) -> Option<PathBuf>;

    /// Canonical destination for a source file being imported
    fn destination_path(&self, media: &MediaRef, source_name: &str) -> PathBuf;

    /// Whether a filename looks like a video file
    fn is_video_file(&self, name: &str) -> bool;

    /// Whether a filename looks like an audio file
    fn is_audio_file(&self, name: &str) -> bool;

    /// Whether a filename looks like a book file
    fn is_book_file(&self, name: &str) -> bool;
}

/// Single-item search-and-grab capability
///
/// Invoked by the alternative-search trigger after a blacklisted failure.
/// Implementations search the configured indexers for a substitute release
/// and grab it; the engine only observes the boolean outcome.
#[async_trait]
pub trait ReleaseSearch: Send + Sync {
    /// Search for and grab an alternative release for the given item
    ///
    /// Returns `true` when a substitute release was found and grabbed.
    async fn search_and_grab(&self, media: &MediaRef) -> Result<bool>;
}
