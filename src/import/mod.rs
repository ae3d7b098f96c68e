//! Import pipeline: completed downloads into the library layout.
//!
//! [`ImportRouter`] dispatches on the download's media reference to one of
//! the per-media services. Each service discovers payload files under the
//! completed output path, matches them to library records, moves them into
//! the canonical layout, and records them through [`LibraryStore`].
//!
//! Partial success is success: a season pack importing three of five files
//! reports `success = true` with the per-file failures in `errors`, and the
//! source folder is still cleaned up.

use crate::error::Result;
use crate::library::{LibraryStore, NamingService};
use crate::types::MediaRef;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

mod album;
mod book;
mod episode;
mod movie;
pub mod scan;

pub use album::AlbumImportService;
pub use book::BookImportService;
pub use episode::EpisodeImportService;
pub use movie::MovieImportService;

/// Outcome of one import attempt
#[derive(Clone, Debug, Default)]
pub struct ImportOutcome {
    /// Whether at least one file reached the library
    pub success: bool,
    /// Number of files imported
    pub files_imported: usize,
    /// Per-file failure reasons for anything that did not import
    pub errors: Vec<String>,
}

impl ImportOutcome {
    /// Build an outcome; success iff any file was imported
    pub fn new(files_imported: usize, errors: Vec<String>) -> Self {
        Self {
            success: files_imported > 0,
            files_imported,
            errors,
        }
    }
}

/// Import capability consumed by the orchestrator
///
/// A trait seam so orchestrator tests can observe dispatches without
/// touching the filesystem.
#[async_trait]
pub trait Importer: Send + Sync {
    /// Import the payload at `source` for the given library item
    async fn import(&self, media: &MediaRef, source: &Path) -> Result<ImportOutcome>;
}

/// Routes imports to the per-media service for the reference kind
pub struct ImportRouter {
    movies: MovieImportService,
    episodes: EpisodeImportService,
    albums: AlbumImportService,
    books: BookImportService,
}

impl ImportRouter {
    /// Create a router with all four per-media services
    pub fn new(store: Arc<dyn LibraryStore>, naming: Arc<dyn NamingService>) -> Self {
        Self {
            movies: MovieImportService::new(store.clone(), naming.clone()),
            episodes: EpisodeImportService::new(store.clone(), naming.clone()),
            albums: AlbumImportService::new(store.clone(), naming.clone()),
            books: BookImportService::new(store, naming),
        }
    }
}

#[async_trait]
impl Importer for ImportRouter {
    async fn import(&self, media: &MediaRef, source: &Path) -> Result<ImportOutcome> {
        let outcome = match media {
            MediaRef::Movie { .. } => self.movies.import(media, source).await?,
            MediaRef::Episode { .. } => self.episodes.import(media, source).await?,
            MediaRef::Album { .. } => self.albums.import(media, source).await?,
            MediaRef::Book { .. } => self.books.import(media, source).await?,
        };

        if outcome.success {
            scan::cleanup_source_folder(source);
        }
        Ok(outcome)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::Result;
    use crate::library::ImportedFile;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// In-memory library store recording every call
    #[derive(Default)]
    pub struct RecordingStore {
        pub has_file: Mutex<bool>,
        pub recorded: Mutex<Vec<(MediaRef, ImportedFile)>>,
        pub episodes: Mutex<Vec<(String, i32, i32, String)>>,
        pub tracks: Mutex<Vec<(String, i32, String)>>,
    }

    #[async_trait]
    impl LibraryStore for RecordingStore {
        async fn has_file(&self, _media: &MediaRef) -> Result<bool> {
            Ok(*self.has_file.lock().unwrap())
        }

        async fn set_has_file(&self, _media: &MediaRef, has_file: bool) -> Result<()> {
            *self.has_file.lock().unwrap() = has_file;
            Ok(())
        }

        async fn resolve_episode(
            &self,
            tv_show_id: &str,
            season: i32,
            episode: i32,
        ) -> Result<Option<String>> {
            Ok(self
                .episodes
                .lock()
                .unwrap()
                .iter()
                .find(|(show, s, e, _)| show == tv_show_id && *s == season && *e == episode)
                .map(|(_, _, _, id)| id.clone()))
        }

        async fn resolve_track(&self, album_id: &str, number: i32) -> Result<Option<String>> {
            Ok(self
                .tracks
                .lock()
                .unwrap()
                .iter()
                .find(|(album, n, _)| album == album_id && *n == number)
                .map(|(_, _, id)| id.clone()))
        }

        async fn record_file(&self, media: &MediaRef, file: &ImportedFile) -> Result<()> {
            self.recorded
                .lock()
                .unwrap()
                .push((media.clone(), file.clone()));
            Ok(())
        }
    }

    /// Naming service that files everything under a fixed library root
    pub struct FlatNaming {
        pub root: PathBuf,
    }

    impl NamingService for FlatNaming {
        fn expected_path(&self, media: &MediaRef) -> Option<PathBuf> {
            Some(self.root.join(format!("{media}")))
        }

        fn destination_path(&self, media: &MediaRef, source_name: &str) -> PathBuf {
            self.root.join(media.media_id()).join(source_name)
        }

        fn is_video_file(&self, name: &str) -> bool {
            let lower = name.to_ascii_lowercase();
            [".mkv", ".mp4", ".avi", ".m4v"].iter().any(|e| lower.ends_with(e))
        }

        fn is_audio_file(&self, name: &str) -> bool {
            let lower = name.to_ascii_lowercase();
            [".flac", ".mp3", ".m4a", ".ogg", ".opus"].iter().any(|e| lower.ends_with(e))
        }

        fn is_book_file(&self, name: &str) -> bool {
            let lower = name.to_ascii_lowercase();
            [".epub", ".mobi", ".azw3", ".pdf"].iter().any(|e| lower.ends_with(e))
        }
    }
}
