//! Album import: whole-album grabs, track-by-track.

use crate::error::Result;
use crate::library::{ImportedFile, LibraryStore, NamingService};
use crate::types::MediaRef;
use std::path::Path;
use std::sync::Arc;

use super::{ImportOutcome, scan};

/// Imports album downloads
pub struct AlbumImportService {
    store: Arc<dyn LibraryStore>,
    naming: Arc<dyn NamingService>,
}

impl AlbumImportService {
    pub(crate) fn new(store: Arc<dyn LibraryStore>, naming: Arc<dyn NamingService>) -> Self {
        Self { store, naming }
    }

    /// Import every audio file whose track number resolves against the album
    ///
    /// Files without a parseable or resolvable track number are skipped with
    /// a per-file reason; the album's has-file flag flips when anything
    /// imported.
    pub(crate) async fn import(&self, media: &MediaRef, source: &Path) -> Result<ImportOutcome> {
        let MediaRef::Album { album_id } = media else {
            return Ok(ImportOutcome::new(0, vec!["not an album reference".into()]));
        };

        let mut imported = 0;
        let mut errors = Vec::new();

        let tracks: Vec<_> = scan::discover_files(source)
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .map(|name| self.naming.is_audio_file(&name.to_string_lossy()))
                    .unwrap_or(false)
            })
            .collect();

        if tracks.is_empty() {
            errors.push(format!("no audio files found under {}", source.display()));
            return Ok(ImportOutcome::new(0, errors));
        }

        for path in tracks {
            let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();

            let Some(number) = scan::parse_track(&name) else {
                errors.push(format!("{name}: no recognizable track number"));
                continue;
            };
            if self.store.resolve_track(album_id, number).await?.is_none() {
                errors.push(format!("{name}: album has no track {number}"));
                continue;
            }

            let dest = self.naming.destination_path(media, &name);
            let size = scan::file_size(&path);
            if let Err(e) = scan::atomic_move(&path, &dest) {
                errors.push(e.to_string());
                continue;
            }

            let file = ImportedFile {
                path: dest,
                size_bytes: size,
                quality: scan::detect_quality(&name),
            };
            self.store.record_file(media, &file).await?;
            imported += 1;
        }

        if imported > 0 {
            self.store.set_has_file(media, true).await?;
        }
        Ok(ImportOutcome::new(imported, errors))
    }
}
