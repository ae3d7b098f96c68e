//! Movie import: one payload video per download.

use crate::error::Result;
use crate::library::{ImportedFile, LibraryStore, NamingService};
use crate::types::MediaRef;
use std::path::Path;
use std::sync::Arc;

use super::{ImportOutcome, scan};

/// Imports movie downloads
pub struct MovieImportService {
    store: Arc<dyn LibraryStore>,
    naming: Arc<dyn NamingService>,
}

impl MovieImportService {
    pub(crate) fn new(store: Arc<dyn LibraryStore>, naming: Arc<dyn NamingService>) -> Self {
        Self { store, naming }
    }

    /// Import the largest video file found under `source`
    ///
    /// Release folders often carry more than one video (featurettes that
    /// escaped the extras filter); the main feature is reliably the largest.
    pub(crate) async fn import(&self, media: &MediaRef, source: &Path) -> Result<ImportOutcome> {
        let mut errors = Vec::new();

        let candidates: Vec<_> = scan::discover_files(source)
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .map(|name| self.naming.is_video_file(&name.to_string_lossy()))
                    .unwrap_or(false)
            })
            .collect();

        let Some(main) = candidates
            .iter()
            .max_by_key(|path| scan::file_size(path))
            .cloned()
        else {
            errors.push(format!("no video files found under {}", source.display()));
            return Ok(ImportOutcome::new(0, errors));
        };

        let name = main.file_name().unwrap_or_default().to_string_lossy();
        let dest = self.naming.destination_path(media, &name);
        let size = scan::file_size(&main);

        if let Err(e) = scan::atomic_move(&main, &dest) {
            errors.push(e.to_string());
            return Ok(ImportOutcome::new(0, errors));
        }

        let file = ImportedFile {
            path: dest,
            size_bytes: size,
            quality: scan::detect_quality(&name),
        };
        self.store.record_file(media, &file).await?;
        self.store.set_has_file(media, true).await?;

        Ok(ImportOutcome::new(1, errors))
    }
}
