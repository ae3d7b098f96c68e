//! Book import: one ebook file per download.

use crate::error::Result;
use crate::library::{ImportedFile, LibraryStore, NamingService};
use crate::types::MediaRef;
use std::path::Path;
use std::sync::Arc;

use super::{ImportOutcome, scan};

/// Preference order when a release ships multiple ebook formats
const FORMAT_PREFERENCE: &[&str] = &["epub", "azw3", "mobi", "pdf"];

/// Imports book downloads
pub struct BookImportService {
    store: Arc<dyn LibraryStore>,
    naming: Arc<dyn NamingService>,
}

impl BookImportService {
    pub(crate) fn new(store: Arc<dyn LibraryStore>, naming: Arc<dyn NamingService>) -> Self {
        Self { store, naming }
    }

    pub(crate) async fn import(&self, media: &MediaRef, source: &Path) -> Result<ImportOutcome> {
        let mut errors = Vec::new();

        let mut candidates: Vec<_> = scan::discover_files(source)
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .map(|name| self.naming.is_book_file(&name.to_string_lossy()))
                    .unwrap_or(false)
            })
            .collect();

        candidates.sort_by_key(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_ascii_lowercase())
                .and_then(|ext| FORMAT_PREFERENCE.iter().position(|p| *p == ext))
                .unwrap_or(usize::MAX)
        });

        let Some(book) = candidates.first().cloned() else {
            errors.push(format!("no book files found under {}", source.display()));
            return Ok(ImportOutcome::new(0, errors));
        };

        let name = book.file_name().unwrap_or_default().to_string_lossy();
        let dest = self.naming.destination_path(media, &name);
        let size = scan::file_size(&book);

        if let Err(e) = scan::atomic_move(&book, &dest) {
            errors.push(e.to_string());
            return Ok(ImportOutcome::new(0, errors));
        }

        let file = ImportedFile {
            path: dest,
            size_bytes: size,
            quality: None,
        };
        self.store.record_file(media, &file).await?;
        self.store.set_has_file(media, true).await?;

        Ok(ImportOutcome::new(1, errors))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::test_support::{FlatNaming, RecordingStore};
    use std::fs;
    use tempfile::TempDir;

    fn write_file(path: &Path, len: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; len]).unwrap();
    }

    #[tokio::test]
    async fn prefers_epub_over_other_formats() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("Author - Title");
        write_file(&source.join("title.pdf"), 100);
        write_file(&source.join("title.epub"), 100);
        write_file(&source.join("title.mobi"), 100);

        let store = Arc::new(RecordingStore::default());
        let service = BookImportService::new(
            store.clone(),
            Arc::new(FlatNaming {
                root: dir.path().join("library"),
            }),
        );
        let media = MediaRef::Book {
            book_id: "b1".into(),
        };

        let outcome = service.import(&media, &source).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.files_imported, 1);
        assert!(
            store.recorded.lock().unwrap()[0]
                .1
                .path
                .extension()
                .is_some_and(|e| e == "epub")
        );
    }
}
