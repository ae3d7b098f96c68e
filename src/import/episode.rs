//! Episode import, including season-pack handling.
//!
//! A grab is for one episode, but the payload can be a season pack. Every
//! video file is parsed for a season/episode pair and resolved against the
//! show through [`LibraryStore::resolve_episode`]; files belonging to other
//! episodes of the same show import against their own records.

use crate::error::Result;
use crate::library::{ImportedFile, LibraryStore, NamingService};
use crate::types::MediaRef;
use std::path::Path;
use std::sync::Arc;

use super::{ImportOutcome, scan};

/// Imports episode downloads
pub struct EpisodeImportService {
    store: Arc<dyn LibraryStore>,
    naming: Arc<dyn NamingService>,
}

impl EpisodeImportService {
    pub(crate) fn new(store: Arc<dyn LibraryStore>, naming: Arc<dyn NamingService>) -> Self {
        Self { store, naming }
    }

    pub(crate) async fn import(&self, media: &MediaRef, source: &Path) -> Result<ImportOutcome> {
        let mut imported = 0;
        let mut errors = Vec::new();

        let videos: Vec<_> = scan::discover_files(source)
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .map(|name| self.naming.is_video_file(&name.to_string_lossy()))
                    .unwrap_or(false)
            })
            .collect();

        if videos.is_empty() {
            errors.push(format!("no video files found under {}", source.display()));
            return Ok(ImportOutcome::new(0, errors));
        }

        let single_file = videos.len() == 1;
        for path in videos {
            let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();

            let target = match self.resolve_target(media, &name, single_file).await? {
                Ok(target) => target,
                Err(reason) => {
                    errors.push(format!("{name}: {reason}"));
                    continue;
                }
            };

            let dest = self.naming.destination_path(&target, &name);
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
            self.store.record_file(&target, &file).await?;
            self.store.set_has_file(&target, true).await?;
            imported += 1;
        }

        Ok(ImportOutcome::new(imported, errors))
    }

    /// Decide which episode record a file belongs to
    ///
    /// Parsed season/episode numbers win; an unparseable lone file falls back
    /// to the grabbed episode. `Err` carries a per-file skip reason.
    async fn resolve_target(
        &self,
        media: &MediaRef,
        name: &str,
        single_file: bool,
    ) -> Result<std::result::Result<MediaRef, String>> {
        let MediaRef::Episode { tv_show_id, .. } = media else {
            return Ok(Ok(media.clone()));
        };

        match (scan::parse_episode(name), tv_show_id) {
            (Some((season, episode)), Some(show_id)) => {
                match self.store.resolve_episode(show_id, season, episode).await? {
                    Some(episode_id) => Ok(Ok(MediaRef::Episode {
                        episode_id,
                        tv_show_id: Some(show_id.clone()),
                    })),
                    None => Ok(Err(format!(
                        "no episode record for S{season:02}E{episode:02}"
                    ))),
                }
            }
            (Some(_), None) | (None, _) if single_file => Ok(Ok(media.clone())),
            (Some(_), None) => Ok(Err("show unknown, cannot match season pack".to_string())),
            (None, _) => Ok(Err("filename has no recognizable episode number".to_string())),
        }
    }
}
