//! Grab: dedupe guards, client selection, and submission.

use crate::config::RECENT_COMPLETION_WINDOW;
use crate::db::{Download, NewDownload};
use crate::error::{Error, GrabError, Result};
use crate::types::{Event, GrabRequest};

use super::DownloadOrchestrator;

impl DownloadOrchestrator {
    /// Grab a release for a library item
    ///
    /// Runs the dedupe guards in order (active duplicate, recent completion,
    /// library has-file, filesystem has-file), picks the enabled client with
    /// the lowest priority value, creates the download row, and submits the
    /// release to the backend. The whole check-then-create sequence is
    /// serialized per media reference; the partial unique index catches any
    /// race the lock cannot see.
    pub async fn grab(&self, request: GrabRequest) -> Result<Download> {
        let lock = self.media_lock(&request.media);
        let _guard = lock.lock().await;

        // Guard 1: an active download for this item makes grab a no-op
        if let Some(existing) = self.db.find_active_for_media(&request.media).await? {
            tracing::debug!(
                media = %request.media,
                download_id = existing.id,
                "Grab is a duplicate of an active download"
            );
            return Ok(existing);
        }

        // Guard 2: a completion within the dedupe window rejects the grab
        let since = chrono::Utc::now().timestamp() - RECENT_COMPLETION_WINDOW.as_secs() as i64;
        if let Some(done) = self.db.find_recent_completed(&request.media, since).await? {
            return Err(GrabError::AlreadyCompleted {
                media: request.media.to_string(),
                completed_at: done.completed_at.unwrap_or(done.created_at),
            }
            .into());
        }

        // Guard 3: the library already has a file on record
        if self.library.has_file(&request.media).await? {
            return Err(GrabError::AlreadyHasFile {
                media: request.media.to_string(),
            }
            .into());
        }

        // Guard 4: a file exists on disk the library does not know about yet
        if let Some(expected) = self.naming.expected_path(&request.media)
            && expected.exists()
        {
            tracing::info!(
                media = %request.media,
                path = %expected.display(),
                "File already on disk; repairing the library's has-file flag"
            );
            self.library.set_has_file(&request.media, true).await?;
            return Err(GrabError::AlreadyHasFile {
                media: request.media.to_string(),
            }
            .into());
        }

        let clients = self.config.enabled_clients();
        let Some(client) = clients.into_iter().next() else {
            return Err(GrabError::NoClientConfigured.into());
        };
        let adapter = self.adapter_for(client)?;

        let new = NewDownload {
            media: request.media.clone(),
            client_id: client.id,
            release: request.release_info(),
        };
        let id = match self.db.insert_download(&new).await {
            Ok(id) => id,
            Err(e) if e.is_constraint_violation() => {
                // A concurrent grab won the unique-index race; hand back its row
                if let Some(winner) = self.db.find_active_for_media(&request.media).await? {
                    return Ok(winner);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        match adapter.submit(client, &request).await {
            Ok(external_id) => {
                self.db.set_submitted(id, &external_id).await?;
                tracing::info!(
                    download_id = id.0,
                    media = %request.media,
                    client = %client.name,
                    external_id = %external_id,
                    "Release submitted to download client"
                );
                self.emit(Event::Grabbed {
                    id,
                    media: request.media.clone(),
                    title: request.title.clone(),
                    client: client.name.clone(),
                    external_id,
                });

                self.db
                    .get_download(id)
                    .await?
                    .ok_or(Error::NotFound(id.0))
            }
            Err(e) => {
                let message = e.to_string();
                self.db.mark_failed(id, &message).await?;
                tracing::warn!(
                    download_id = id.0,
                    client = %client.name,
                    error = %message,
                    "Download client rejected submission"
                );
                Err(GrabError::ClientSubmitFailed {
                    client: client.name.clone(),
                    message,
                }
                .into())
            }
        }
    }
}
