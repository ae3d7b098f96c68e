//! Control surface: queue projection, cancellation, client testing.

use crate::config::{DownloadClientConfig, RECENT_COMPLETION_WINDOW};
use crate::error::{Error, Result};
use crate::types::{ClientTestResult, DownloadId, Event, QueueItem};
use std::path::Path;

use super::DownloadOrchestrator;
use super::reconcile::probe_path;

impl DownloadOrchestrator {
    /// Project the download queue for consumers
    ///
    /// Includes every non-terminal download plus terminal ones from the
    /// recent window, so a completion or failure stays visible for a while
    /// after the backend forgets the item.
    pub async fn get_queue(&self) -> Result<Vec<QueueItem>> {
        let cutoff = chrono::Utc::now().timestamp() - RECENT_COMPLETION_WINDOW.as_secs() as i64;
        let rows = self.db.list_downloads().await?;

        let items = rows
            .into_iter()
            .filter(|row| {
                !row.status().is_terminal() || row.completed_at.unwrap_or(row.created_at) >= cutoff
            })
            .filter_map(|row| {
                let media = row.media_ref()?;
                let client_name = self
                    .config
                    .client_by_id(row.client_id)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| format!("client-{}", row.client_id));

                Some(QueueItem {
                    id: DownloadId(row.id),
                    title: row.release_title.clone(),
                    media,
                    status: row.status(),
                    progress: row.progress,
                    size_bytes: row.size_bytes,
                    remaining_bytes: row.remaining_bytes,
                    eta_seconds: row.eta_seconds,
                    client_name,
                    error_message: row.error_message.clone(),
                    created_at: chrono::DateTime::from_timestamp(row.created_at, 0)
                        .unwrap_or_default(),
                })
            })
            .collect();

        Ok(items)
    }

    /// Cancel a download: remove it from the backend and delete the row
    ///
    /// Backend removal failures are logged, not fatal; the local record is
    /// deleted either way so the queue reflects the user's intent.
    pub async fn cancel(&self, id: DownloadId, delete_files: bool) -> Result<()> {
        let download = self
            .db
            .get_download(id)
            .await?
            .ok_or(Error::NotFound(id.0))?;

        if let (Some(external_id), Some(client)) = (
            download.external_id.as_deref(),
            self.config.client_by_id(download.client_id),
        ) {
            match self.adapter_for(client) {
                Ok(adapter) => {
                    if let Err(e) = adapter.remove(client, external_id, delete_files).await {
                        tracing::warn!(
                            download_id = id.0,
                            client = %client.name,
                            error = %e,
                            "Backend removal failed; deleting the local record anyway"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(download_id = id.0, error = %e, "No adapter for cancel")
                }
            }
        }

        self.db.delete_download(id).await?;
        tracing::info!(download_id = id.0, "Download cancelled");
        self.emit(Event::Removed { id });
        Ok(())
    }

    /// Test connectivity to a download client
    ///
    /// Reports the backend version when the adapter can obtain one. When the
    /// client carries a remote path mapping, the mapped local root is probed
    /// and reported alongside.
    pub async fn test_client(&self, config: &DownloadClientConfig) -> ClientTestResult {
        let adapter = match self.adapter_for(config) {
            Ok(adapter) => adapter,
            Err(e) => return ClientTestResult::failed(e.to_string()),
        };

        let mut result = adapter.test_connection(config).await;
        if let Some(mapping) = &config.path_mapping {
            result.remote_path = Some(mapping.remote.clone());
            result.path_accessible = Some(probe_path(Path::new(&mapping.local)).await.is_ok());
        }
        result
    }
}
