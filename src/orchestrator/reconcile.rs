//! Per-client reconciliation: backend state into local state machines.

use crate::config::{DownloadClientConfig, HISTORY_FETCH_LIMIT, PATH_PROBE_TIMEOUT};
use crate::db::{Database, Download};
use crate::error::{ImportError, PathProbeFailure, Result};
use crate::import::Importer;
use crate::types::{DownloadId, Event, ExternalItem, MediaRef, RemoteStatus, Status};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::broadcast;

use super::DownloadOrchestrator;

/// Counters for one client's reconciliation pass
#[derive(Debug, Default)]
struct PassSummary {
    updated: usize,
    completed: usize,
    failed: usize,
    pruned: usize,
}

/// Check that a completed download's output path is actually reachable
///
/// Runs on the blocking pool under a timeout so an unresponsive network
/// mount cannot stall the reconciliation pass. Distinguishes a path that
/// never existed (bad path mapping) from a reachable parent with the output
/// missing, and from a filesystem that did not answer at all.
pub(crate) async fn probe_path(path: &Path) -> std::result::Result<(), PathProbeFailure> {
    let probed = path.to_path_buf();
    let probe = tokio::task::spawn_blocking(move || {
        if probed.exists() {
            return Ok(());
        }
        let parent_exists = probed.parent().map(Path::exists).unwrap_or(false);
        if parent_exists {
            Err(PathProbeFailure::MissingFile { path: probed })
        } else {
            Err(PathProbeFailure::NeverExisted { path: probed })
        }
    });

    match tokio::time::timeout(PATH_PROBE_TIMEOUT, probe).await {
        Ok(Ok(result)) => result,
        // Timeout or a killed blocking task both mean the filesystem never answered
        _ => Err(PathProbeFailure::MountUnreachable {
            path: path.to_path_buf(),
            timeout_secs: PATH_PROBE_TIMEOUT.as_secs(),
        }),
    }
}

impl DownloadOrchestrator {
    /// Reconcile local download state against every enabled client
    ///
    /// Clients are polled in parallel; each client's pass is serialized
    /// against itself. One client's failure never aborts the others.
    pub async fn refresh_queue(&self) {
        let configs: Vec<DownloadClientConfig> =
            self.config.enabled_clients().into_iter().cloned().collect();

        let passes = configs.iter().map(|config| self.refresh_client(config));
        let results = join_all(passes).await;

        for (config, result) in configs.iter().zip(results) {
            match result {
                Ok(summary) => tracing::info!(
                    client = %config.name,
                    updated = summary.updated,
                    completed = summary.completed,
                    failed = summary.failed,
                    pruned = summary.pruned,
                    "Reconciliation pass finished"
                ),
                Err(e) => tracing::warn!(
                    client = %config.name,
                    error = %e,
                    "Reconciliation pass failed"
                ),
            }
        }
    }

    async fn refresh_client(&self, config: &DownloadClientConfig) -> Result<PassSummary> {
        let lock = self.client_lock(config.id);
        let _guard = lock.lock().await;
        let adapter = self.adapter_for(config)?;

        let local = self.db.list_for_client(config.id).await?;
        let queue = adapter.list_queue(config).await?;
        let history = match adapter.list_history(config, HISTORY_FETCH_LIMIT).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(client = %config.name, error = %e, "History listing failed");
                Vec::new()
            }
        };

        let by_external: HashMap<&str, &Download> = local
            .iter()
            .filter_map(|d| d.external_id.as_deref().map(|ext| (ext, d)))
            .collect();

        let mut summary = PassSummary::default();
        let mut seen: HashSet<&str> = HashSet::new();

        for item in queue.iter().chain(history.iter()) {
            // Queue items shadow history entries under the same id
            if !seen.insert(item.external_id.as_str()) {
                continue;
            }
            let Some(download) = by_external.get(item.external_id.as_str()) else {
                continue;
            };
            if download.status().is_terminal() {
                continue;
            }

            match adapter.map_status(&item.native_status) {
                RemoteStatus::Queued => {
                    self.apply_progress(download, item, Status::Queued).await?;
                    summary.updated += 1;
                }
                RemoteStatus::Downloading => {
                    self.apply_progress(download, item, Status::Downloading).await?;
                    summary.updated += 1;
                }
                RemoteStatus::Paused => {
                    self.apply_progress(download, item, Status::Paused).await?;
                    summary.updated += 1;
                }
                RemoteStatus::PostProcessing => {
                    // Backend is verifying/unpacking; surfaces as importing
                    // but import itself waits for the completion report.
                    self.apply_progress(download, item, Status::Importing).await?;
                    summary.updated += 1;
                }
                RemoteStatus::Completed => {
                    if self.handle_completion(config, download, item).await? {
                        summary.completed += 1;
                    }
                }
                RemoteStatus::Failed => {
                    if self.handle_failure(download, item).await? {
                        summary.failed += 1;
                    }
                }
            }
        }

        // Orphan pruning: submitted rows the backend no longer knows about
        for download in &local {
            let Some(external_id) = download.external_id.as_deref() else {
                continue;
            };
            if seen.contains(external_id) {
                continue;
            }
            if !matches!(
                download.status(),
                Status::Queued | Status::Downloading | Status::Paused
            ) {
                continue;
            }

            let id = DownloadId(download.id);
            tracing::info!(
                download_id = id.0,
                client = %config.name,
                external_id,
                "Download no longer known to the backend; removing"
            );
            self.db.delete_download(id).await?;
            self.emit(Event::Removed { id });
            summary.pruned += 1;
        }

        Ok(summary)
    }

    async fn apply_progress(
        &self,
        download: &Download,
        item: &ExternalItem,
        status: Status,
    ) -> Result<()> {
        self.db
            .update_remote_progress(
                DownloadId(download.id),
                status,
                item.progress.unwrap_or(download.progress),
                item.remaining_bytes,
                item.eta_seconds,
            )
            .await
    }

    /// Handle a backend-reported completion; returns whether anything changed
    async fn handle_completion(
        &self,
        config: &DownloadClientConfig,
        download: &Download,
        item: &ExternalItem,
    ) -> Result<bool> {
        let id = DownloadId(download.id);

        let Some(reported) = item.output_path.as_ref() else {
            let error = PathProbeFailure::NoPathReported.to_string();
            if self.db.mark_failed(id, &error).await? {
                tracing::warn!(download_id = id.0, error = %error, "Completion without a path");
                self.emit(Event::DownloadFailed { id, error });
                return Ok(true);
            }
            return Ok(false);
        };

        let local_path = config.map_remote_path(reported);
        if let Err(probe) = probe_path(&local_path).await {
            self.db
                .set_output_path(id, &local_path.to_string_lossy())
                .await?;
            let error = probe.to_string();
            if self.db.mark_failed(id, &error).await? {
                tracing::warn!(
                    download_id = id.0,
                    path = %local_path.display(),
                    error = %error,
                    "Completed download's path is inaccessible; failing without import"
                );
                self.emit(Event::DownloadFailed { id, error });
                return Ok(true);
            }
            return Ok(false);
        }

        if self
            .db
            .claim_for_import(id, &local_path.to_string_lossy())
            .await?
        {
            self.emit(Event::DownloadCompleted {
                id,
                path: local_path.clone(),
            });
            self.dispatch_import(id, download.media_ref(), local_path);
            return Ok(true);
        }

        // Already claimed. Re-dispatch only for a claimed row whose import
        // never concluded (interrupted process); the in-flight set keeps a
        // live import from being doubled.
        if download.status() == Status::Importing
            && download.completed_at.is_some()
            && download.output_path.is_some()
        {
            self.dispatch_import(id, download.media_ref(), local_path);
        }
        Ok(false)
    }

    fn dispatch_import(&self, id: DownloadId, media: Option<MediaRef>, path: PathBuf) {
        if !self.begin_import(id) {
            return;
        }
        let task = ImportTask {
            db: self.db.clone(),
            importer: self.importer.clone(),
            events: self.events.clone(),
            active_imports: self.active_imports.clone(),
        };
        tokio::spawn(async move {
            task.run(id, media, path).await;
        });
    }

    /// Handle a backend-reported failure; returns whether anything changed
    async fn handle_failure(&self, download: &Download, item: &ExternalItem) -> Result<bool> {
        let id = DownloadId(download.id);
        let message = item.error_message.clone().unwrap_or_else(|| {
            format!("download client reported failure ({})", item.native_status)
        });

        if !self.db.mark_failed(id, &message).await? {
            return Ok(false);
        }
        tracing::warn!(download_id = id.0, error = %message, "Download failed on the backend");
        self.emit(Event::DownloadFailed {
            id,
            error: message.clone(),
        });

        let Some(media) = download.media_ref() else {
            return Ok(true);
        };

        if crate::blacklist::should_blacklist(&message) {
            // The retry budget is counted in blacklist entries, so only a
            // failure that can record one may trigger a search; a guid-less
            // release would otherwise retry without bound.
            let Some(guid) = download.release_guid.as_deref() else {
                tracing::debug!(
                    media = %media,
                    "Failure carries no release guid; not blacklisting or retrying"
                );
                return Ok(true);
            };

            let failure_type = crate::blacklist::determine_failure_type(&message);
            // Budget is counted before this failure's entry lands
            let exhausted = self.classifier.has_exceeded_retries(&media).await?;

            self.classifier
                .blacklist(
                    &media,
                    guid,
                    download.release_indexer.as_deref(),
                    &message,
                    failure_type,
                )
                .await?;
            self.emit(Event::Blacklisted {
                guid: guid.to_string(),
                indexer: download.release_indexer.clone(),
                failure_type,
                reason: message.clone(),
            });

            if exhausted {
                tracing::info!(
                    media = %media,
                    "Automatic retry budget exhausted; not searching for an alternative"
                );
            } else {
                self.spawn_alternative_search(media);
            }
        }

        Ok(true)
    }
}

/// One detached import run, owning clones of the orchestrator's parts
///
/// Carrying the clones instead of the orchestrator keeps the spawned task
/// free of any reference back into it.
struct ImportTask {
    db: Arc<Database>,
    importer: Arc<dyn Importer>,
    events: broadcast::Sender<Event>,
    active_imports: Arc<StdMutex<HashSet<DownloadId>>>,
}

impl ImportTask {
    async fn run(&self, id: DownloadId, media: Option<MediaRef>, path: PathBuf) {
        let result = self.run_inner(id, media, &path).await;
        // Lock poisoning is unrecoverable here; panicking is the right outcome.
        #[allow(clippy::unwrap_used)]
        self.active_imports.lock().unwrap().remove(&id);

        if let Err(e) = result {
            let error = e.to_string();
            tracing::warn!(download_id = id.0, error = %error, "Import failed");
            if let Err(db_err) = self.db.mark_failed(id, &error).await {
                tracing::error!(
                    download_id = id.0,
                    error = %db_err,
                    "Failed to record import failure"
                );
            }
            self.events.send(Event::ImportFailed { id, error }).ok();
        }
    }

    async fn run_inner(&self, id: DownloadId, media: Option<MediaRef>, path: &Path) -> Result<()> {
        // A redispatched task can lose the race against the import it was
        // meant to recover; only a row still importing is acted on.
        let Some(current) = self.db.get_download(id).await? else {
            return Ok(());
        };
        if current.status() != Status::Importing {
            tracing::debug!(download_id = id.0, "Import dispatch is stale; skipping");
            return Ok(());
        }

        let Some(media) = media else {
            return Err(ImportError::UnknownMediaType { id: id.0 }.into());
        };

        let outcome = self.importer.import(&media, path).await?;
        if !outcome.success {
            return Err(ImportError::NoFilesImported {
                path: path.to_path_buf(),
                reasons: outcome.errors.join("; "),
            }
            .into());
        }

        self.db.mark_completed(id).await?;
        tracing::info!(
            download_id = id.0,
            media = %media,
            files_imported = outcome.files_imported,
            "Import finished"
        );
        self.events
            .send(Event::ImportCompleted {
                id,
                files_imported: outcome.files_imported,
            })
            .ok();
        Ok(())
    }
}
