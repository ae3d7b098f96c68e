//! qBittorrent adapter (torrent style backend).
//!
//! Speaks the WebUI v2 API with cookie-session auth. qBittorrent does not
//! return an id from `torrents/add`, so submission polls the torrent list
//! and matches by name; when no match is found a locally generated
//! placeholder id is recorded and later reconciliation passes self-correct
//! via name matching or orphan pruning.

use crate::config::{ClientKind, DownloadClientConfig};
use crate::error::{Error, Result};
use crate::types::{ClientTestResult, ExternalItem, GrabRequest, RemoteStatus};
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::DownloadClient;

/// How long to wait between add and the poll-and-match pass
const ADD_MATCH_DELAY: Duration = Duration::from_millis(500);

/// Prefix for locally generated placeholder external ids
pub const PLACEHOLDER_ID_PREFIX: &str = "pending-";

/// qBittorrent download client adapter
pub struct QbittorrentClient {
    http: reqwest::Client,
}

impl QbittorrentClient {
    /// Create a new qBittorrent adapter
    pub fn new() -> Self {
        Self {
            http: super::http_client(),
        }
    }

    async fn login(&self, config: &DownloadClientConfig) -> Result<()> {
        let url = format!("{}/api/v2/auth/login", config.base_url());
        let response = self
            .http
            .post(&url)
            .form(&[
                ("username", config.username.as_deref().unwrap_or_default()),
                ("password", config.password.as_deref().unwrap_or_default()),
            ])
            .send()
            .await
            .map_err(|e| Error::Client {
                client: config.name.clone(),
                message: e.to_string(),
            })?;

        let body = response.text().await.unwrap_or_default();
        if body.trim() != "Ok." {
            return Err(Error::Client {
                client: config.name.clone(),
                message: format!("login failed: {}", body.trim()),
            });
        }
        Ok(())
    }

    async fn torrents(&self, config: &DownloadClientConfig) -> Result<Vec<TorrentInfo>> {
        let mut url = format!("{}/api/v2/torrents/info", config.base_url());
        if let Some(category) = &config.category {
            url.push_str(&format!("?category={}", urlencoding::encode(category)));
        }

        let response = self.http.get(&url).send().await.map_err(|e| Error::Client {
            client: config.name.clone(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(Error::Client {
                client: config.name.clone(),
                message: format!("HTTP {}", response.status()),
            });
        }

        response.json().await.map_err(|e| Error::Client {
            client: config.name.clone(),
            message: format!("invalid response body: {e}"),
        })
    }
}

impl Default for QbittorrentClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct TorrentInfo {
    hash: String,
    name: String,
    state: String,
    /// Fraction 0.0-1.0
    progress: f64,
    #[serde(default)]
    size: Option<i64>,
    #[serde(default)]
    eta: Option<i64>,
    #[serde(default)]
    content_path: Option<String>,
    #[serde(default)]
    save_path: Option<String>,
}

impl TorrentInfo {
    fn into_item(self) -> ExternalItem {
        let size = self.size;
        let remaining = size.map(|s| ((1.0 - self.progress) * s as f64) as i64);
        let output_path = self
            .content_path
            .or(self.save_path)
            .map(PathBuf::from);

        ExternalItem {
            external_id: self.hash,
            name: self.name,
            native_status: self.state,
            progress: Some((self.progress * 100.0) as f32),
            size_bytes: size,
            remaining_bytes: remaining,
            // qBittorrent reports 8640000 for "unknown"
            eta_seconds: self.eta.filter(|eta| *eta < 8_640_000),
            output_path,
            error_message: None,
        }
    }
}

/// Generate a placeholder external id for an add without a synchronous id
fn placeholder_id() -> String {
    let suffix: u64 = rand::thread_rng().r#gen();
    format!("{PLACEHOLDER_ID_PREFIX}{suffix:016x}")
}

/// Case-insensitive substring match between a torrent name and release title
///
/// Heuristic; could mismatch under concurrent adds of similarly-named items.
/// See DESIGN.md for the known race.
fn name_matches(torrent_name: &str, title: &str) -> bool {
    let torrent = torrent_name.to_ascii_lowercase();
    let title = title.to_ascii_lowercase();
    torrent.contains(&title) || title.contains(&torrent)
}

#[async_trait]
impl DownloadClient for QbittorrentClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Qbittorrent
    }

    async fn submit(
        &self,
        config: &DownloadClientConfig,
        request: &GrabRequest,
    ) -> Result<String> {
        self.login(config).await?;

        let url = format!("{}/api/v2/torrents/add", config.base_url());
        let mut form = vec![("urls", request.download_url.clone())];
        if let Some(category) = &config.category {
            form.push(("category", category.clone()));
        }

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Client {
                client: config.name.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::Client {
                client: config.name.clone(),
                message: format!("torrents/add returned HTTP {}", response.status()),
            });
        }

        // No id comes back from add; poll shortly after and match by name.
        tokio::time::sleep(ADD_MATCH_DELAY).await;
        let torrents = self.torrents(config).await.unwrap_or_default();
        if let Some(t) = torrents.iter().find(|t| name_matches(&t.name, &request.title)) {
            return Ok(t.hash.clone());
        }

        let placeholder = placeholder_id();
        tracing::debug!(
            client = %config.name,
            title = %request.title,
            placeholder = %placeholder,
            "No torrent matched by name after add; recording placeholder id"
        );
        Ok(placeholder)
    }

    async fn list_queue(&self, config: &DownloadClientConfig) -> Result<Vec<ExternalItem>> {
        self.login(config).await?;
        let torrents = self.torrents(config).await?;
        Ok(torrents.into_iter().map(TorrentInfo::into_item).collect())
    }

    fn map_status(&self, native: &str) -> RemoteStatus {
        match native {
            "downloading" | "stalledDL" | "metaDL" | "forcedDL" | "allocating" => {
                RemoteStatus::Downloading
            }
            "pausedDL" | "stoppedDL" => RemoteStatus::Paused,
            "queuedDL" => RemoteStatus::Queued,
            // A torrent that reached the seeding side is complete for our purposes
            "uploading" | "stalledUP" | "pausedUP" | "stoppedUP" | "queuedUP" | "forcedUP" => {
                RemoteStatus::Completed
            }
            "checkingDL" | "checkingUP" | "checkingResumeData" | "moving" => {
                RemoteStatus::PostProcessing
            }
            "error" | "missingFiles" => RemoteStatus::Failed,
            _ => RemoteStatus::Queued,
        }
    }

    async fn remove(
        &self,
        config: &DownloadClientConfig,
        external_id: &str,
        delete_files: bool,
    ) -> Result<()> {
        // Placeholder ids never reached the backend; nothing to remove there.
        if external_id.starts_with(PLACEHOLDER_ID_PREFIX) {
            return Ok(());
        }

        self.login(config).await?;
        let url = format!("{}/api/v2/torrents/delete", config.base_url());
        let response = self
            .http
            .post(&url)
            .form(&[
                ("hashes", external_id.to_string()),
                ("deleteFiles", delete_files.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Client {
                client: config.name.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::Client {
                client: config.name.clone(),
                message: format!("torrents/delete returned HTTP {}", response.status()),
            });
        }
        Ok(())
    }

    async fn test_connection(&self, config: &DownloadClientConfig) -> ClientTestResult {
        if let Err(e) = self.login(config).await {
            return ClientTestResult::failed(e.to_string());
        }

        let url = format!("{}/api/v2/app/version", config.base_url());
        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let version = response.text().await.ok();
                ClientTestResult::ok(version)
            }
            Ok(response) => ClientTestResult::failed(format!("HTTP {}", response.status())),
            Err(e) => ClientTestResult::failed(e.to_string()),
        }
    }
}
