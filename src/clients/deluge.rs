//! Deluge adapter (torrent style backend).
//!
//! Speaks the Deluge web-UI JSON-RPC interface at `/json`. Every session
//! starts with `auth.login`; the web UI then keys the session on a cookie,
//! which the shared HTTP client stores.

use crate::config::{ClientKind, DownloadClientConfig};
use crate::error::{Error, Result};
use crate::types::{ClientTestResult, ExternalItem, GrabRequest, RemoteStatus};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;

use super::DownloadClient;

/// Deluge download client adapter
pub struct DelugeClient {
    http: reqwest::Client,
}

impl DelugeClient {
    /// Create a new Deluge adapter
    pub fn new() -> Self {
        Self {
            http: super::http_client(),
        }
    }

    async fn rpc<T: for<'de> Deserialize<'de>>(
        &self,
        config: &DownloadClientConfig,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/json", config.base_url());
        let response = self
            .http
            .post(&url)
            .json(&json!({
                "method": method,
                "params": params,
                "id": 1,
            }))
            .send()
            .await
            .map_err(|e| Error::Client {
                client: config.name.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::Client {
                client: config.name.clone(),
                message: format!("HTTP {}", response.status()),
            });
        }

        #[derive(Deserialize)]
        struct RpcEnvelope<T> {
            result: Option<T>,
            #[serde(default)]
            error: Option<RpcError>,
        }

        #[derive(Deserialize)]
        struct RpcError {
            message: String,
        }

        let envelope: RpcEnvelope<T> =
            response.json().await.map_err(|e| Error::Client {
                client: config.name.clone(),
                message: format!("invalid response body: {e}"),
            })?;

        if let Some(error) = envelope.error {
            return Err(Error::Client {
                client: config.name.clone(),
                message: error.message,
            });
        }

        envelope.result.ok_or_else(|| Error::Client {
            client: config.name.clone(),
            message: format!("{method} returned no result"),
        })
    }

    async fn login(&self, config: &DownloadClientConfig) -> Result<()> {
        let password = config.password.as_deref().unwrap_or_default();
        let authed: bool = self.rpc(config, "auth.login", json!([password])).await?;
        if !authed {
            return Err(Error::Client {
                client: config.name.clone(),
                message: "auth.login rejected the password".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for DelugeClient {
    fn default() -> Self {
        Self::new()
    }
}

const TORRENT_FIELDS: [&str; 8] = [
    "name",
    "state",
    "progress",
    "total_size",
    "total_done",
    "eta",
    "save_path",
    "message",
];

#[derive(Debug, Deserialize)]
struct TorrentStatus {
    name: String,
    state: String,
    // 0-100 already
    progress: f64,
    #[serde(default)]
    total_size: Option<i64>,
    #[serde(default)]
    total_done: Option<i64>,
    #[serde(default)]
    eta: Option<i64>,
    #[serde(default)]
    save_path: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl TorrentStatus {
    fn into_item(self, hash: String) -> ExternalItem {
        let remaining = match (self.total_size, self.total_done) {
            (Some(size), Some(done)) => Some((size - done).max(0)),
            _ => None,
        };
        let output_path = self
            .save_path
            .map(|dir| PathBuf::from(dir).join(&self.name));
        let failed = self.state == "Error";

        ExternalItem {
            external_id: hash,
            name: self.name,
            native_status: self.state,
            progress: Some(self.progress as f32),
            size_bytes: self.total_size,
            remaining_bytes: remaining,
            eta_seconds: self.eta.filter(|eta| *eta > 0),
            output_path,
            error_message: failed.then(|| {
                self.message
                    .unwrap_or_else(|| "torrent in error state".to_string())
            }),
        }
    }
}

#[async_trait]
impl DownloadClient for DelugeClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Deluge
    }

    async fn submit(
        &self,
        config: &DownloadClientConfig,
        request: &GrabRequest,
    ) -> Result<String> {
        self.login(config).await?;

        let mut options = json!({});
        if let Some(category) = &config.category {
            options["label"] = json!(category);
        }

        let method = if request.download_url.starts_with("magnet:") {
            "core.add_torrent_magnet"
        } else {
            "core.add_torrent_url"
        };

        let hash: Option<String> = self
            .rpc(config, method, json!([request.download_url, options]))
            .await?;

        hash.ok_or_else(|| Error::Client {
            client: config.name.clone(),
            message: format!("{method} returned no torrent hash"),
        })
    }

    async fn list_queue(&self, config: &DownloadClientConfig) -> Result<Vec<ExternalItem>> {
        self.login(config).await?;

        let torrents: HashMap<String, TorrentStatus> = self
            .rpc(
                config,
                "core.get_torrents_status",
                json!([{}, TORRENT_FIELDS]),
            )
            .await?;

        Ok(torrents
            .into_iter()
            .map(|(hash, status)| status.into_item(hash))
            .collect())
    }

    fn map_status(&self, native: &str) -> RemoteStatus {
        match native {
            "Downloading" | "Active" => RemoteStatus::Downloading,
            "Paused" => RemoteStatus::Paused,
            "Queued" | "Allocating" => RemoteStatus::Queued,
            "Checking" | "Moving" => RemoteStatus::PostProcessing,
            "Seeding" => RemoteStatus::Completed,
            "Error" => RemoteStatus::Failed,
            _ => RemoteStatus::Queued,
        }
    }

    async fn remove(
        &self,
        config: &DownloadClientConfig,
        external_id: &str,
        delete_files: bool,
    ) -> Result<()> {
        self.login(config).await?;
        let _: bool = self
            .rpc(
                config,
                "core.remove_torrent",
                json!([external_id, delete_files]),
            )
            .await?;
        Ok(())
    }

    async fn test_connection(&self, config: &DownloadClientConfig) -> ClientTestResult {
        if let Err(e) = self.login(config).await {
            return ClientTestResult::failed(e.to_string());
        }
        match self
            .rpc::<String>(config, "daemon.get_version", json!([]))
            .await
        {
            Ok(version) => ClientTestResult::ok(Some(version)),
            Err(e) => ClientTestResult::failed(e.to_string()),
        }
    }
}
