//! NZBGet adapter (usenet-queue style backend).
//!
//! Speaks the JSON-RPC interface at `/jsonrpc`. NZBGet reports queue groups
//! and history separately; numeric NZB ids are carried as strings.

use crate::config::{ClientKind, DownloadClientConfig};
use crate::error::{Error, Result};
use crate::types::{ClientTestResult, ExternalItem, GrabRequest, RemoteStatus};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

use super::DownloadClient;

/// NZBGet download client adapter
pub struct NzbgetClient {
    http: reqwest::Client,
}

impl NzbgetClient {
    /// Create a new NZBGet adapter
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
        let url = format!("{}/jsonrpc", config.base_url());
        let mut request = self.http.post(&url).json(&json!({
            "method": method,
            "params": params,
            "id": 1,
        }));

        if let Some(username) = &config.username {
            request = request.basic_auth(username, config.password.as_deref());
        }

        let response = request.send().await.map_err(|e| Error::Client {
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
            error: Option<serde_json::Value>,
        }

        let envelope: RpcEnvelope<T> =
            response.json().await.map_err(|e| Error::Client {
                client: config.name.clone(),
                message: format!("invalid response body: {e}"),
            })?;

        if let Some(error) = envelope.error {
            return Err(Error::Client {
                client: config.name.clone(),
                message: error.to_string(),
            });
        }

        envelope.result.ok_or_else(|| Error::Client {
            client: config.name.clone(),
            message: format!("{method} returned no result"),
        })
    }
}

impl Default for NzbgetClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueueGroup {
    #[serde(rename = "NZBID")]
    nzb_id: i64,
    #[serde(rename = "NZBName")]
    nzb_name: String,
    status: String,
    #[serde(rename = "FileSizeMB", default)]
    file_size_mb: i64,
    #[serde(rename = "RemainingSizeMB", default)]
    remaining_size_mb: i64,
    #[serde(default)]
    dest_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HistoryGroup {
    #[serde(rename = "NZBID")]
    nzb_id: i64,
    name: String,
    status: String,
    #[serde(rename = "FileSizeMB", default)]
    file_size_mb: i64,
    #[serde(default)]
    dest_dir: Option<String>,
}

impl QueueGroup {
    fn into_item(self) -> ExternalItem {
        let size = self.file_size_mb * 1024 * 1024;
        let remaining = self.remaining_size_mb * 1024 * 1024;
        let progress = if size > 0 {
            Some(((size - remaining) as f32 / size as f32) * 100.0)
        } else {
            None
        };

        ExternalItem {
            external_id: self.nzb_id.to_string(),
            name: self.nzb_name,
            native_status: self.status,
            progress,
            size_bytes: Some(size),
            remaining_bytes: Some(remaining),
            eta_seconds: None,
            output_path: self.dest_dir.map(PathBuf::from),
            error_message: None,
        }
    }
}

impl HistoryGroup {
    fn into_item(self) -> ExternalItem {
        // History statuses look like "SUCCESS/ALL" or "FAILURE/UNPACK"
        let failed = self.status.starts_with("FAILURE") || self.status.starts_with("DELETED");
        ExternalItem {
            external_id: self.nzb_id.to_string(),
            name: self.name,
            native_status: self.status.clone(),
            progress: None,
            size_bytes: Some(self.file_size_mb * 1024 * 1024),
            remaining_bytes: Some(0),
            eta_seconds: None,
            output_path: self.dest_dir.map(PathBuf::from),
            error_message: failed.then(|| self.status),
        }
    }
}

#[async_trait]
impl DownloadClient for NzbgetClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Nzbget
    }

    async fn submit(
        &self,
        config: &DownloadClientConfig,
        request: &GrabRequest,
    ) -> Result<String> {
        let category = config.category.as_deref().unwrap_or_default();
        // append(NZBFilename, Content, Category, Priority, AddToTop, AddPaused,
        //        DupeKey, DupeScore, DupeMode, PPParameters)
        let id: i64 = self
            .rpc(
                config,
                "append",
                json!([
                    format!("{}.nzb", request.title),
                    request.download_url,
                    category,
                    0,
                    false,
                    false,
                    "",
                    0,
                    "SCORE",
                    []
                ]),
            )
            .await?;

        if id <= 0 {
            return Err(Error::Client {
                client: config.name.clone(),
                message: format!("append rejected the NZB (returned {id})"),
            });
        }

        Ok(id.to_string())
    }

    async fn list_queue(&self, config: &DownloadClientConfig) -> Result<Vec<ExternalItem>> {
        let groups: Vec<QueueGroup> = self.rpc(config, "listgroups", json!([0])).await?;
        Ok(groups.into_iter().map(QueueGroup::into_item).collect())
    }

    async fn list_history(
        &self,
        config: &DownloadClientConfig,
        limit: usize,
    ) -> Result<Vec<ExternalItem>> {
        let groups: Vec<HistoryGroup> = self.rpc(config, "history", json!([false])).await?;
        Ok(groups
            .into_iter()
            .take(limit)
            .map(HistoryGroup::into_item)
            .collect())
    }

    fn map_status(&self, native: &str) -> RemoteStatus {
        let native = native.to_ascii_uppercase();
        if native.starts_with("SUCCESS") {
            return RemoteStatus::Completed;
        }
        if native.starts_with("FAILURE") || native.starts_with("DELETED") {
            return RemoteStatus::Failed;
        }

        match native.as_str() {
            "DOWNLOADING" | "FETCHING" => RemoteStatus::Downloading,
            "PAUSED" => RemoteStatus::Paused,
            "QUEUED" => RemoteStatus::Queued,
            "VERIFYING" | "REPAIRING" | "UNPACKING" | "MOVING" | "EXECUTING_SCRIPT"
            | "PP_QUEUED" | "LOADING_PARS" | "RENAMING" => RemoteStatus::PostProcessing,
            _ => RemoteStatus::Queued,
        }
    }

    async fn remove(
        &self,
        config: &DownloadClientConfig,
        external_id: &str,
        delete_files: bool,
    ) -> Result<()> {
        let id: i64 = external_id.parse().map_err(|_| Error::Client {
            client: config.name.clone(),
            message: format!("invalid NZBGet id '{external_id}'"),
        })?;

        // FinalDelete is the no-trace variant that also discards files
        let command = if delete_files {
            "GroupFinalDelete"
        } else {
            "GroupDelete"
        };
        let _: bool = self
            .rpc(config, "editqueue", json!([command, 0, "", [id]]))
            .await?;
        // Also clear any history entry under the same id
        let history_command = if delete_files {
            "HistoryFinalDelete"
        } else {
            "HistoryDelete"
        };
        let _: bool = self
            .rpc(config, "editqueue", json!([history_command, 0, "", [id]]))
            .await
            .unwrap_or(false);

        Ok(())
    }

    async fn test_connection(&self, config: &DownloadClientConfig) -> ClientTestResult {
        match self.rpc::<String>(config, "version", json!([])).await {
            Ok(version) => ClientTestResult::ok(Some(version)),
            Err(e) => ClientTestResult::failed(e.to_string()),
        }
    }
}
