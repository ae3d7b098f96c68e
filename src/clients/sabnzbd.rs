//! SABnzbd adapter (usenet-queue style backend).
//!
//! Speaks the `api?mode=...` JSON interface. SABnzbd separates the live
//! queue from history, so completion and failure usually surface through
//! `mode=history`.

use crate::config::{ClientKind, DownloadClientConfig};
use crate::error::{Error, Result};
use crate::types::{ClientTestResult, ExternalItem, GrabRequest, RemoteStatus};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

use super::DownloadClient;

/// SABnzbd download client adapter
pub struct SabnzbdClient {
    http: reqwest::Client,
}

impl SabnzbdClient {
    /// Create a new SABnzbd adapter
    pub fn new() -> Self {
        Self {
            http: super::http_client(),
        }
    }

    fn api_url(&self, config: &DownloadClientConfig, mode: &str, extra: &str) -> String {
        let apikey = config.api_key.as_deref().unwrap_or_default();
        format!(
            "{}/api?mode={mode}&output=json&apikey={}{extra}",
            config.base_url(),
            urlencoding::encode(apikey),
        )
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        config: &DownloadClientConfig,
        url: &str,
    ) -> Result<T> {
        let response = self.http.get(url).send().await.map_err(|e| Error::Client {
            client: config.name.clone(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(Error::Client {
                client: config.name.clone(),
                message: format!("HTTP {}", response.status()),
            });
        }

        response.json::<T>().await.map_err(|e| Error::Client {
            client: config.name.clone(),
            message: format!("invalid response body: {e}"),
        })
    }
}

impl Default for SabnzbdClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    status: bool,
    #[serde(default)]
    nzo_ids: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    queue: QueueBody,
}

#[derive(Debug, Deserialize)]
struct QueueBody {
    #[serde(default)]
    slots: Vec<QueueSlot>,
}

#[derive(Debug, Deserialize)]
struct QueueSlot {
    nzo_id: String,
    filename: String,
    status: String,
    #[serde(default)]
    mb: Option<String>,
    #[serde(default)]
    mbleft: Option<String>,
    #[serde(default)]
    timeleft: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    history: HistoryBody,
}

#[derive(Debug, Deserialize)]
struct HistoryBody {
    #[serde(default)]
    slots: Vec<HistorySlot>,
}

#[derive(Debug, Deserialize)]
struct HistorySlot {
    nzo_id: String,
    name: String,
    status: String,
    #[serde(default)]
    bytes: Option<i64>,
    #[serde(default)]
    storage: Option<String>,
    #[serde(default)]
    fail_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

fn parse_megabytes(value: Option<&str>) -> Option<i64> {
    value
        .and_then(|v| v.parse::<f64>().ok())
        .map(|mb| (mb * 1024.0 * 1024.0) as i64)
}

/// "0:12:34" -> seconds
fn parse_timeleft(value: Option<&str>) -> Option<i64> {
    let value = value?;
    let mut seconds: i64 = 0;
    for part in value.split(':') {
        seconds = seconds * 60 + part.parse::<i64>().ok()?;
    }
    Some(seconds)
}

impl QueueSlot {
    fn into_item(self) -> ExternalItem {
        let size = parse_megabytes(self.mb.as_deref());
        let remaining = parse_megabytes(self.mbleft.as_deref());
        let progress = match (size, remaining) {
            (Some(size), Some(remaining)) if size > 0 => {
                Some(((size - remaining) as f32 / size as f32) * 100.0)
            }
            _ => None,
        };

        ExternalItem {
            external_id: self.nzo_id,
            name: self.filename,
            native_status: self.status,
            progress,
            size_bytes: size,
            remaining_bytes: remaining,
            eta_seconds: parse_timeleft(self.timeleft.as_deref()),
            output_path: None,
            error_message: None,
        }
    }
}

impl HistorySlot {
    fn into_item(self) -> ExternalItem {
        ExternalItem {
            external_id: self.nzo_id,
            name: self.name,
            native_status: self.status,
            progress: None,
            size_bytes: self.bytes,
            remaining_bytes: Some(0),
            eta_seconds: None,
            output_path: self.storage.map(PathBuf::from),
            error_message: self.fail_message.filter(|m| !m.is_empty()),
        }
    }
}

#[async_trait]
impl DownloadClient for SabnzbdClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Sabnzbd
    }

    async fn submit(
        &self,
        config: &DownloadClientConfig,
        request: &GrabRequest,
    ) -> Result<String> {
        let mut extra = format!(
            "&name={}&nzbname={}",
            urlencoding::encode(&request.download_url),
            urlencoding::encode(&request.title),
        );
        if let Some(category) = &config.category {
            extra.push_str(&format!("&cat={}", urlencoding::encode(category)));
        }

        let url = self.api_url(config, "addurl", &extra);
        let response: AddResponse = self.get_json(config, &url).await?;

        if !response.status {
            return Err(Error::Client {
                client: config.name.clone(),
                message: response
                    .error
                    .unwrap_or_else(|| "addurl rejected".to_string()),
            });
        }

        response.nzo_ids.into_iter().next().ok_or_else(|| Error::Client {
            client: config.name.clone(),
            message: "addurl returned no nzo_id".to_string(),
        })
    }

    async fn list_queue(&self, config: &DownloadClientConfig) -> Result<Vec<ExternalItem>> {
        let url = self.api_url(config, "queue", "");
        let response: QueueResponse = self.get_json(config, &url).await?;
        Ok(response
            .queue
            .slots
            .into_iter()
            .map(QueueSlot::into_item)
            .collect())
    }

    async fn list_history(
        &self,
        config: &DownloadClientConfig,
        limit: usize,
    ) -> Result<Vec<ExternalItem>> {
        let url = self.api_url(config, "history", &format!("&start=0&limit={limit}"));
        let response: HistoryResponse = self.get_json(config, &url).await?;
        Ok(response
            .history
            .slots
            .into_iter()
            .map(HistorySlot::into_item)
            .collect())
    }

    fn map_status(&self, native: &str) -> RemoteStatus {
        match native.to_ascii_lowercase().as_str() {
            "downloading" | "fetching" => RemoteStatus::Downloading,
            "paused" => RemoteStatus::Paused,
            "queued" | "grabbing" | "propagating" => RemoteStatus::Queued,
            "verifying" | "repairing" | "extracting" | "moving" | "running" | "quickcheck" => {
                RemoteStatus::PostProcessing
            }
            "completed" => RemoteStatus::Completed,
            "failed" => RemoteStatus::Failed,
            _ => RemoteStatus::Queued,
        }
    }

    async fn remove(
        &self,
        config: &DownloadClientConfig,
        external_id: &str,
        delete_files: bool,
    ) -> Result<()> {
        let del_files = if delete_files { 1 } else { 0 };
        // The item may be in either the queue or history; remove from both.
        let queue_url = self.api_url(
            config,
            "queue",
            &format!(
                "&name=delete&value={}&del_files={del_files}",
                urlencoding::encode(external_id)
            ),
        );
        let history_url = self.api_url(
            config,
            "history",
            &format!(
                "&name=delete&value={}&del_files={del_files}",
                urlencoding::encode(external_id)
            ),
        );

        self.get_json::<serde_json::Value>(config, &queue_url).await?;
        self.get_json::<serde_json::Value>(config, &history_url).await?;
        Ok(())
    }

    async fn test_connection(&self, config: &DownloadClientConfig) -> ClientTestResult {
        let url = self.api_url(config, "version", "");
        match self.get_json::<VersionResponse>(config, &url).await {
            Ok(response) => ClientTestResult::ok(Some(response.version)),
            Err(e) => ClientTestResult::failed(e.to_string()),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> DownloadClientConfig {
        let url = url::Url::parse(&server.uri()).unwrap();
        DownloadClientConfig {
            id: 1,
            kind: ClientKind::Sabnzbd,
            name: "sab".into(),
            enabled: true,
            priority: 0,
            host: url.host_str().unwrap().to_string(),
            port: url.port().unwrap(),
            use_tls: false,
            url_base: None,
            username: None,
            password: None,
            api_key: Some("secret".into()),
            category: Some("tv".into()),
            path_mapping: None,
        }
    }

    #[test]
    fn status_map_is_total_and_defaults_to_queued() {
        let client = SabnzbdClient::new();
        assert_eq!(client.map_status("Downloading"), RemoteStatus::Downloading);
        assert_eq!(client.map_status("Extracting"), RemoteStatus::PostProcessing);
        assert_eq!(client.map_status("Repairing"), RemoteStatus::PostProcessing);
        assert_eq!(client.map_status("Completed"), RemoteStatus::Completed);
        assert_eq!(client.map_status("Failed"), RemoteStatus::Failed);
        assert_eq!(client.map_status("Paused"), RemoteStatus::Paused);
        assert_eq!(
            client.map_status("SomethingNew"),
            RemoteStatus::Queued,
            "unknown statuses must default to Queued, never error"
        );
    }

    #[test]
    fn timeleft_parses_hms() {
        assert_eq!(parse_timeleft(Some("0:12:34")), Some(754));
        assert_eq!(parse_timeleft(Some("10")), Some(10));
        assert_eq!(parse_timeleft(Some("junk")), None);
        assert_eq!(parse_timeleft(None), None);
    }

    #[tokio::test]
    async fn submit_returns_nzo_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(query_param("mode", "addurl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "nzo_ids": ["SABnzbd_nzo_abc123"]
            })))
            .mount(&server)
            .await;

        let client = SabnzbdClient::new();
        let request = GrabRequest {
            title: "Show.S01E02.1080p".into(),
            download_url: "https://indexer.example/release.nzb".into(),
            size_bytes: None,
            media: crate::types::MediaRef::Episode {
                episode_id: "e1".into(),
                tv_show_id: None,
            },
            guid: None,
            indexer: None,
        };

        let id = client.submit(&config_for(&server), &request).await.unwrap();
        assert_eq!(id, "SABnzbd_nzo_abc123");
    }

    #[tokio::test]
    async fn submit_surfaces_backend_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": false,
                "error": "invalid api key"
            })))
            .mount(&server)
            .await;

        let client = SabnzbdClient::new();
        let request = GrabRequest {
            title: "X".into(),
            download_url: "https://indexer.example/x.nzb".into(),
            size_bytes: None,
            media: crate::types::MediaRef::Movie {
                movie_id: "m1".into(),
            },
            guid: None,
            indexer: None,
        };

        let err = client
            .submit(&config_for(&server), &request)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid api key"));
    }

    #[tokio::test]
    async fn queue_and_history_items_carry_ids_and_paths() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(query_param("mode", "queue"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "queue": { "slots": [{
                    "nzo_id": "nzo_1",
                    "filename": "Show.S01E02",
                    "status": "Downloading",
                    "mb": "1000.0",
                    "mbleft": "250.0",
                    "timeleft": "0:05:00"
                }]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(query_param("mode", "history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "history": { "slots": [{
                    "nzo_id": "nzo_2",
                    "name": "Movie.2024",
                    "status": "Completed",
                    "bytes": 123456789,
                    "storage": "/data/complete/Movie.2024"
                }]}
            })))
            .mount(&server)
            .await;

        let client = SabnzbdClient::new();
        let config = config_for(&server);

        let queue = client.list_queue(&config).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].external_id, "nzo_1");
        assert_eq!(queue[0].progress, Some(75.0));
        assert_eq!(queue[0].eta_seconds, Some(300));

        let history = client.list_history(&config, 50).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].external_id, "nzo_2");
        assert_eq!(
            history[0].output_path,
            Some(PathBuf::from("/data/complete/Movie.2024"))
        );
    }
}
