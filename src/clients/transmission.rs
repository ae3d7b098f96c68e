//! Transmission adapter (torrent style backend).
//!
//! Speaks the Transmission RPC protocol, including the CSRF session-id
//! handshake (a 409 response carries the `X-Transmission-Session-Id` header
//! and the request is retried once). Numeric torrent statuses are rendered
//! to stable strings before status mapping so the adapter contract stays
//! uniform.

use crate::config::{ClientKind, DownloadClientConfig};
use crate::error::{Error, Result};
use crate::types::{ClientTestResult, ExternalItem, GrabRequest, RemoteStatus};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tokio::sync::Mutex;

use super::DownloadClient;

const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";

/// Transmission download client adapter
pub struct TransmissionClient {
    http: reqwest::Client,
    session_id: Mutex<Option<String>>,
}

impl TransmissionClient {
    /// Create a new Transmission adapter
    pub fn new() -> Self {
        Self {
            http: super::http_client(),
            session_id: Mutex::new(None),
        }
    }

    fn rpc_url(config: &DownloadClientConfig) -> String {
        format!("{}/rpc", config.base_url())
    }

    async fn rpc<T: for<'de> Deserialize<'de>>(
        &self,
        config: &DownloadClientConfig,
        method: &str,
        arguments: serde_json::Value,
    ) -> Result<T> {
        let body = json!({ "method": method, "arguments": arguments });

        // First attempt with the cached session id, retry once on 409
        for _ in 0..2 {
            let mut request = self.http.post(Self::rpc_url(config)).json(&body);
            if let Some(username) = &config.username {
                request = request.basic_auth(username, config.password.as_deref());
            }
            if let Some(session_id) = self.session_id.lock().await.clone() {
                request = request.header(SESSION_ID_HEADER, session_id);
            }

            let response = request.send().await.map_err(|e| Error::Client {
                client: config.name.clone(),
                message: e.to_string(),
            })?;

            if response.status() == reqwest::StatusCode::CONFLICT {
                let new_id = response
                    .headers()
                    .get(SESSION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                *self.session_id.lock().await = new_id;
                continue;
            }

            if !response.status().is_success() {
                return Err(Error::Client {
                    client: config.name.clone(),
                    message: format!("HTTP {}", response.status()),
                });
            }

            #[derive(Deserialize)]
            struct RpcEnvelope<T> {
                result: String,
                arguments: Option<T>,
            }

            let envelope: RpcEnvelope<T> =
                response.json().await.map_err(|e| Error::Client {
                    client: config.name.clone(),
                    message: format!("invalid response body: {e}"),
                })?;

            if envelope.result != "success" {
                return Err(Error::Client {
                    client: config.name.clone(),
                    message: envelope.result,
                });
            }

            return envelope.arguments.ok_or_else(|| Error::Client {
                client: config.name.clone(),
                message: format!("{method} returned no arguments"),
            });
        }

        Err(Error::Client {
            client: config.name.clone(),
            message: "session-id handshake did not converge".to_string(),
        })
    }
}

impl Default for TransmissionClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Render Transmission's numeric status to a stable string for `map_status`
fn status_string(status: i64, percent_done: f64, error_string: Option<&str>) -> &'static str {
    if error_string.is_some_and(|e| !e.is_empty()) {
        return "error";
    }
    match status {
        0 => {
            if percent_done >= 1.0 {
                "finished"
            } else {
                "stopped"
            }
        }
        1 | 2 => "checking",
        3 => "queued",
        4 => "downloading",
        5 | 6 => "seeding",
        _ => "unknown",
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Torrent {
    #[serde(default)]
    hash_string: String,
    name: String,
    status: i64,
    percent_done: f64,
    #[serde(default)]
    total_size: Option<i64>,
    #[serde(default)]
    eta: Option<i64>,
    #[serde(default)]
    download_dir: Option<String>,
    #[serde(default)]
    error_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TorrentList {
    torrents: Vec<Torrent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct AddedTorrent {
    #[serde(default)]
    torrent_added: Option<TorrentRef>,
    #[serde(default)]
    torrent_duplicate: Option<TorrentRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TorrentRef {
    hash_string: String,
}

#[derive(Debug, Deserialize)]
struct SessionInfo {
    #[serde(default)]
    version: Option<String>,
}

impl Torrent {
    fn into_item(self) -> ExternalItem {
        let native = status_string(
            self.status,
            self.percent_done,
            self.error_string.as_deref(),
        );
        let size = self.total_size;
        let remaining = size.map(|s| ((1.0 - self.percent_done) * s as f64) as i64);
        let output_path = self
            .download_dir
            .map(|dir| PathBuf::from(dir).join(&self.name));

        ExternalItem {
            external_id: self.hash_string,
            name: self.name,
            native_status: native.to_string(),
            progress: Some((self.percent_done * 100.0) as f32),
            size_bytes: size,
            remaining_bytes: remaining,
            eta_seconds: self.eta.filter(|eta| *eta >= 0),
            output_path,
            error_message: self.error_string.filter(|e| !e.is_empty()),
        }
    }
}

#[async_trait]
impl DownloadClient for TransmissionClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Transmission
    }

    async fn submit(
        &self,
        config: &DownloadClientConfig,
        request: &GrabRequest,
    ) -> Result<String> {
        let mut arguments = json!({ "filename": request.download_url });
        if let Some(category) = &config.category {
            // Transmission has no categories; a label carries the same intent
            arguments["labels"] = json!([category]);
        }

        let added: AddedTorrent = self.rpc(config, "torrent-add", arguments).await?;
        let torrent = added
            .torrent_added
            .or(added.torrent_duplicate)
            .ok_or_else(|| Error::Client {
                client: config.name.clone(),
                message: "torrent-add returned neither torrent-added nor torrent-duplicate"
                    .to_string(),
            })?;

        Ok(torrent.hash_string)
    }

    async fn list_queue(&self, config: &DownloadClientConfig) -> Result<Vec<ExternalItem>> {
        let list: TorrentList = self
            .rpc(
                config,
                "torrent-get",
                json!({
                    "fields": [
                        "hashString", "name", "status", "percentDone",
                        "totalSize", "eta", "downloadDir", "errorString"
                    ]
                }),
            )
            .await?;

        Ok(list.torrents.into_iter().map(Torrent::into_item).collect())
    }

    fn map_status(&self, native: &str) -> RemoteStatus {
        match native {
            "downloading" => RemoteStatus::Downloading,
            "stopped" => RemoteStatus::Paused,
            "queued" => RemoteStatus::Queued,
            "checking" => RemoteStatus::PostProcessing,
            "seeding" | "finished" => RemoteStatus::Completed,
            "error" => RemoteStatus::Failed,
            _ => RemoteStatus::Queued,
        }
    }

    async fn remove(
        &self,
        config: &DownloadClientConfig,
        external_id: &str,
        delete_files: bool,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .rpc(
                config,
                "torrent-remove",
                json!({
                    "ids": [external_id],
                    "delete-local-data": delete_files,
                }),
            )
            .await?;
        Ok(())
    }

    async fn test_connection(&self, config: &DownloadClientConfig) -> ClientTestResult {
        match self
            .rpc::<SessionInfo>(config, "session-get", json!({}))
            .await
        {
            Ok(info) => ClientTestResult::ok(info.version),
            Err(e) => ClientTestResult::failed(e.to_string()),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> DownloadClientConfig {
        let url: url::Url = server.uri().parse().unwrap();
        DownloadClientConfig {
            id: 4,
            kind: ClientKind::Transmission,
            name: "transmission".to_string(),
            enabled: true,
            priority: 1,
            host: url.host_str().unwrap().to_string(),
            port: url.port().unwrap(),
            use_tls: false,
            url_base: None,
            username: None,
            password: None,
            api_key: None,
            category: None,
            path_mapping: None,
        }
    }

    #[tokio::test]
    async fn session_handshake_retries_once_and_reads_the_version() {
        let server = MockServer::start().await;
        // First request lacks a session id and is rejected with 409
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(
                ResponseTemplate::new(409).insert_header(SESSION_ID_HEADER, "session-1"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .and(header(SESSION_ID_HEADER, "session-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "success",
                "arguments": { "version": "4.0.5" },
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TransmissionClient::new();
        let result = client.test_connection(&test_config(&server)).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.version.as_deref(), Some("4.0.5"));
    }

    #[tokio::test]
    async fn non_success_rpc_result_surfaces_as_client_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "method name not recognized",
            })))
            .mount(&server)
            .await;

        let client = TransmissionClient::new();
        let result = client.test_connection(&test_config(&server)).await;
        assert!(!result.success);
        assert!(
            result
                .error
                .unwrap()
                .contains("method name not recognized")
        );
    }

    #[test]
    fn numeric_statuses_render_to_stable_strings() {
        assert_eq!(status_string(4, 0.5, None), "downloading");
        assert_eq!(status_string(0, 0.5, None), "stopped");
        assert_eq!(status_string(0, 1.0, None), "finished");
        assert_eq!(status_string(6, 1.0, None), "seeding");
        assert_eq!(status_string(2, 0.9, None), "checking");
        assert_eq!(status_string(3, 0.0, None), "queued");
        assert_eq!(status_string(4, 0.5, Some("tracker gone")), "error");
        assert_eq!(status_string(99, 0.0, None), "unknown");
    }

    #[test]
    fn status_map_is_total() {
        let client = TransmissionClient::new();
        assert_eq!(client.map_status("downloading"), RemoteStatus::Downloading);
        assert_eq!(client.map_status("seeding"), RemoteStatus::Completed);
        assert_eq!(client.map_status("finished"), RemoteStatus::Completed);
        assert_eq!(client.map_status("stopped"), RemoteStatus::Paused);
        assert_eq!(client.map_status("checking"), RemoteStatus::PostProcessing);
        assert_eq!(client.map_status("error"), RemoteStatus::Failed);
        assert_eq!(client.map_status("unknown"), RemoteStatus::Queued);
    }

    #[test]
    fn torrent_output_path_joins_download_dir_and_name() {
        let torrent = Torrent {
            hash_string: "abc".into(),
            name: "Movie.2024".into(),
            status: 6,
            percent_done: 1.0,
            total_size: Some(1000),
            eta: Some(-1),
            download_dir: Some("/data/complete".into()),
            error_string: None,
        };
        let item = torrent.into_item();
        assert_eq!(item.output_path, Some(PathBuf::from("/data/complete/Movie.2024")));
        assert_eq!(item.eta_seconds, None, "negative eta means unknown");
        assert_eq!(item.progress, Some(100.0));
    }
}
