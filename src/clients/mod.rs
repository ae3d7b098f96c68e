//! Download client adapters
//!
//! Each backend (SABnzbd, NZBGet, qBittorrent, Transmission, Deluge) gets one
//! adapter translating the uniform submit/poll/remove contract into that
//! backend's API. Adapters are selected through [`ClientRegistry`], keyed by
//! the [`ClientKind`] enum — never by string dispatch.
//!
//! Status-mapping tables are backend-specific free-text-to-enum lookups and
//! must be total: unrecognized strings map to [`RemoteStatus::Queued`], never
//! to an error.

mod deluge;
mod nzbget;
mod qbittorrent;
mod sabnzbd;
mod transmission;

pub use deluge::DelugeClient;
pub use nzbget::NzbgetClient;
pub use qbittorrent::QbittorrentClient;
pub use sabnzbd::SabnzbdClient;
pub use transmission::TransmissionClient;

use crate::config::{ClientKind, DownloadClientConfig};
use crate::error::Result;
use crate::types::{ClientTestResult, ExternalItem, GrabRequest, RemoteStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for backend HTTP calls
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Uniform capability contract over one download client backend type
#[async_trait]
pub trait DownloadClient: Send + Sync {
    /// Which backend this adapter speaks to
    fn kind(&self) -> ClientKind;

    /// Submit a release; returns the backend-assigned external id
    async fn submit(&self, config: &DownloadClientConfig, request: &GrabRequest)
    -> Result<String>;

    /// List the backend's current queue
    async fn list_queue(&self, config: &DownloadClientConfig) -> Result<Vec<ExternalItem>>;

    /// List recent history items, for backends that separate queue and history
    ///
    /// Bounded to a small window for cost control. Backends without a
    /// separate history surface return an empty list.
    async fn list_history(
        &self,
        _config: &DownloadClientConfig,
        _limit: usize,
    ) -> Result<Vec<ExternalItem>> {
        Ok(Vec::new())
    }

    /// Map a backend-native status string onto the closed remote-status set
    ///
    /// Must be total; unrecognized strings map to `RemoteStatus::Queued`.
    fn map_status(&self, native: &str) -> RemoteStatus;

    /// Remove an item from the backend, optionally deleting its files
    async fn remove(
        &self,
        config: &DownloadClientConfig,
        external_id: &str,
        delete_files: bool,
    ) -> Result<()>;

    /// Test connectivity and report the backend version when available
    async fn test_connection(&self, config: &DownloadClientConfig) -> ClientTestResult;
}

/// Registry of adapters keyed by client kind
pub struct ClientRegistry {
    adapters: HashMap<ClientKind, Arc<dyn DownloadClient>>,
}

impl ClientRegistry {
    /// Empty registry, for callers that register adapters themselves
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registry with all five standard backend adapters
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SabnzbdClient::new()));
        registry.register(Arc::new(NzbgetClient::new()));
        registry.register(Arc::new(QbittorrentClient::new()));
        registry.register(Arc::new(TransmissionClient::new()));
        registry.register(Arc::new(DelugeClient::new()));
        registry
    }

    /// Register an adapter under its own kind, replacing any existing one
    pub fn register(&mut self, adapter: Arc<dyn DownloadClient>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    /// Look up the adapter for a client kind
    pub fn get(&self, kind: ClientKind) -> Option<Arc<dyn DownloadClient>> {
        self.adapters.get(&kind).cloned()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Shared HTTP client builder for adapters
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .cookie_store(true)
        .build()
        .unwrap_or_default()
}
