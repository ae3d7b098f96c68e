//! Orchestrator tests against stubbed collaborators.

use crate::clients::{ClientRegistry, DownloadClient};
use crate::config::{ClientKind, Config, DownloadClientConfig};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::import::test_support::{FlatNaming, RecordingStore};
use crate::import::{ImportOutcome, Importer};
use crate::library::ReleaseSearch;
use crate::types::{
    ClientTestResult, DownloadId, ExternalItem, GrabRequest, MediaRef, RemoteStatus, Status,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tempfile::TempDir;

use super::DownloadOrchestrator;

mod grab;

/// Scriptable download client adapter
pub(crate) struct StubAdapter {
    pub queue: StdMutex<Vec<ExternalItem>>,
    pub history: StdMutex<Vec<ExternalItem>>,
    pub submit_response: StdMutex<std::result::Result<String, String>>,
    pub submit_calls: AtomicUsize,
    pub removed: StdMutex<Vec<(String, bool)>>,
    pub fail_remove: AtomicBool,
}

impl Default for StubAdapter {
    fn default() -> Self {
        Self {
            queue: StdMutex::new(Vec::new()),
            history: StdMutex::new(Vec::new()),
            submit_response: StdMutex::new(Ok("ext-1".to_string())),
            submit_calls: AtomicUsize::new(0),
            removed: StdMutex::new(Vec::new()),
            fail_remove: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DownloadClient for StubAdapter {
    fn kind(&self) -> ClientKind {
        ClientKind::Sabnzbd
    }

    async fn submit(
        &self,
        config: &DownloadClientConfig,
        _request: &GrabRequest,
    ) -> Result<String> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        match self.submit_response.lock().unwrap().clone() {
            Ok(id) => Ok(id),
            Err(message) => Err(Error::Client {
                client: config.name.clone(),
                message,
            }),
        }
    }

    async fn list_queue(&self, _config: &DownloadClientConfig) -> Result<Vec<ExternalItem>> {
        Ok(self.queue.lock().unwrap().clone())
    }

    async fn list_history(
        &self,
        _config: &DownloadClientConfig,
        limit: usize,
    ) -> Result<Vec<ExternalItem>> {
        Ok(self.history.lock().unwrap().iter().take(limit).cloned().collect())
    }

    fn map_status(&self, native: &str) -> RemoteStatus {
        match native {
            "downloading" => RemoteStatus::Downloading,
            "paused" => RemoteStatus::Paused,
            "postprocessing" => RemoteStatus::PostProcessing,
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
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Error::Client {
                client: config.name.clone(),
                message: "remove failed".to_string(),
            });
        }
        self.removed
            .lock()
            .unwrap()
            .push((external_id.to_string(), delete_files));
        Ok(())
    }

    async fn test_connection(&self, _config: &DownloadClientConfig) -> ClientTestResult {
        ClientTestResult::ok(Some("stub 1.0".to_string()))
    }
}

/// Importer stub recording dispatches and returning a scripted outcome
pub(crate) struct StubImporter {
    pub calls: StdMutex<Vec<(MediaRef, PathBuf)>>,
    pub outcome: StdMutex<ImportOutcome>,
}

impl Default for StubImporter {
    fn default() -> Self {
        Self {
            calls: StdMutex::new(Vec::new()),
            outcome: StdMutex::new(ImportOutcome::new(1, Vec::new())),
        }
    }
}

#[async_trait]
impl Importer for StubImporter {
    async fn import(&self, media: &MediaRef, source: &Path) -> Result<ImportOutcome> {
        self.calls
            .lock()
            .unwrap()
            .push((media.clone(), source.to_path_buf()));
        Ok(self.outcome.lock().unwrap().clone())
    }
}

/// Search stub recording which media items were retried
#[derive(Default)]
pub(crate) struct StubSearch {
    pub calls: StdMutex<Vec<MediaRef>>,
}

#[async_trait]
impl ReleaseSearch for StubSearch {
    async fn search_and_grab(&self, media: &MediaRef) -> Result<bool> {
        self.calls.lock().unwrap().push(media.clone());
        Ok(true)
    }
}

pub(crate) struct Harness {
    pub orchestrator: Arc<DownloadOrchestrator>,
    pub db: Arc<Database>,
    pub adapter: Arc<StubAdapter>,
    pub importer: Arc<StubImporter>,
    pub store: Arc<RecordingStore>,
    pub search: Arc<StubSearch>,
    pub dir: TempDir,
}

pub(crate) fn stub_client_config(id: i64) -> DownloadClientConfig {
    DownloadClientConfig {
        id,
        kind: ClientKind::Sabnzbd,
        name: format!("stub-{id}"),
        enabled: true,
        priority: 0,
        host: "localhost".into(),
        port: 8080,
        use_tls: false,
        url_base: None,
        username: None,
        password: None,
        api_key: None,
        category: None,
        path_mapping: None,
    }
}

pub(crate) async fn harness_with_clients(clients: Vec<DownloadClientConfig>) -> Harness {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(Database::new(&dir.path().join("test.db")).await.unwrap());

    let adapter = Arc::new(StubAdapter::default());
    let mut registry = ClientRegistry::new();
    registry.register(adapter.clone());

    let config = Arc::new(Config {
        database_path: dir.path().join("test.db"),
        clients,
    });

    let importer = Arc::new(StubImporter::default());
    let store = Arc::new(RecordingStore::default());
    let naming = Arc::new(FlatNaming {
        root: dir.path().join("library"),
    });
    let search = Arc::new(StubSearch::default());

    let orchestrator = Arc::new(DownloadOrchestrator::new(
        db.clone(),
        config,
        Arc::new(registry),
        importer.clone(),
        store.clone(),
        naming,
        search.clone(),
    ));

    Harness {
        orchestrator,
        db,
        adapter,
        importer,
        store,
        search,
        dir,
    }
}

pub(crate) async fn harness() -> Harness {
    harness_with_clients(vec![stub_client_config(1)]).await
}

pub(crate) fn movie_ref(id: &str) -> MediaRef {
    MediaRef::Movie {
        movie_id: id.to_string(),
    }
}

pub(crate) fn movie_request(id: &str, title: &str) -> GrabRequest {
    GrabRequest {
        title: title.to_string(),
        download_url: format!("http://indexer/{title}.nzb"),
        size_bytes: Some(1_000_000),
        media: movie_ref(id),
        guid: Some(format!("guid-{title}")),
        indexer: Some("indexer".to_string()),
    }
}

pub(crate) fn external_item(
    external_id: &str,
    native_status: &str,
    progress: f32,
    output_path: Option<PathBuf>,
    error_message: Option<&str>,
) -> ExternalItem {
    ExternalItem {
        external_id: external_id.to_string(),
        name: "Some.Release".to_string(),
        native_status: native_status.to_string(),
        progress: Some(progress),
        size_bytes: Some(1_000_000),
        remaining_bytes: Some(((100.0 - progress) / 100.0 * 1_000_000.0) as i64),
        eta_seconds: Some(60),
        output_path,
        error_message: error_message.map(str::to_string),
    }
}

/// Poll the download's status until it matches or the deadline passes
pub(crate) async fn wait_for_status(db: &Database, id: DownloadId, wanted: Status) {
    for _ in 0..100 {
        let row = db.get_download(id).await.unwrap().unwrap();
        if row.status() == wanted {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let row = db.get_download(id).await.unwrap().unwrap();
    panic!("download {} never reached {wanted:?}, stuck at {:?}", id.0, row.status());
}
