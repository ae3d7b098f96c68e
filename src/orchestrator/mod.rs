//! Download lifecycle orchestration.
//!
//! [`DownloadOrchestrator`] is the composition root of the engine: it owns
//! the database, the client adapter registry, the import router, the failure
//! classifier, and the event channel, and exposes the four operations the
//! rest of the system drives it with — `grab`, `refresh_queue`, the control
//! surface (`get_queue`, `cancel`, `test_client`), and event subscription.
//!
//! All collaborators are injected at construction; there are no global
//! singletons. An external scheduler calls `refresh_queue` on a tick;
//! `grab` is called ad hoc.

use crate::blacklist::BlacklistClassifier;
use crate::clients::{ClientRegistry, DownloadClient};
use crate::config::{Config, DownloadClientConfig};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::import::Importer;
use crate::library::{LibraryStore, NamingService, ReleaseSearch};
use crate::types::{DownloadId, Event, MediaRef};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, broadcast};

mod control;
mod grab;
mod reconcile;
mod search;

/// Broadcast channel capacity; slow subscribers lose oldest events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Coordinates grabs, reconciliation, imports, and failure handling
pub struct DownloadOrchestrator {
    pub(crate) db: Arc<Database>,
    pub(crate) config: Arc<Config>,
    pub(crate) clients: Arc<ClientRegistry>,
    pub(crate) importer: Arc<dyn Importer>,
    pub(crate) library: Arc<dyn LibraryStore>,
    pub(crate) naming: Arc<dyn NamingService>,
    pub(crate) search: Arc<dyn ReleaseSearch>,
    pub(crate) classifier: BlacklistClassifier,
    pub(crate) events: broadcast::Sender<Event>,
    // Serializes grab's check-then-create per media reference; the partial
    // unique index is the cross-process backstop.
    grab_locks: StdMutex<HashMap<(i32, String), Arc<Mutex<()>>>>,
    // One reconciliation pass per client at a time.
    client_locks: StdMutex<HashMap<i64, Arc<Mutex<()>>>>,
    // Downloads with an import task currently in flight; shared with the
    // spawned import tasks themselves.
    pub(crate) active_imports: Arc<StdMutex<HashSet<DownloadId>>>,
}

impl DownloadOrchestrator {
    /// Construct the orchestrator with its injected collaborators
    pub fn new(
        db: Arc<Database>,
        config: Arc<Config>,
        clients: Arc<ClientRegistry>,
        importer: Arc<dyn Importer>,
        library: Arc<dyn LibraryStore>,
        naming: Arc<dyn NamingService>,
        search: Arc<dyn ReleaseSearch>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            classifier: BlacklistClassifier::new(db.clone()),
            db,
            config,
            clients,
            importer,
            library,
            naming,
            search,
            events,
            grab_locks: StdMutex::new(HashMap::new()),
            client_locks: StdMutex::new(HashMap::new()),
            active_imports: Arc::new(StdMutex::new(HashSet::new())),
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Emit an event; dropped silently when nobody subscribes
    pub(crate) fn emit(&self, event: Event) {
        self.events.send(event).ok();
    }

    /// Delete expired blacklist entries; for a scheduler to call periodically
    pub async fn prune_expired_blacklist(&self) -> Result<u64> {
        let pruned = self.db.prune_expired_blacklist().await?;
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned expired blacklist entries");
        }
        Ok(pruned)
    }

    pub(crate) fn adapter_for(
        &self,
        config: &DownloadClientConfig,
    ) -> Result<Arc<dyn DownloadClient>> {
        self.clients
            .get(config.kind)
            .ok_or_else(|| Error::UnknownClientKind(config.kind.to_string()))
    }

    // Lock poisoning is unrecoverable here; panicking is the right outcome.
    #[allow(clippy::unwrap_used)]
    pub(crate) fn media_lock(&self, media: &MediaRef) -> Arc<Mutex<()>> {
        let key = (media.kind_code(), media.media_id().to_string());
        self.grab_locks
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .clone()
    }

    #[allow(clippy::unwrap_used)]
    pub(crate) fn client_lock(&self, client_id: i64) -> Arc<Mutex<()>> {
        self.client_locks
            .lock()
            .unwrap()
            .entry(client_id)
            .or_default()
            .clone()
    }

    /// Register an import dispatch; `false` when one is already in flight
    #[allow(clippy::unwrap_used)]
    pub(crate) fn begin_import(&self, id: DownloadId) -> bool {
        self.active_imports.lock().unwrap().insert(id)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
