//! # fetcharr
//!
//! Download lifecycle orchestration and reconciliation engine for
//! self-hosted media library managers.
//!
//! fetcharr owns everything between "grab this release" and "the file is in
//! the library": it deduplicates and dispatches grabs to download client
//! backends (SABnzbd, NZBGet, qBittorrent, Transmission, Deluge),
//! reconciles each backend's queue and history into local per-download
//! state machines, detects completion, maps remote paths, triggers imports,
//! classifies failures for blacklisting, and retries failed items through
//! an external search capability within a bounded budget.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or web layer; the API surface is a consumer
//! - **Injected collaborators** - The orchestrator is built from explicit
//!   parts, no global singletons
//! - **Event-driven** - Consumers subscribe to lifecycle events
//! - **Idempotent reconciliation** - Re-running a tick against unchanged
//!   backend state has no additional side effects
//!
//! ## Quick Start
//!
//! ```no_run
//! use fetcharr::{
//!     ClientRegistry, Config, Database, DownloadOrchestrator, ImportRouter,
//! };
//! use std::sync::Arc;
//!
//! # async fn library_parts() -> (
//! #     Arc<dyn fetcharr::LibraryStore>,
//! #     Arc<dyn fetcharr::NamingService>,
//! #     Arc<dyn fetcharr::ReleaseSearch>,
//! # ) { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::default());
//!     let db = Arc::new(Database::new(&config.database_path).await?);
//!     let (library, naming, search) = library_parts().await;
//!
//!     let orchestrator = Arc::new(DownloadOrchestrator::new(
//!         db,
//!         config,
//!         Arc::new(ClientRegistry::standard()),
//!         Arc::new(ImportRouter::new(library.clone(), naming.clone())),
//!         library,
//!         naming,
//!         search,
//!     ));
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // An external scheduler drives reconciliation
//!     orchestrator.refresh_queue().await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Failure classification and release blacklisting
pub mod blacklist;
/// Download client adapters and registry
pub mod clients;
/// Configuration types and engine constants
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Import pipeline (decomposed into per-media services)
pub mod import;
/// Capability traits for external collaborators
pub mod library;
/// Download lifecycle orchestration (decomposed into focused submodules)
pub mod orchestrator;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use blacklist::BlacklistClassifier;
pub use clients::{ClientRegistry, DownloadClient};
pub use config::{ClientKind, Config, DownloadClientConfig, PathMapping};
pub use db::{Database, Download};
pub use error::{
    DatabaseError, Error, GrabError, ImportError, PathProbeFailure, Result,
};
pub use import::{ImportOutcome, ImportRouter, Importer};
pub use library::{ImportedFile, LibraryStore, NamingService, ReleaseSearch};
pub use orchestrator::DownloadOrchestrator;
pub use types::{
    ClientTestResult, DownloadId, Event, FailureType, GrabRequest, MediaRef, QueueItem,
    ReleaseInfo, RemoteStatus, Status,
};
