//! Configuration types for fetcharr

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long after a completion a re-grab of the same media item is rejected
///
/// Mirrors the recent-completion guard window. Kept as a named constant
/// rather than a configuration knob; see DESIGN.md for the open question.
pub const RECENT_COMPLETION_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Maximum automatic alternative-search retries per media reference
pub const MAX_AUTO_RETRIES: i64 = 3;

/// Timeout for filesystem probes during reconciliation
///
/// Bounds accessibility checks so an unresponsive network mount cannot hang
/// the rest of a client's reconciliation pass.
pub const PATH_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// How many history items to fetch per backend per reconciliation pass
pub const HISTORY_FETCH_LIMIT: usize = 50;

/// How long blacklist entries remain in force
pub const BLACKLIST_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Supported download client backend types
///
/// Adapter dispatch is keyed by this enum; there is no string-typed client
/// dispatch anywhere in the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    /// SABnzbd (usenet)
    Sabnzbd,
    /// NZBGet (usenet)
    Nzbget,
    /// qBittorrent (torrent)
    Qbittorrent,
    /// Transmission (torrent)
    Transmission,
    /// Deluge (torrent)
    Deluge,
}

impl std::fmt::Display for ClientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClientKind::Sabnzbd => "sabnzbd",
            ClientKind::Nzbget => "nzbget",
            ClientKind::Qbittorrent => "qbittorrent",
            ClientKind::Transmission => "transmission",
            ClientKind::Deluge => "deluge",
        };
        write!(f, "{name}")
    }
}

/// Remote-to-local path mapping for a download client
///
/// Backends running on another host report output paths in their own
/// filesystem namespace. Completion detection rewrites the configured
/// `remote` prefix to `local` before probing and importing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathMapping {
    /// Path prefix as the backend reports it
    pub remote: String,
    /// Equivalent prefix on the local filesystem
    pub local: String,
}

impl PathMapping {
    /// Apply the mapping to a backend-reported path
    ///
    /// Returns the path unchanged when the prefix does not match.
    pub fn apply(&self, path: &Path) -> PathBuf {
        let raw = path.to_string_lossy();
        match raw.strip_prefix(&self.remote) {
            Some(rest) => {
                let rest = rest.trim_start_matches(['/', '\\']);
                if rest.is_empty() {
                    PathBuf::from(&self.local)
                } else {
                    Path::new(&self.local).join(rest)
                }
            }
            None => path.to_path_buf(),
        }
    }
}

/// Connection and behavior settings for one download client instance
///
/// Owned by the caller's download-client records; read-only for the core
/// within any one reconciliation pass.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadClientConfig {
    /// Caller-assigned id, recorded immutably on each download
    pub id: i64,

    /// Backend type
    pub kind: ClientKind,

    /// Display name for logging and events
    pub name: String,

    /// Whether this client participates in grabs and reconciliation
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Client selection priority; lowest value wins
    #[serde(default)]
    pub priority: i32,

    /// Backend hostname
    pub host: String,

    /// Backend port
    pub port: u16,

    /// Connect over TLS
    #[serde(default)]
    pub use_tls: bool,

    /// Base URL path prefix (e.g. "/transmission" behind a reverse proxy)
    #[serde(default)]
    pub url_base: Option<String>,

    /// Username, for backends using basic or session auth
    #[serde(default)]
    pub username: Option<String>,

    /// Password
    #[serde(default)]
    pub password: Option<String>,

    /// API key, for backends using key auth (SABnzbd)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Category or label assigned to submitted items
    #[serde(default)]
    pub category: Option<String>,

    /// Remote-to-local path mapping, when the backend runs on another host
    #[serde(default)]
    pub path_mapping: Option<PathMapping>,
}

impl DownloadClientConfig {
    /// Base URL for the backend's HTTP API
    pub fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        let base = self
            .url_base
            .as_deref()
            .map(|b| format!("/{}", b.trim_matches('/')))
            .unwrap_or_default();
        format!("{scheme}://{}:{}{base}", self.host, self.port)
    }

    /// Map a backend-reported path to the local filesystem
    pub fn map_remote_path(&self, path: &Path) -> PathBuf {
        match &self.path_mapping {
            Some(mapping) => mapping.apply(path),
            None => path.to_path_buf(),
        }
    }
}

/// Main configuration for the orchestration engine
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database path (default: "./fetcharr.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Configured download client instances
    #[serde(default)]
    pub clients: Vec<DownloadClientConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            clients: Vec::new(),
        }
    }
}

impl Config {
    /// Enabled clients, sorted by ascending priority value
    pub fn enabled_clients(&self) -> Vec<&DownloadClientConfig> {
        let mut clients: Vec<_> = self.clients.iter().filter(|c| c.enabled).collect();
        clients.sort_by_key(|c| c.priority);
        clients
    }

    /// Look up a client config by id
    pub fn client_by_id(&self, id: i64) -> Option<&DownloadClientConfig> {
        self.clients.iter().find(|c| c.id == id)
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./fetcharr.db")
}

fn default_true() -> bool {
    true
}
